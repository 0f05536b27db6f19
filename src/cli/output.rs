//! Output formatting helpers for CLI commands

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;
use serde_json::json;

use crate::logging::failure_label;
use crate::registry::{mask_key, CredentialStatus, CredentialView};
use crate::usage::{UsageReport, UsageSnapshot};

/// One dispatch made by `keypool simulate`
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStep {
    pub request: u32,
    /// Simulated milliseconds since the first request
    pub elapsed_ms: u64,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn colored_status(status: CredentialStatus) -> String {
    match status {
        CredentialStatus::Active => "Active".green().to_string(),
        CredentialStatus::Cooling => "Cooling".yellow().to_string(),
        CredentialStatus::Retired => "Retired".cyan().to_string(),
        CredentialStatus::Quarantined => "Quarantined".red().to_string(),
    }
}

/// Get status icon for credential status
pub fn status_icon(status: CredentialStatus) -> &'static str {
    match status {
        CredentialStatus::Active => "✓",
        CredentialStatus::Cooling => "~",
        CredentialStatus::Retired => "-",
        CredentialStatus::Quarantined => "✗",
    }
}

/// Format credentials as a table
pub fn format_keys_table(views: &[CredentialView]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Status", "Failures", "Last Failure", "Retry In"]);

    for v in views {
        table.add_row(vec![
            Cell::new(&v.masked_key),
            Cell::new(format!("{} {}", status_icon(v.status), colored_status(v.status))),
            Cell::new(v.consecutive_failures),
            Cell::new(
                v.last_failure_kind
                    .as_ref()
                    .map(|k| failure_label(k, 32))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(
                v.retry_after_seconds
                    .map(|s| format!("{:.1}s", s))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    table.to_string()
}

/// Format credentials as JSON
pub fn format_keys_json(views: &[CredentialView]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&json!({
        "credentials": views
    }))?)
}

/// Format a simulation run as a table
pub fn format_simulation_table(steps: &[SimulationStep]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Elapsed", "Outcome", "Key", "Detail"]);

    for s in steps {
        let outcome = if s.credential.is_some() {
            s.outcome.green().to_string()
        } else {
            s.outcome.red().to_string()
        };
        table.add_row(vec![
            Cell::new(s.request),
            Cell::new(format!("{}ms", s.elapsed_ms)),
            Cell::new(outcome),
            Cell::new(s.credential.as_deref().unwrap_or("-")),
            Cell::new(s.detail.as_deref().unwrap_or("")),
        ]);
    }

    table.to_string()
}

fn usage_row(label: String, snapshot: &UsageSnapshot) -> Vec<Cell> {
    vec![
        Cell::new(label),
        Cell::new(format!(
            "{} ({})",
            snapshot.minute.total,
            snapshot.minute.rate_display()
        )),
        Cell::new(format!("{} ({})", snapshot.hour.total, snapshot.hour.rate_display())),
        Cell::new(format!("{} ({})", snapshot.day.total, snapshot.day.rate_display())),
        Cell::new(format!(
            "{} ({})",
            snapshot.month.total,
            snapshot.month.rate_display()
        )),
    ]
}

/// Format a usage report as a table, global row first.
pub fn format_usage_table(report: &UsageReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Minute", "Hour", "Day", "Month"]);

    table.add_row(usage_row("(all)".to_string(), &report.global));
    for (id, snapshot) in &report.credentials {
        table.add_row(usage_row(mask_key(id), snapshot));
    }

    table.to_string()
}

/// Format a simulation run and its usage as JSON. Credential ids in the
/// usage section are masked.
pub fn format_simulation_json(
    steps: &[SimulationStep],
    report: &UsageReport,
) -> anyhow::Result<String> {
    let credentials: std::collections::BTreeMap<String, &UsageSnapshot> = report
        .credentials
        .iter()
        .map(|(id, snapshot)| (mask_key(id), snapshot))
        .collect();
    Ok(serde_json::to_string_pretty(&json!({
        "steps": steps,
        "usage": {
            "global": report.global,
            "credentials": credentials,
        }
    }))?)
}
