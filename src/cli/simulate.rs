//! Simulate command implementation
//!
//! Runs the dispatcher on a manual clock so a run of `n` requests spaced
//! `interval_ms` apart finishes instantly and deterministically. Every
//! granted request is reported back as a success.

use chrono::Duration;
use std::sync::Arc;

use crate::cli::output::{
    format_simulation_json, format_simulation_table, format_usage_table, SimulationStep,
};
use crate::cli::SimulateArgs;
use crate::clock::{Clock, ManualClock};
use crate::config::KeyPoolConfig;
use crate::dispatch::DispatchError;
use crate::logging::dispatch_status;
use crate::metrics::MetricsCollector;
use crate::pool::KeyPool;
use crate::registry::mask_key;

/// Handle simulate command
///
/// `prometheus` renders the exposition appended when `--metrics` is set.
pub fn handle_simulate(
    args: &SimulateArgs,
    config: &KeyPoolConfig,
    prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<String> {
    let clock = ManualClock::default();
    let pool = KeyPool::with_clock(config, Arc::new(clock.clone()))?;

    let steps = run(&pool, &clock, args);
    let report = pool.usage_snapshot();

    let mut output = if args.json {
        format_simulation_json(&steps, &report)?
    } else {
        let granted = steps.iter().filter(|s| s.credential.is_some()).count();
        format!(
            "{}\n{} of {} requests granted for '{}'\n{}",
            format_simulation_table(&steps),
            granted,
            steps.len(),
            args.model,
            format_usage_table(&report)
        )
    };

    if let Some(handle) = prometheus {
        let collector = MetricsCollector::new(
            Arc::clone(pool.registry()),
            Arc::new(clock),
            handle,
        );
        output.push('\n');
        output.push_str(&collector.render_metrics());
    }

    Ok(output)
}

fn run(pool: &KeyPool, clock: &ManualClock, args: &SimulateArgs) -> Vec<SimulationStep> {
    let start = clock.now();
    let interval = Duration::milliseconds(args.interval_ms as i64);
    let mut steps = Vec::with_capacity(args.requests as usize);

    for request in 1..=args.requests {
        if request > 1 {
            clock.advance(interval);
        }
        let elapsed_ms = (clock.now() - start).num_milliseconds().max(0) as u64;

        let result = pool.select_credential(&args.model);
        let (outcome, message) = dispatch_status(&result);
        let step = match result {
            Ok(selection) => {
                if let Err(e) = pool.record_success(&selection.credential_id) {
                    tracing::warn!(error = %e, "Failed to record simulated success");
                }
                SimulationStep {
                    request,
                    elapsed_ms,
                    outcome,
                    credential: Some(mask_key(&selection.credential_id)),
                    detail: None,
                }
            }
            Err(DispatchError::NoAvailableCredential {
                retry_after: Some(wait),
                ..
            }) => SimulationStep {
                request,
                elapsed_ms,
                outcome,
                credential: None,
                detail: Some(format!("retry in {:.1}s", wait.as_secs_f64())),
            },
            Err(_) => SimulationStep {
                request,
                elapsed_ms,
                outcome,
                credential: None,
                detail: message,
            },
        };
        steps.push(step);
    }

    steps
}
