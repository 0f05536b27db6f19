//! Keys command implementation

use anyhow::anyhow;

use crate::cli::output::{format_keys_json, format_keys_table};
use crate::cli::KeysListArgs;
use crate::config::KeyPoolConfig;
use crate::pool::KeyPool;
use crate::registry::{CredentialStatus, CredentialView};

/// Handle keys list command
pub fn handle_keys_list(args: &KeysListArgs, config: &KeyPoolConfig) -> anyhow::Result<String> {
    let target_status = args
        .status
        .as_deref()
        .map(|s| {
            s.parse::<CredentialStatus>().map_err(|e| {
                anyhow!("{}. Use: active, cooling, retired, quarantined", e)
            })
        })
        .transpose()?;

    let pool = KeyPool::from_config(config)?;
    list_views(&pool, target_status, args.json)
}

fn list_views(
    pool: &KeyPool,
    target_status: Option<CredentialStatus>,
    json: bool,
) -> anyhow::Result<String> {
    let views: Vec<CredentialView> = pool
        .credential_views()
        .into_iter()
        .filter(|v| target_status.is_none_or(|status| v.status == status))
        .collect();

    if json {
        format_keys_json(&views)
    } else {
        Ok(format_keys_table(&views))
    }
}
