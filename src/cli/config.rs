//! Config command handlers

use anyhow::bail;
use std::fs;

use crate::cli::{load_config, ConfigInitArgs, ConfigValidateArgs};

const EXAMPLE_CONFIG: &str = include_str!("../../keypool.example.toml");

/// Handle `keypool config init` command
pub fn handle_config_init(args: &ConfigInitArgs) -> anyhow::Result<String> {
    if args.output.exists() && !args.force {
        bail!(
            "File already exists: {}. Use --force to overwrite.",
            args.output.display()
        );
    }

    fs::write(&args.output, EXAMPLE_CONFIG)?;

    Ok(format!(
        "✓ Configuration file created: {}\n  Add your API keys under `credentials` or set KEYPOOL_API_KEYS.",
        args.output.display()
    ))
}

/// Handle `keypool config validate` command
pub fn handle_config_validate(args: &ConfigValidateArgs) -> anyhow::Result<String> {
    if !args.config.exists() {
        bail!("Config file not found: {}", args.config.display());
    }
    let config = load_config(&args.config)?;
    config.validate()?;

    Ok(format!(
        "✓ {} is valid: {} credentials, {} model limits, default {} rpm / {} rpd",
        args.config.display(),
        config.credentials.len(),
        config.limits.models.len(),
        config.limits.default.rpm,
        config.limits.default.rpd,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("keypool.toml");

        let args = ConfigInitArgs {
            output: output_path.clone(),
            force: false,
        };

        handle_config_init(&args).unwrap();

        let content = std::fs::read_to_string(&output_path).unwrap();
        assert!(content.contains("[limits.models]"));
    }

    #[test]
    fn test_config_init_no_overwrite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("keypool.toml");
        std::fs::write(&output_path, "existing").unwrap();

        let args = ConfigInitArgs {
            output: output_path.clone(),
            force: false,
        };

        assert!(handle_config_init(&args).is_err());

        // Original content preserved
        let content = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(content, "existing");
    }

    #[test]
    fn test_config_init_force_overwrites() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("keypool.toml");
        std::fs::write(&output_path, "old content").unwrap();

        let args = ConfigInitArgs {
            output: output_path.clone(),
            force: true,
        };

        handle_config_init(&args).unwrap();

        let content = std::fs::read_to_string(&output_path).unwrap();
        assert!(content.contains("[failure]"));
    }

    #[test]
    fn test_config_validate_rejects_zero_rpm() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("keypool.toml");
        std::fs::write(
            &path,
            "credentials = [\"k1\"]\n[limits]\ndefault = { rpm = 0, rpd = 10 }\n",
        )
        .unwrap();

        let args = ConfigValidateArgs { config: path };
        assert!(handle_config_validate(&args).is_err());
    }

    #[test]
    fn test_config_validate_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let args = ConfigValidateArgs {
            config: temp_dir.path().join("nope.toml"),
        };
        let err = handle_config_validate(&args).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
