use clap::Parser;
use keypool::cli::{
    handle_completions, handle_config_init, handle_config_validate, handle_keys_list,
    handle_simulate, load_config, Cli, Commands, ConfigCommands, KeysCommands,
};
use keypool::config::{KeyPoolConfig, LoggingConfig};
use keypool::logging::init_tracing;
use std::path::Path;

/// Load config and install tracing from its `[logging]` section. The
/// `--log-level` flag wins over the file.
fn load_with_tracing(path: &Path, log_level: Option<&str>) -> anyhow::Result<KeyPoolConfig> {
    let mut config = load_config(path)?;
    if let Some(level) = log_level {
        config.logging.level = level.to_string();
    }
    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = cli.log_level.as_deref();

    let result = match &cli.command {
        Commands::Keys(KeysCommands::List(args)) => load_with_tracing(&args.config, log_level)
            .and_then(|config| handle_keys_list(args, &config)),
        Commands::Simulate(args) => {
            load_with_tracing(&args.config, log_level).and_then(|config| {
                let prometheus = if args.metrics {
                    Some(keypool::metrics::setup_metrics().map_err(|e| {
                        anyhow::anyhow!("Failed to install metrics recorder: {}", e)
                    })?)
                } else {
                    None
                };
                handle_simulate(args, &config, prometheus)
            })
        }
        Commands::Config(config_cmd) => {
            let logging = LoggingConfig {
                level: log_level.unwrap_or("warn").to_string(),
                ..Default::default()
            };
            if let Err(e) = init_tracing(&logging) {
                eprintln!("Warning: Failed to initialize logging: {}", e);
            }
            match config_cmd {
                ConfigCommands::Init(args) => handle_config_init(args),
                ConfigCommands::Validate(args) => handle_config_validate(args),
            }
        }
        Commands::Completions(args) => {
            handle_completions(args);
            Ok(String::new())
        }
    };

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
