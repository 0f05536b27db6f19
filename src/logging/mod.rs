//! Structured logging setup
//!
//! Filter construction from [`LoggingConfig`](crate::config::LoggingConfig)
//! and subscriber installation. Credential ids are always logged masked;
//! see [`mask_key`](crate::registry::mask_key).

pub mod fields;

pub use fields::{dispatch_status, failure_label};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Build filter directives string from LoggingConfig
///
/// Produces the base level followed by one `keypool::<component>=<level>`
/// directive per configured component.
///
/// # Examples
///
/// ```
/// use keypool::config::{LogFormat, LoggingConfig};
/// use keypool::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("dispatch".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
/// };
///
/// let filter_str = build_filter_directives(&config);
/// assert_eq!(filter_str, "info,keypool::dispatch=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",keypool::{}={}", component, level));
        }
    }

    filter_str
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured directives. Output goes
/// to stderr so command output on stdout stays machine readable.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_filter_without_components() {
        let config = LoggingConfig::default();
        assert_eq!(build_filter_directives(&config), "info");
    }

    #[test]
    fn test_filter_components_are_sorted() {
        let mut component_levels = HashMap::new();
        component_levels.insert("health".to_string(), "trace".to_string());
        component_levels.insert("dispatch".to_string(), "debug".to_string());
        let config = LoggingConfig {
            level: "warn".to_string(),
            component_levels: Some(component_levels),
            ..Default::default()
        };
        assert_eq!(
            build_filter_directives(&config),
            "warn,keypool::dispatch=debug,keypool::health=trace"
        );
    }

    #[test]
    fn test_filter_directives_parse() {
        let mut component_levels = HashMap::new();
        component_levels.insert("registry".to_string(), "debug".to_string());
        let config = LoggingConfig {
            component_levels: Some(component_levels),
            ..Default::default()
        };
        assert!(EnvFilter::try_new(build_filter_directives(&config)).is_ok());
    }
}
