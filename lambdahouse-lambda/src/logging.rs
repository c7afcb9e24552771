// Logging for the lambdahouse binary, powered by tracing-subscriber.
//
// Levels use the configuration vocabulary (`warning`, `information`, ...)
// and are mapped onto tracing levels. Output goes to the console, a file,
// or both.

use lambdahouse_core::{ConfigTree, LambdahouseError};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const DEFAULT_LEVEL: &str = "fatal";

/// Third-party targets kept at `warn` unless the base level is quieter.
const NOISY_TARGETS: [&str; 4] = ["sqlx", "hyper", "hyper_util", "lambda_runtime"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub console: bool,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// `logger.level` wins over `log-level`, which wins over `send_logs_level`.
    pub fn from_config(tree: &ConfigTree) -> Result<Self, LambdahouseError> {
        let name = ["logger.level", "log-level", "send_logs_level"]
            .into_iter()
            .find_map(|key| tree.get(key).filter(|v| !v.is_empty()))
            .unwrap_or(DEFAULT_LEVEL);
        let file = tree
            .get("logger.log")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Ok(Self {
            level: parse_level(name)?,
            console: tree.get_bool("logger.console", file.is_none())?,
            file,
        })
    }
}

pub fn parse_level(name: &str) -> Result<LevelFilter, LambdahouseError> {
    let level = match name.trim().to_ascii_lowercase().as_str() {
        "none" => LevelFilter::OFF,
        "fatal" | "critical" | "error" => LevelFilter::ERROR,
        "warning" | "warn" => LevelFilter::WARN,
        "notice" | "information" | "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" | "test" => LevelFilter::TRACE,
        _ => {
            return Err(LambdahouseError::BadArguments(format!(
                "Unknown log level {name}"
            )))
        }
    };
    Ok(level)
}

fn build_env_filter(level: LevelFilter) -> anyhow::Result<EnvFilter> {
    let mut directives = vec![level.to_string()];
    if level > LevelFilter::WARN {
        for target in NOISY_TARGETS {
            directives.push(format!("{target}=warn"));
        }
    }
    let filter = directives.join(",");
    EnvFilter::try_new(&filter)
        .map_err(|e| anyhow::anyhow!("Invalid tracing filter '{}': {}", filter, e))
}

/// Installs the global subscriber. Call once, before the engine starts.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let console_layer = if settings.console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true)
                .with_filter(build_env_filter(settings.level)?),
        )
    } else {
        None
    };

    let file_layer = match &settings.file {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let log_file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(log_file)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_filter(build_env_filter(settings.level)?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(level = %settings.level, console = settings.console, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_configuration_level_names() {
        assert_eq!(parse_level("none").unwrap(), LevelFilter::OFF);
        assert_eq!(parse_level("fatal").unwrap(), LevelFilter::ERROR);
        assert_eq!(parse_level("Warning").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("information").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("test").unwrap(), LevelFilter::TRACE);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn defaults_to_errors_on_the_console() {
        let settings = LogSettings::from_config(&ConfigTree::new()).unwrap();
        assert_eq!(
            settings,
            LogSettings {
                level: LevelFilter::ERROR,
                console: true,
                file: None,
            }
        );
    }

    #[test]
    fn log_file_turns_the_console_off_unless_asked() {
        let mut tree = ConfigTree::new();
        tree.set("logger.log", "/var/log/lambdahouse.log");
        tree.set("log-level", "debug");
        let settings = LogSettings::from_config(&tree).unwrap();
        assert!(!settings.console);
        assert_eq!(settings.level, LevelFilter::DEBUG);

        tree.set("logger.console", "true");
        tree.set("logger.level", "trace");
        let settings = LogSettings::from_config(&tree).unwrap();
        assert!(settings.console);
        assert_eq!(settings.level, LevelFilter::TRACE);
    }

    #[test]
    fn quiet_levels_do_not_raise_noisy_targets() {
        assert!(!build_env_filter(LevelFilter::ERROR).unwrap().to_string().contains("sqlx"));
        assert!(build_env_filter(LevelFilter::DEBUG)
            .unwrap()
            .to_string()
            .contains("sqlx"));
    }
}
