//! Command-line options for the `lambdahouse` binary.
//!
//! Options are written into the same [`ConfigTree`] the configuration file
//! is loaded into, so a flag always wins over the file.

use clap::builder::BoolishValueParser;
use clap::Parser;
use lambdahouse_core::{ConfigTree, LambdahouseError};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "config.xml";
const PARAM_PREFIX: &str = "--param_";

#[derive(Parser, Debug, Default)]
#[command(name = "lambdahouse")]
#[command(version)]
#[command(
    about = "Serves SQL queries as AWS Lambda invocations",
    after_help = "In addition, --param_name=value can be specified for substitution of parameters for parametrized queries."
)]
pub struct Cli {
    /// Configuration file (default: ./config.xml when present)
    #[arg(short = 'C', long = "config-file", env = "LAMBDAHOUSE_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Name of the initial table
    #[arg(short = 'N', long = "table")]
    pub table: Option<String>,

    /// Structure of the initial table (list of column and type names)
    #[arg(short = 'S', long = "structure")]
    pub structure: Option<String>,

    /// Path to file with data of the initial table
    #[arg(short = 'f', long = "file")]
    pub file: Option<String>,

    /// Input format of the initial table data and of invocation data
    #[arg(long = "input-format")]
    pub input_format: Option<String>,

    /// Default output format
    #[arg(long = "output-format")]
    pub output_format: Option<String>,

    /// Name of the default database
    #[arg(long = "database")]
    pub database: Option<String>,

    /// Storage path
    #[arg(long = "path", env = "LAMBDAHOUSE_PATH")]
    pub path: Option<String>,

    /// Log to console
    #[arg(
        long = "logger.console",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub logger_console: Option<bool>,

    /// Log file name
    #[arg(long = "logger.log")]
    pub logger_log: Option<String>,

    /// Log level
    #[arg(long = "logger.level")]
    pub logger_level: Option<String>,

    /// Log level, used when --logger.level is not given
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Log level of messages sent along with query results
    #[arg(long = "send_logs_level")]
    pub send_logs_level: Option<String>,

    /// Do not attach system tables (better startup time)
    #[arg(long = "no-system-tables")]
    pub no_system_tables: bool,

    /// Attach only system tables from the specified path
    #[arg(long = "only-system-tables")]
    pub only_system_tables: bool,

    /// Path to lists with custom TLDs
    #[arg(long = "top_level_domains_path")]
    pub top_level_domains_path: Option<String>,

    #[arg(long = "user", env = "LAMBDAHOUSE_USER")]
    pub user: Option<String>,

    #[arg(long = "password", env = "LAMBDAHOUSE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error(transparent)]
    Usage(#[from] clap::Error),
    #[error(transparent)]
    Invalid(#[from] LambdahouseError),
}

impl OptionsError {
    pub fn code(&self) -> i32 {
        match self {
            OptionsError::Usage(_) => LambdahouseError::BadArguments(String::new()).code(),
            OptionsError::Invalid(err) => err.code(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Options {
    pub cli: Cli,
    pub query_parameters: Vec<(String, String)>,
}

impl Options {
    pub fn parse_from<I, T>(args: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let (args, query_parameters) = split_query_parameters(args.into_iter().map(Into::into))?;
        let cli = Cli::try_parse_from(args)?;
        Ok(Self {
            cli,
            query_parameters,
        })
    }

    /// Loads the configuration file, then lays the command line over it.
    pub fn load_config(&self) -> lambdahouse_core::Result<ConfigTree> {
        let mut tree = match &self.cli.config_file {
            Some(path) => ConfigTree::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                ConfigTree::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => ConfigTree::new(),
        };
        self.apply(&mut tree);
        Ok(tree)
    }

    pub fn apply(&self, tree: &mut ConfigTree) {
        let cli = &self.cli;
        let strings = [
            ("table-name", &cli.table),
            ("table-structure", &cli.structure),
            ("table-file", &cli.file),
            ("table-data-format", &cli.input_format),
            ("output-format", &cli.output_format),
            ("default_database", &cli.database),
            ("path", &cli.path),
            ("logger.log", &cli.logger_log),
            ("logger.level", &cli.logger_level),
            ("log-level", &cli.log_level),
            ("send_logs_level", &cli.send_logs_level),
            ("top_level_domains_path", &cli.top_level_domains_path),
            ("user", &cli.user),
            ("password", &cli.password),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                tree.set(key, value.as_str());
            }
        }
        if let Some(console) = cli.logger_console {
            tree.set("logger.console", console.to_string());
        }
        if cli.no_system_tables {
            tree.set("no-system-tables", "true");
        }
        if cli.only_system_tables {
            tree.set("only-system-tables", "true");
        }
        for (name, value) in &self.query_parameters {
            tree.set(format!("query_parameters.{name}"), value.as_str());
        }
    }
}

/// Pulls `--param_<name>=<value>` and `--param_<name> <value>` out of the
/// argument list before clap sees it.
pub fn split_query_parameters<I>(args: I) -> Result<(Vec<String>, Vec<(String, String)>), LambdahouseError>
where
    I: IntoIterator<Item = String>,
{
    let mut rest = Vec::new();
    let mut parameters = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let Some(continuation) = arg.strip_prefix(PARAM_PREFIX) else {
            rest.push(arg);
            continue;
        };
        match continuation.split_once('=') {
            Some(("", _)) => {
                return Err(LambdahouseError::BadArguments(
                    "Parameter name cannot be empty".to_string(),
                ))
            }
            Some((name, value)) => parameters.push((name.to_string(), value.to_string())),
            None => {
                let value = args.next().ok_or_else(|| {
                    LambdahouseError::BadArguments("Parameter requires value".to_string())
                })?;
                parameters.push((continuation.to_string(), value));
            }
        }
    }
    Ok((rest, parameters))
}
