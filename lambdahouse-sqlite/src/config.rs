use crate::formats::{FormatRegistry, DEFAULT_FORMAT};
use crate::statement::INPUT_TABLE_NAME;
use crate::users::PasswordPolicy;
use lambdahouse_core::{ConfigTree, LambdahouseError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_DATABASE: &str = "default";
pub const DEFAULT_MAX_IO_THREADS: u64 = 100;

/// Table created once at startup from a file named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialTable {
    pub name: String,
    pub structure: Option<String>,
    pub file: PathBuf,
    pub format: String,
}

/// Everything the engine reads from configuration, resolved once on the main thread.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tree: ConfigTree,
    pub path: Option<String>,
    pub default_database: String,
    pub default_output_format: String,
    pub default_input_format: String,
    pub user_scripts_path: Option<String>,
    pub top_level_domains_path: Option<String>,
    pub password_policy: PasswordPolicy,
    pub user: String,
    pub password: String,
    pub max_io_threads: usize,
    pub no_system_tables: bool,
    pub only_system_tables: bool,
    pub initial_table: Option<InitialTable>,
    pub query_parameters: BTreeMap<String, String>,
    pub macros: BTreeMap<String, String>,
}

impl EngineConfig {
    pub fn from_tree(tree: ConfigTree) -> Result<Self> {
        let path = tree.get("path").map(str::to_string);
        if path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(LambdahouseError::BadArguments(
                "Cannot use an empty storage path".to_string(),
            ));
        }

        let formats = FormatRegistry::new();
        let default_output_format = tree
            .get("output-format")
            .or_else(|| tree.get("format"))
            .unwrap_or(DEFAULT_FORMAT)
            .to_string();
        formats.output(&default_output_format)?;
        let default_input_format = tree.get_string("table-data-format", DEFAULT_FORMAT);
        formats.input(&default_input_format)?;

        let non_empty = |key: &str| tree.get(key).filter(|v| !v.is_empty()).map(str::to_string);

        let initial_table = match (non_empty("table-structure"), non_empty("table-file")) {
            (structure, Some(file)) => Some(InitialTable {
                name: tree.get_string("table-name", INPUT_TABLE_NAME),
                structure,
                file: PathBuf::from(file),
                format: default_input_format.clone(),
            }),
            (Some(_), None) => {
                return Err(LambdahouseError::BadArguments(
                    "Initial table structure given without a file".to_string(),
                ))
            }
            (None, None) => None,
        };

        let query_parameters = pairs_under(&tree, "query_parameters");
        let macros = pairs_under(&tree, "macros");

        let max_io_threads = tree.get_u64("max_io_thread_pool_size", DEFAULT_MAX_IO_THREADS)?.max(1);
        let max_io_threads = usize::try_from(max_io_threads).unwrap_or(usize::MAX);

        Ok(Self {
            path,
            default_database: tree.get_string("default_database", DEFAULT_DATABASE),
            default_output_format,
            default_input_format,
            user_scripts_path: non_empty("user_scripts_path"),
            top_level_domains_path: non_empty("top_level_domains_path"),
            password_policy: PasswordPolicy {
                allow_no_password: tree.get_bool("allow_no_password", true)?,
                allow_plaintext_password: tree.get_bool("allow_plaintext_password", true)?,
            },
            user: tree.get_string("user", "default"),
            password: tree.get_string("password", ""),
            max_io_threads,
            no_system_tables: tree.get_bool("no-system-tables", false)?,
            only_system_tables: tree.get_bool("only-system-tables", false)?,
            initial_table,
            query_parameters,
            macros,
            tree,
        })
    }
}

fn pairs_under(tree: &ConfigTree, prefix: &str) -> BTreeMap<String, String> {
    tree.children(prefix)
        .into_iter()
        .filter_map(|name| {
            tree.get(&format!("{prefix}.{name}"))
                .map(|value| (name.clone(), value.to_string()))
        })
        .collect()
}
