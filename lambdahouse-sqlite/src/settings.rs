use lambdahouse_core::config::parse_bool;
use lambdahouse_core::{LambdahouseError, Result};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowMode {
    Throw,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMethod {
    Read,
    Pread,
    Mmap,
}

/// Per-session query settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub max_result_rows: u64,
    pub result_overflow_mode: OverflowMode,
    pub max_query_size: usize,
    pub format_csv_delimiter: u8,
    pub input_format_skip_unknown_fields: bool,
    pub allow_introspection_functions: bool,
    pub storage_file_read_method: ReadMethod,
    changed: BTreeSet<String>,
}

pub const SETTING_NAMES: [&str; 7] = [
    "max_result_rows",
    "result_overflow_mode",
    "max_query_size",
    "format_csv_delimiter",
    "input_format_skip_unknown_fields",
    "allow_introspection_functions",
    "storage_file_read_method",
];

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_result_rows: 0,
            result_overflow_mode: OverflowMode::Throw,
            max_query_size: 262_144,
            format_csv_delimiter: b',',
            input_format_skip_unknown_fields: true,
            allow_introspection_functions: false,
            storage_file_read_method: ReadMethod::Pread,
            changed: BTreeSet::new(),
        }
    }
}

impl Settings {
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let invalid = || {
            LambdahouseError::BadArguments(format!("Invalid value '{value}' for setting {name}"))
        };
        match name {
            "max_result_rows" => self.max_result_rows = value.trim().parse().map_err(|_| invalid())?,
            "result_overflow_mode" => {
                self.result_overflow_mode = match value.trim() {
                    "throw" => OverflowMode::Throw,
                    "break" => OverflowMode::Break,
                    _ => return Err(invalid()),
                }
            }
            "max_query_size" => self.max_query_size = value.trim().parse().map_err(|_| invalid())?,
            "format_csv_delimiter" => {
                let bytes = value.as_bytes();
                if bytes.len() != 1 {
                    return Err(invalid());
                }
                self.format_csv_delimiter = bytes[0];
            }
            "input_format_skip_unknown_fields" => {
                self.input_format_skip_unknown_fields = parse_bool(value).ok_or_else(invalid)?
            }
            "allow_introspection_functions" => {
                self.allow_introspection_functions = parse_bool(value).ok_or_else(invalid)?
            }
            "storage_file_read_method" => {
                self.storage_file_read_method = match value.trim() {
                    "read" => ReadMethod::Read,
                    "pread" => ReadMethod::Pread,
                    "mmap" => ReadMethod::Mmap,
                    _ => return Err(invalid()),
                }
            }
            _ => return Err(LambdahouseError::UnknownSetting(name.to_string())),
        }
        self.changed.insert(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let value = match name {
            "max_result_rows" => self.max_result_rows.to_string(),
            "result_overflow_mode" => match self.result_overflow_mode {
                OverflowMode::Throw => "throw",
                OverflowMode::Break => "break",
            }
            .to_string(),
            "max_query_size" => self.max_query_size.to_string(),
            "format_csv_delimiter" => char::from(self.format_csv_delimiter).to_string(),
            "input_format_skip_unknown_fields" => bool_text(self.input_format_skip_unknown_fields),
            "allow_introspection_functions" => bool_text(self.allow_introspection_functions),
            "storage_file_read_method" => match self.storage_file_read_method {
                ReadMethod::Read => "read",
                ReadMethod::Pread => "pread",
                ReadMethod::Mmap => "mmap",
            }
            .to_string(),
            _ => return None,
        };
        Some(value)
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    /// `(name, value, changed)` for every known setting.
    pub fn entries(&self) -> Vec<(String, String, bool)> {
        SETTING_NAMES
            .iter()
            .filter_map(|name| {
                self.get(name)
                    .map(|value| (name.to_string(), value, self.is_changed(name)))
            })
            .collect()
    }

    /// Container-wide overrides applied on top of every user profile.
    pub fn apply_lambda_overrides(&mut self) -> Result<()> {
        self.set("allow_introspection_functions", "1")?;
        self.set("storage_file_read_method", "mmap")
    }
}

fn bool_text(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}
