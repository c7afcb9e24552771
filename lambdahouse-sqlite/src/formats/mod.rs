//! Table formats for inline input data and query output.

pub mod input;
pub mod output;

use crate::settings::Settings;
use lambdahouse_core::{LambdahouseError, Result};

pub const DEFAULT_FORMAT: &str = "TSV";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    TabSeparated,
    TabSeparatedWithNames,
    Csv,
    CsvWithNames,
    JsonEachRow,
    JsonCompactEachRow,
    Json,
    Vertical,
}

impl FormatKind {
    pub fn has_header(self) -> bool {
        matches!(self, FormatKind::TabSeparatedWithNames | FormatKind::CsvWithNames)
    }
}

#[derive(Debug, Clone)]
pub struct FormatEntry {
    pub name: &'static str,
    pub kind: FormatKind,
    pub is_input: bool,
    pub is_output: bool,
}

/// Options shared by readers and writers, taken from session settings.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub csv_delimiter: u8,
    pub skip_unknown_fields: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            csv_delimiter: b',',
            skip_unknown_fields: true,
        }
    }
}

impl From<&Settings> for FormatOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            csv_delimiter: settings.format_csv_delimiter,
            skip_unknown_fields: settings.input_format_skip_unknown_fields,
        }
    }
}

pub struct FormatRegistry {
    entries: Vec<FormatEntry>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        let entry = |name, kind, is_input, is_output| FormatEntry {
            name,
            kind,
            is_input,
            is_output,
        };
        Self {
            entries: vec![
                entry("TabSeparated", FormatKind::TabSeparated, true, true),
                entry("TSV", FormatKind::TabSeparated, true, true),
                entry("TabSeparatedWithNames", FormatKind::TabSeparatedWithNames, true, true),
                entry("TSVWithNames", FormatKind::TabSeparatedWithNames, true, true),
                entry("CSV", FormatKind::Csv, true, true),
                entry("CSVWithNames", FormatKind::CsvWithNames, true, true),
                entry("JSONEachRow", FormatKind::JsonEachRow, true, true),
                entry("NDJSON", FormatKind::JsonEachRow, true, true),
                entry("JSONLines", FormatKind::JsonEachRow, true, true),
                entry("JSONCompactEachRow", FormatKind::JsonCompactEachRow, true, true),
                entry("JSON", FormatKind::Json, false, true),
                entry("Vertical", FormatKind::Vertical, false, true),
            ],
        }
    }

    pub fn entries(&self) -> &[FormatEntry] {
        &self.entries
    }

    fn find(&self, name: &str) -> Result<&FormatEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| LambdahouseError::UnknownFormat(name.to_string()))
    }

    pub fn input(&self, name: &str) -> Result<FormatKind> {
        let entry = self.find(name)?;
        if !entry.is_input {
            return Err(LambdahouseError::BadArguments(format!(
                "Format {name} is not suitable for input"
            )));
        }
        Ok(entry.kind)
    }

    pub fn output(&self, name: &str) -> Result<FormatKind> {
        let entry = self.find(name)?;
        if !entry.is_output {
            return Err(LambdahouseError::BadArguments(format!(
                "Format {name} is not suitable for output"
            )));
        }
        Ok(entry.kind)
    }

    /// Guesses an input format from a file extension.
    pub fn for_path(&self, path: &str) -> Option<FormatKind> {
        let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(FormatKind::CsvWithNames),
            "tsv" | "tab" => Some(FormatKind::TabSeparatedWithNames),
            "jsonl" | "ndjson" | "json" => Some(FormatKind::JsonEachRow),
            _ => None,
        }
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_aliases() {
        let registry = FormatRegistry::new();
        assert_eq!(registry.output("TSV").unwrap(), FormatKind::TabSeparated);
        assert_eq!(registry.input("NDJSON").unwrap(), FormatKind::JsonEachRow);
    }

    #[test]
    fn output_only_formats_are_not_readable() {
        let registry = FormatRegistry::new();
        assert!(registry.output("Vertical").is_ok());
        assert_eq!(
            registry.input("Vertical").unwrap_err().to_string(),
            "Format Vertical is not suitable for input"
        );
        assert_eq!(
            registry.output("Avro").unwrap_err().to_string(),
            "Unknown format Avro"
        );
    }

    #[test]
    fn guesses_formats_from_extensions() {
        let registry = FormatRegistry::new();
        assert_eq!(registry.for_path("data/x.CSV"), Some(FormatKind::CsvWithNames));
        assert_eq!(registry.for_path("x.ndjson"), Some(FormatKind::JsonEachRow));
        assert_eq!(registry.for_path("x.parquet"), None);
        assert_eq!(registry.for_path("noext"), None);
    }
}
