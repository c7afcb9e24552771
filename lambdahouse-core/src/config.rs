use crate::{LambdahouseError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Flattened view of an XML configuration document.
///
/// Element paths below the root become dotted keys (`logger.level`). A
/// repeated sibling gets an index suffix starting from the second
/// occurrence: `ip`, `ip[1]`, `ip[2]`. Values set from the command line go
/// into the same tree and replace file values.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    values: BTreeMap<String, String>,
    source: Option<PathBuf>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_xml(text: &str) -> Result<Self> {
        let document = roxmltree::Document::parse(text)
            .map_err(|e| LambdahouseError::CannotLoadConfig(e.to_string()))?;
        let mut tree = Self::new();
        tree.flatten(document.root_element(), "");
        Ok(tree)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LambdahouseError::CannotLoadConfig(format!("{}: {e}", path.display()))
        })?;
        let mut tree = Self::parse_xml(&text)
            .map_err(|e| LambdahouseError::CannotLoadConfig(format!("{}: {e}", path.display())))?;
        tree.source = Some(path.to_path_buf());
        Ok(tree)
    }

    fn flatten(&mut self, node: roxmltree::Node<'_, '_>, prefix: &str) {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for child in node.children().filter(|n| n.is_element()) {
            let name = child.tag_name().name();
            let count = seen.entry(name).or_insert(0);
            let segment = if *count == 0 {
                name.to_string()
            } else {
                format!("{name}[{count}]")
            };
            *count += 1;

            let key = if prefix.is_empty() {
                segment
            } else {
                format!("{prefix}.{segment}")
            };
            let text: String = child
                .children()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect();
            self.values.insert(key.clone(), text.trim().to_string());
            self.flatten(child, &key);
        }
    }

    /// File the tree was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => parse_bool(value).ok_or_else(|| {
                LambdahouseError::CannotLoadConfig(format!(
                    "value '{value}' of '{key}' is not a boolean"
                ))
            }),
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.replace('_', "").parse().map_err(|_| {
                LambdahouseError::CannotLoadConfig(format!(
                    "value '{value}' of '{key}' is not an unsigned integer"
                ))
            }),
        }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| {
                LambdahouseError::CannotLoadConfig(format!(
                    "value '{value}' of '{key}' is not a number"
                ))
            }),
        }
    }

    /// Names of the direct children of `prefix`, repeated names ordered by index.
    pub fn children(&self, prefix: &str) -> Vec<String> {
        let start = format!("{prefix}.");
        let mut names: Vec<String> = Vec::new();
        for key in self.values.keys() {
            let Some(rest) = key.strip_prefix(&start) else {
                continue;
            };
            if rest.contains('.') {
                continue;
            }
            names.push(rest.to_string());
        }
        names.sort_by_key(|name| sibling_order(name));
        names
    }

    /// Child values of `prefix` whose name, ignoring the index suffix, is `name`.
    pub fn repeated(&self, prefix: &str, name: &str) -> Vec<String> {
        self.children(prefix)
            .into_iter()
            .filter(|child| child.split('[').next() == Some(name))
            .filter_map(|child| self.get(&format!("{prefix}.{child}")).map(str::to_string))
            .collect()
    }
}

fn sibling_order(name: &str) -> (String, usize) {
    match name.split_once('[') {
        Some((base, index)) => (
            base.to_string(),
            index.trim_end_matches(']').parse().unwrap_or(0),
        ),
        None => (name.to_string(), 0),
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
