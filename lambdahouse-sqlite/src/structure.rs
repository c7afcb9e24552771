//! Column structure descriptions such as `a Int64, b Nullable(String)`.

use crate::value::SqlValue;
use lambdahouse_core::{LambdahouseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Integer,
    Real,
    Text,
}

impl Storage {
    pub fn sql_type(self) -> &'static str {
        match self {
            Storage::Integer => "INTEGER",
            Storage::Real => "REAL",
            Storage::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub name: String,
    pub storage: Storage,
    pub nullable: bool,
    /// Inclusive bounds for fixed-width integers.
    range: Option<(i128, i128)>,
    boolean: bool,
}

impl ColumnType {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(inner) = unwrap_call(text, "Nullable") {
            let mut inner = Self::parse(inner)?;
            inner.nullable = true;
            inner.name = text.to_string();
            return Ok(inner);
        }
        if let Some(inner) = unwrap_call(text, "LowCardinality") {
            let mut inner = Self::parse(inner)?;
            inner.name = text.to_string();
            return Ok(inner);
        }

        let family = text.split('(').next().unwrap_or(text).trim();
        let integer = |lo: i128, hi: i128| (Storage::Integer, Some((lo, hi)), false);
        let (storage, range, boolean) = match family {
            "Int8" => integer(i8::MIN.into(), i8::MAX.into()),
            "Int16" => integer(i16::MIN.into(), i16::MAX.into()),
            "Int32" => integer(i32::MIN.into(), i32::MAX.into()),
            "Int64" => integer(i64::MIN.into(), i64::MAX.into()),
            "UInt8" => integer(0, u8::MAX.into()),
            "UInt16" => integer(0, u16::MAX.into()),
            "UInt32" => integer(0, u32::MAX.into()),
            // Stored as signed 64-bit, so the top half of UInt64 is rejected.
            "UInt64" => integer(0, i64::MAX.into()),
            "Bool" | "Boolean" => (Storage::Integer, Some((0, 1)), true),
            "Float32" | "Float64" | "Decimal" | "Decimal32" | "Decimal64" | "Decimal128" => {
                (Storage::Real, None, false)
            }
            "String" | "FixedString" | "UUID" | "Date" | "Date32" | "DateTime" | "DateTime64"
            | "Enum8" | "Enum16" | "IPv4" | "IPv6" | "Array" | "Tuple" | "Map" | "JSON" => {
                (Storage::Text, None, false)
            }
            _ => {
                return Err(LambdahouseError::UnknownType(format!(
                    "Unknown data type family: {family}"
                )))
            }
        };
        Ok(Self {
            name: text.to_string(),
            storage,
            nullable: false,
            range,
            boolean,
        })
    }

    /// Converts one raw field. NULL becomes the type default unless the column is nullable.
    pub fn convert(&self, raw: Option<&str>) -> Result<SqlValue> {
        let Some(raw) = raw else {
            return Ok(if self.nullable {
                SqlValue::Null
            } else {
                self.default_value()
            });
        };
        match self.storage {
            Storage::Text => Ok(SqlValue::Text(raw.to_string())),
            Storage::Real => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(self.default_value());
                }
                trimmed
                    .parse::<f64>()
                    .map(SqlValue::Real)
                    .map_err(|_| self.cannot_parse(raw))
            }
            Storage::Integer => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(self.default_value());
                }
                if self.boolean {
                    return match trimmed.to_ascii_lowercase().as_str() {
                        "true" | "1" => Ok(SqlValue::Integer(1)),
                        "false" | "0" => Ok(SqlValue::Integer(0)),
                        _ => Err(self.cannot_parse(raw)),
                    };
                }
                let value: i128 = trimmed.parse().map_err(|_| self.cannot_parse(raw))?;
                if let Some((lo, hi)) = self.range {
                    if value < lo || value > hi {
                        return Err(LambdahouseError::IncorrectData(format!(
                            "Value {value} is out of range for {}",
                            self.name
                        )));
                    }
                }
                i64::try_from(value)
                    .map(SqlValue::Integer)
                    .map_err(|_| self.cannot_parse(raw))
            }
        }
    }

    fn default_value(&self) -> SqlValue {
        match self.storage {
            Storage::Integer => SqlValue::Integer(0),
            Storage::Real => SqlValue::Real(0.0),
            Storage::Text => SqlValue::Text(String::new()),
        }
    }

    fn cannot_parse(&self, raw: &str) -> LambdahouseError {
        LambdahouseError::IncorrectData(format!("Cannot parse '{raw}' as {}", self.name))
    }
}

fn unwrap_call<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub columns: Vec<ColumnDef>,
}

impl Structure {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(LambdahouseError::BadArguments(
                "Table structure is empty".to_string(),
            ));
        }
        let columns = split_top_level(text)
            .into_iter()
            .map(|entry| parse_column(entry.trim()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Picks Int64, Float64 or String per column from sample values.
    pub fn infer(names: &[String], rows: &[Vec<Option<String>>]) -> Result<Self> {
        let columns = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let values = rows.iter().filter_map(|row| row.get(index).cloned().flatten());
                let mut integers = true;
                let mut floats = true;
                let mut any = false;
                for value in values {
                    any = true;
                    integers &= value.trim().parse::<i64>().is_ok();
                    floats &= value.trim().parse::<f64>().is_ok();
                }
                let has_null = rows.iter().any(|row| row.get(index).is_some_and(Option::is_none));
                let base = match (any, integers, floats) {
                    (true, true, _) => "Int64",
                    (true, false, true) => "Float64",
                    _ => "String",
                };
                let type_name = if has_null {
                    format!("Nullable({base})")
                } else {
                    base.to_string()
                };
                Ok(ColumnDef {
                    name: name.clone(),
                    column_type: ColumnType::parse(&type_name)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn create_table_sql(&self, qualified_name: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.storage.sql_type()))
            .collect();
        format!("CREATE TABLE {qualified_name} ({})", columns.join(", "))
    }

    pub fn insert_sql(&self, qualified_name: &str) -> String {
        let names: Vec<String> = self.columns.iter().map(|c| quote_identifier(&c.name)).collect();
        let marks = vec!["?"; self.columns.len()].join(", ");
        format!("INSERT INTO {qualified_name} ({}) VALUES ({marks})", names.join(", "))
    }
}

fn parse_column(entry: &str) -> Result<ColumnDef> {
    let (name, rest) = match entry.chars().next() {
        Some(quote @ ('`' | '"')) => {
            let body = &entry[1..];
            let end = body.find(quote).ok_or_else(|| {
                LambdahouseError::BadArguments(format!("Unterminated column name in '{entry}'"))
            })?;
            (body[..end].to_string(), &body[end + 1..])
        }
        _ => match entry.split_once(char::is_whitespace) {
            Some((name, rest)) => (name.to_string(), rest),
            None => {
                return Err(LambdahouseError::BadArguments(format!(
                    "Column '{entry}' has no type"
                )))
            }
        },
    };
    if name.is_empty() || rest.trim().is_empty() {
        return Err(LambdahouseError::BadArguments(format!(
            "Column '{entry}' has no type"
        )));
    }
    Ok(ColumnDef {
        name,
        column_type: ColumnType::parse(rest)?,
    })
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '`' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_structure() {
        let structure = Structure::parse("a Int64, b Nullable(String)").unwrap();
        assert_eq!(structure.names(), vec!["a", "b"]);
        assert_eq!(structure.columns[0].column_type.storage, Storage::Integer);
        assert!(structure.columns[1].column_type.nullable);
    }

    #[test]
    fn keeps_nested_commas_inside_types() {
        let structure =
            Structure::parse("`my col` Map(String, UInt8), d Decimal(10, 2), e Enum8('a' = 1, 'b' = 2)")
                .unwrap();
        assert_eq!(structure.names(), vec!["my col", "d", "e"]);
        assert_eq!(structure.columns[1].column_type.storage, Storage::Real);
        assert_eq!(structure.columns[2].column_type.storage, Storage::Text);
    }

    #[test]
    fn rejects_unknown_types_and_missing_types() {
        assert_eq!(
            Structure::parse("a Frobnicate").unwrap_err().to_string(),
            "Unknown data type family: Frobnicate"
        );
        assert!(Structure::parse("a").is_err());
        assert!(Structure::parse("  ").is_err());
    }

    #[test]
    fn converts_with_range_checks() {
        let small = ColumnType::parse("UInt8").unwrap();
        assert_eq!(small.convert(Some("200")).unwrap(), SqlValue::Integer(200));
        assert_eq!(
            small.convert(Some("300")).unwrap_err().to_string(),
            "Value 300 is out of range for UInt8"
        );
        assert!(small.convert(Some("abc")).is_err());
    }

    #[test]
    fn null_becomes_default_unless_nullable() {
        let plain = ColumnType::parse("Int32").unwrap();
        assert_eq!(plain.convert(None).unwrap(), SqlValue::Integer(0));
        let nullable = ColumnType::parse("Nullable(Int32)").unwrap();
        assert_eq!(nullable.convert(None).unwrap(), SqlValue::Null);
        let flag = ColumnType::parse("Bool").unwrap();
        assert_eq!(flag.convert(Some("true")).unwrap(), SqlValue::Integer(1));
    }

    #[test]
    fn infers_types_from_samples() {
        let names = vec!["n".to_string(), "f".to_string(), "s".to_string()];
        let rows = vec![
            vec![Some("1".into()), Some("1.5".into()), Some("x".into())],
            vec![Some("2".into()), Some("2".into()), None],
        ];
        let structure = Structure::infer(&names, &rows).unwrap();
        let types: Vec<&str> = structure
            .columns
            .iter()
            .map(|c| c.column_type.name.as_str())
            .collect();
        assert_eq!(types, vec!["Int64", "Float64", "Nullable(String)"]);
    }

    #[test]
    fn renders_ddl() {
        let structure = Structure::parse("a Int64, b String").unwrap();
        assert_eq!(
            structure.create_table_sql("temp.\"table\""),
            "CREATE TABLE temp.\"table\" (\"a\" INTEGER, \"b\" TEXT)"
        );
        assert_eq!(
            structure.insert_sql("t"),
            "INSERT INTO t (\"a\", \"b\") VALUES (?, ?)"
        );
    }
}
