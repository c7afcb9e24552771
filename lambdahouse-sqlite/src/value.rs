use lambdahouse_core::{LambdahouseError, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Plain text rendering, `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(v) => Some(v.to_string()),
            SqlValue::Real(v) => Some(format_float(*v)),
            SqlValue::Text(v) => Some(v.clone()),
            SqlValue::Blob(v) => Some(blob_text(v)),
        }
    }

    fn type_name(&self) -> Option<&'static str> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(_) => Some("Int64"),
            SqlValue::Real(_) => Some("Float64"),
            SqlValue::Text(_) | SqlValue::Blob(_) => Some("String"),
        }
    }
}

/// UTF-8 blobs read as text; anything else is rendered like SQLite's `hex()`.
pub fn blob_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|b| format!("{b:02X}")).collect(),
    }
}

pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        v.to_string()
    }
}

/// Rows of one statement with their column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn from_rows(rows: &[SqliteRow]) -> Result<Self> {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, rows })
    }

    /// Column types for format metadata, inferred from the stored values.
    pub fn column_types(&self) -> Vec<String> {
        (0..self.columns.len())
            .map(|index| {
                let mut base: Option<&str> = None;
                let mut nullable = false;
                for row in &self.rows {
                    match row.get(index).and_then(SqlValue::type_name) {
                        None => nullable = true,
                        Some(name) => {
                            base = match (base, name) {
                                (None, name) => Some(name),
                                (Some(a), b) if a == b => Some(a),
                                (Some("Int64"), "Float64") | (Some("Float64"), "Int64") => {
                                    Some("Float64")
                                }
                                _ => Some("String"),
                            }
                        }
                    }
                }
                match (base, nullable) {
                    (Some(name), false) => name.to_string(),
                    (Some(name), true) => format!("Nullable({name})"),
                    (None, _) => "Nullable(Nothing)".to_string(),
                }
            })
            .collect()
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    (0..row.columns().len())
        .map(|index| decode_value(row, index))
        .collect()
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| LambdahouseError::Storage(e.to_string()))?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(index).map(SqlValue::Integer),
        "REAL" => row.try_get_unchecked::<f64, _>(index).map(SqlValue::Real),
        "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(index).map(SqlValue::Blob),
        _ => row.try_get_unchecked::<String, _>(index).map(SqlValue::Text),
    };
    value.map_err(|e| LambdahouseError::Storage(e.to_string()))
}
