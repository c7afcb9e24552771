use super::{FormatKind, FormatOptions};
use crate::value::{blob_text, ResultSet, SqlValue};
use lambdahouse_core::Result;
use std::fmt::Write;

pub fn write_result(kind: FormatKind, set: &ResultSet, options: FormatOptions) -> Result<String> {
    let mut out = String::new();
    match kind {
        FormatKind::TabSeparated | FormatKind::TabSeparatedWithNames => {
            if kind.has_header() {
                let names: Vec<String> = set.columns.iter().map(|c| escape_tsv(c)).collect();
                out.push_str(&names.join("\t"));
                out.push('\n');
            }
            for row in &set.rows {
                let fields: Vec<String> = row
                    .iter()
                    .map(|v| v.to_text().map_or_else(|| "\\N".to_string(), |t| escape_tsv(&t)))
                    .collect();
                out.push_str(&fields.join("\t"));
                out.push('\n');
            }
        }
        FormatKind::Csv | FormatKind::CsvWithNames => {
            let delimiter = char::from(options.csv_delimiter).to_string();
            if kind.has_header() {
                let names: Vec<String> = set.columns.iter().map(|c| quote_csv(c)).collect();
                out.push_str(&names.join(&delimiter));
                out.push('\n');
            }
            for row in &set.rows {
                let fields: Vec<String> = row.iter().map(csv_field).collect();
                out.push_str(&fields.join(&delimiter));
                out.push('\n');
            }
        }
        FormatKind::JsonEachRow => {
            for row in &set.rows {
                out.push_str(&json_object(&set.columns, row));
                out.push('\n');
            }
        }
        FormatKind::JsonCompactEachRow => {
            for row in &set.rows {
                let values: Vec<String> = row.iter().map(json_value).collect();
                let _ = writeln!(out, "[{}]", values.join(","));
            }
        }
        FormatKind::Json => {
            let meta: Vec<String> = set
                .columns
                .iter()
                .zip(set.column_types())
                .map(|(name, ty)| {
                    format!(
                        "{{\"name\":{},\"type\":{}}}",
                        serde_json::Value::from(name.as_str()),
                        serde_json::Value::from(ty)
                    )
                })
                .collect();
            let data: Vec<String> = set.rows.iter().map(|row| json_object(&set.columns, row)).collect();
            let _ = writeln!(
                out,
                "{{\"meta\":[{}],\"data\":[{}],\"rows\":{}}}",
                meta.join(","),
                data.join(","),
                set.rows.len()
            );
        }
        FormatKind::Vertical => {
            let width = set.columns.iter().map(|c| c.chars().count()).max().unwrap_or(0);
            for (index, row) in set.rows.iter().enumerate() {
                if index > 0 {
                    out.push('\n');
                }
                let title = format!("Row {}:", index + 1);
                let _ = writeln!(out, "{title}");
                let _ = writeln!(out, "{}", "─".repeat(title.chars().count()));
                for (name, value) in set.columns.iter().zip(row) {
                    let pad = width - name.chars().count();
                    let text = value.to_text().unwrap_or_else(|| "NULL".to_string());
                    let _ = writeln!(out, "{name}:{} {text}", " ".repeat(pad));
                }
            }
        }
    }
    Ok(out)
}

pub fn escape_tsv(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

fn quote_csv(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn csv_field(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "\\N".to_string(),
        SqlValue::Integer(_) | SqlValue::Real(_) => value.to_text().unwrap_or_default(),
        SqlValue::Text(_) | SqlValue::Blob(_) => quote_csv(&value.to_text().unwrap_or_default()),
    }
}

fn json_value(value: &SqlValue) -> String {
    let json = match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(v) => serde_json::Value::from(*v),
        SqlValue::Real(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(v) => serde_json::Value::from(v.as_str()),
        SqlValue::Blob(v) => serde_json::Value::from(blob_text(v)),
    };
    json.to_string()
}

// Written by hand so keys keep column order.
fn json_object(columns: &[String], row: &[SqlValue]) -> String {
    let pairs: Vec<String> = columns
        .iter()
        .zip(row)
        .map(|(name, value)| format!("{}:{}", serde_json::Value::from(name.as_str()), json_value(value)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        ResultSet {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![
                vec![SqlValue::Integer(1), SqlValue::Text("a\tb".to_string())],
                vec![SqlValue::Integer(2), SqlValue::Null],
            ],
        }
    }

    fn write(kind: FormatKind) -> String {
        write_result(kind, &sample(), FormatOptions::default()).unwrap()
    }

    #[test]
    fn writes_tsv_with_escapes() {
        assert_eq!(write(FormatKind::TabSeparated), "1\ta\\tb\n2\t\\N\n");
        assert_eq!(
            write(FormatKind::TabSeparatedWithNames),
            "id\tname\n1\ta\\tb\n2\t\\N\n"
        );
    }

    #[test]
    fn writes_csv_quoting_strings_only() {
        assert_eq!(
            write(FormatKind::CsvWithNames),
            "\"id\",\"name\"\n1,\"a\tb\"\n2,\\N\n"
        );
    }

    #[test]
    fn writes_json_rows_in_column_order() {
        assert_eq!(
            write(FormatKind::JsonEachRow),
            "{\"id\":1,\"name\":\"a\\tb\"}\n{\"id\":2,\"name\":null}\n"
        );
        assert_eq!(write(FormatKind::JsonCompactEachRow), "[1,\"a\\tb\"]\n[2,null]\n");
    }

    #[test]
    fn writes_json_document_with_meta() {
        let text = write(FormatKind::Json);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["rows"], 2);
        assert_eq!(parsed["meta"][0]["type"], "Int64");
        assert_eq!(parsed["meta"][1]["type"], "Nullable(String)");
        assert_eq!(parsed["data"][0]["id"], 1);
    }

    #[test]
    fn writes_vertical_blocks() {
        let set = ResultSet {
            columns: vec!["a".to_string(), "long".to_string()],
            rows: vec![vec![SqlValue::Integer(1), SqlValue::Real(2.5)]],
        };
        let text = write_result(FormatKind::Vertical, &set, FormatOptions::default()).unwrap();
        assert_eq!(text, "Row 1:\n──────\na:    1\nlong: 2.5\n");
    }
}
