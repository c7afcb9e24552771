use super::{FormatKind, FormatOptions};
use lambdahouse_core::{LambdahouseError, Result};
use serde_json::Value;

/// Raw text fields read from input data, before type conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Records {
    pub names: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Reads `data` in the given format.
///
/// With `columns`, rows come back aligned to those names (header formats and
/// JSON map fields by name). Without, names come from the header, the JSON
/// keys, or `c1..cN`.
pub fn read_records(
    kind: FormatKind,
    data: &[u8],
    columns: Option<&[String]>,
    options: FormatOptions,
) -> Result<Records> {
    match kind {
        FormatKind::TabSeparated | FormatKind::TabSeparatedWithNames => {
            let text = std::str::from_utf8(data)
                .map_err(|e| incorrect(format!("Input is not valid UTF-8: {e}")))?;
            let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).peekable();
            let header = if kind.has_header() {
                lines
                    .next()
                    .map(|line| line.split('\t').map(|f| unescape_tsv(f).unwrap_or_default()).collect())
            } else {
                None
            };
            let mut rows = Vec::new();
            while let Some(line) = lines.next() {
                if line.is_empty() && lines.peek().is_none() {
                    break;
                }
                rows.push(line.split('\t').map(unescape_tsv).collect());
            }
            positional(header, rows, columns, options)
        }
        FormatKind::Csv | FormatKind::CsvWithNames => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(kind.has_header())
                .delimiter(options.csv_delimiter)
                .flexible(true)
                .from_reader(data);
            let header = if kind.has_header() {
                let headers = reader.headers().map_err(|e| incorrect(e.to_string()))?;
                Some(headers.iter().map(str::to_string).collect())
            } else {
                None
            };
            let mut rows = Vec::new();
            for record in reader.records() {
                let record = record.map_err(|e| incorrect(e.to_string()))?;
                rows.push(
                    record
                        .iter()
                        .map(|field| (field != "\\N").then(|| field.to_string()))
                        .collect(),
                );
            }
            positional(header, rows, columns, options)
        }
        FormatKind::JsonEachRow => read_json_objects(data, columns, options),
        FormatKind::JsonCompactEachRow => {
            let mut rows = Vec::new();
            for value in serde_json::Deserializer::from_slice(data).into_iter::<Value>() {
                let value = value.map_err(|e| incorrect(e.to_string()))?;
                let Value::Array(items) = value else {
                    return Err(incorrect("JSONCompactEachRow expects one array per row"));
                };
                rows.push(items.into_iter().map(json_field).collect());
            }
            positional(None, rows, columns, options)
        }
        FormatKind::Json | FormatKind::Vertical => Err(LambdahouseError::BadArguments(format!(
            "Format {kind:?} is not suitable for input"
        ))),
    }
}

fn incorrect(message: impl Into<String>) -> LambdahouseError {
    LambdahouseError::IncorrectData(message.into())
}

fn positional(
    header: Option<Vec<String>>,
    rows: Vec<Vec<Option<String>>>,
    columns: Option<&[String]>,
    options: FormatOptions,
) -> Result<Records> {
    match (header, columns) {
        (None, None) => {
            let width = rows.iter().map(Vec::len).max().unwrap_or(0);
            let names = (1..=width).map(|i| format!("c{i}")).collect();
            let rows = rows
                .into_iter()
                .map(|mut row| {
                    row.resize(width, None);
                    row
                })
                .collect();
            Ok(Records { names, rows })
        }
        (Some(names), None) => {
            let width = names.len();
            for (index, row) in rows.iter().enumerate() {
                check_width(row.len(), width, index)?;
            }
            Ok(Records { names, rows })
        }
        (None, Some(columns)) => {
            for (index, row) in rows.iter().enumerate() {
                check_width(row.len(), columns.len(), index)?;
            }
            Ok(Records {
                names: columns.to_vec(),
                rows,
            })
        }
        (Some(header), Some(columns)) => {
            let mut mapping = Vec::with_capacity(header.len());
            for name in &header {
                let target = columns.iter().position(|c| c == name);
                if target.is_none() && !options.skip_unknown_fields {
                    return Err(incorrect(format!("Unknown field found in header: {name}")));
                }
                mapping.push(target);
            }
            let mut aligned = Vec::with_capacity(rows.len());
            for (index, row) in rows.into_iter().enumerate() {
                check_width(row.len(), header.len(), index)?;
                let mut out = vec![None; columns.len()];
                for (field, target) in row.into_iter().zip(&mapping) {
                    if let Some(target) = target {
                        out[*target] = field;
                    }
                }
                aligned.push(out);
            }
            Ok(Records {
                names: columns.to_vec(),
                rows: aligned,
            })
        }
    }
}

fn check_width(found: usize, expected: usize, row: usize) -> Result<()> {
    if found != expected {
        return Err(incorrect(format!(
            "Expected {expected} columns but found {found} in row {}",
            row + 1
        )));
    }
    Ok(())
}

fn read_json_objects(
    data: &[u8],
    columns: Option<&[String]>,
    options: FormatOptions,
) -> Result<Records> {
    let mut objects = Vec::new();
    for value in serde_json::Deserializer::from_slice(data).into_iter::<Value>() {
        match value.map_err(|e| incorrect(e.to_string()))? {
            Value::Object(object) => objects.push(object),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(object) => objects.push(object),
                        _ => return Err(incorrect("JSONEachRow expects one object per row")),
                    }
                }
            }
            _ => return Err(incorrect("JSONEachRow expects one object per row")),
        }
    }

    let names: Vec<String> = match columns {
        Some(columns) => columns.to_vec(),
        None => {
            let mut names: Vec<String> = Vec::new();
            for object in &objects {
                for key in object.keys() {
                    if !names.contains(key) {
                        names.push(key.clone());
                    }
                }
            }
            names
        }
    };

    let mut rows = Vec::with_capacity(objects.len());
    for object in objects {
        let mut row = vec![None; names.len()];
        for (key, value) in object {
            match names.iter().position(|n| *n == key) {
                Some(index) => row[index] = json_field(value),
                None if options.skip_unknown_fields => {}
                None => {
                    return Err(incorrect(format!(
                        "Unknown field found while parsing JSONEachRow format: {key}"
                    )))
                }
            }
        }
        rows.push(row);
    }
    Ok(Records { names, rows })
}

fn json_field(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Undoes TSV escaping. `\N` alone is NULL.
pub fn unescape_tsv(field: &str) -> Option<String> {
    if field == "\\N" {
        return None;
    }
    if !field.contains('\\') {
        return Some(field.to_string());
    }
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn some(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn reads_tsv_with_escapes_and_nulls() {
        let records = read_records(
            FormatKind::TabSeparated,
            b"a\\tb\t\\N\nline\\nbreak\tx\n",
            Some(&cols(&["s", "t"])),
            FormatOptions::default(),
        )
        .unwrap();
        assert_eq!(records.rows[0], vec![Some("a\tb".to_string()), None]);
        assert_eq!(records.rows[1], some(&["line\nbreak", "x"]));
    }

    #[test]
    fn reads_csv_without_trailing_newline() {
        let records = read_records(
            FormatKind::Csv,
            b"1,2\n3,4",
            Some(&cols(&["a", "b"])),
            FormatOptions::default(),
        )
        .unwrap();
        assert_eq!(records.rows, vec![some(&["1", "2"]), some(&["3", "4"])]);
    }

    #[test]
    fn honours_the_csv_delimiter() {
        let options = FormatOptions {
            csv_delimiter: b';',
            ..FormatOptions::default()
        };
        let records = read_records(FormatKind::Csv, b"\"x;y\";2\n", None, options).unwrap();
        assert_eq!(records.names, cols(&["c1", "c2"]));
        assert_eq!(records.rows, vec![some(&["x;y", "2"])]);
    }

    #[test]
    fn maps_header_columns_by_name() {
        let records = read_records(
            FormatKind::CsvWithNames,
            b"b,a\n2,1\n",
            Some(&cols(&["a", "b", "c"])),
            FormatOptions::default(),
        )
        .unwrap();
        assert_eq!(
            records.rows,
            vec![vec![Some("1".to_string()), Some("2".to_string()), None]]
        );
    }

    #[test]
    fn rejects_rows_of_the_wrong_width() {
        let err = read_records(
            FormatKind::TabSeparated,
            b"1\t2\t3\n",
            Some(&cols(&["a", "b"])),
            FormatOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Expected 2 columns but found 3 in row 1");
    }

    #[test]
    fn reads_json_each_row_by_key() {
        let records = read_records(
            FormatKind::JsonEachRow,
            b"{\"b\":\"x\",\"a\":1}\n{\"a\":2,\"extra\":true}\n",
            Some(&cols(&["a", "b"])),
            FormatOptions::default(),
        )
        .unwrap();
        assert_eq!(records.rows[0], some(&["1", "x"]));
        assert_eq!(records.rows[1], vec![Some("2".to_string()), None]);

        let strict = FormatOptions {
            skip_unknown_fields: false,
            ..FormatOptions::default()
        };
        assert!(read_records(
            FormatKind::JsonEachRow,
            b"{\"a\":2,\"extra\":true}",
            Some(&cols(&["a"])),
            strict
        )
        .is_err());
    }

    #[test]
    fn reads_compact_json_rows() {
        let records = read_records(
            FormatKind::JsonCompactEachRow,
            b"[1,\"a\"]\n[2,null]\n",
            None,
            FormatOptions::default(),
        )
        .unwrap();
        assert_eq!(records.names, cols(&["c1", "c2"]));
        assert_eq!(records.rows[1], vec![Some("2".to_string()), None]);
    }
}
