//! Lexical analysis of incoming query text.
//!
//! The analyzer never parses SQL fully. It tokenizes enough to find clauses
//! that the engine handles itself (`INTO OUTFILE`, a trailing `FORMAT`, the
//! `\G` suffix, `{name:Type}` parameters, file references) and rewrites the
//! text that goes to SQLite.

use crate::formats::FormatRegistry;
use crate::structure::{quote_identifier, ColumnType, Storage};
use lambdahouse_core::{LambdahouseError, Result};
use std::collections::BTreeMap;

pub const INPUT_TABLE_NAME: &str = "table";
pub const VERTICAL_FORMAT: &str = "Vertical";

const TRANSACTION_CONTROL: [&str; 6] = ["BEGIN", "COMMIT", "END", "ROLLBACK", "SAVEPOINT", "RELEASE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    Quoted,
    Str,
    Number,
    Param,
    Vertical,
    Punct,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

pub struct StatementContext<'a> {
    pub parameters: &'a BTreeMap<String, String>,
    pub allow_introspection: bool,
    pub formats: &'a FormatRegistry,
}

/// A file named in a `FROM 'path'` clause, loaded into `table` for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    pub path: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub format: Option<String>,
    pub files: Vec<FileReference>,
    pub reads_information_schema: bool,
}

pub fn analyze(text: &str, context: &StatementContext<'_>) -> Result<Statement> {
    let tokens = tokenize(text)?;
    let word = |t: &Token| (t.kind == Kind::Word).then(|| &text[t.start..t.end]);
    let is_word = |t: &Token, expected: &str| word(t).is_some_and(|w| w.eq_ignore_ascii_case(expected));

    if tokens
        .windows(2)
        .any(|pair| is_word(&pair[0], "INTO") && is_word(&pair[1], "OUTFILE"))
    {
        return Err(LambdahouseError::NotImplemented(
            "OUTFILE file is not supported in AWS lambda queries".to_string(),
        ));
    }

    let mut end = tokens.len();
    while end > 0 && tokens[end - 1].kind == Kind::Punct && &text[tokens[end - 1].start..tokens[end - 1].end] == ";" {
        end -= 1;
    }

    let mut format: Option<String> = None;
    if end > 0 && tokens[end - 1].kind == Kind::Vertical {
        format = Some(VERTICAL_FORMAT.to_string());
        end -= 1;
    }
    while end >= 2
        && is_word(&tokens[end - 2], "FORMAT")
        && matches!(tokens[end - 1].kind, Kind::Word | Kind::Quoted)
    {
        if format.is_some() {
            return Err(LambdahouseError::FormatAlreadySpecified(
                "Output format already specified".to_string(),
            ));
        }
        let name = &tokens[end - 1];
        format = Some(unquote(&text[name.start..name.end]));
        end -= 2;
    }

    let kept = &tokens[..end];
    if kept.is_empty() {
        return Err(LambdahouseError::BadArguments("Empty query".to_string()));
    }
    if kept.iter().any(|t| t.kind == Kind::Punct && &text[t.start..t.end] == ";") {
        return Err(LambdahouseError::Syntax(
            "Multi-statements are not allowed".to_string(),
        ));
    }
    // The shared connection is never left inside a transaction.
    if TRANSACTION_CONTROL.iter().any(|keyword| is_word(&kept[0], keyword)) {
        return Err(LambdahouseError::NotImplemented(
            "Transaction control statements are not supported in AWS lambda queries".to_string(),
        ));
    }

    let mut replacements: Vec<(usize, usize, String)> = Vec::new();
    let mut files = Vec::new();
    let mut reads_information_schema = false;
    let mut introspection = kept.first().is_some_and(|t| is_word(t, "PRAGMA"));

    for (index, token) in kept.iter().enumerate() {
        let after_source = index > 0 && (is_word(&kept[index - 1], "FROM") || is_word(&kept[index - 1], "JOIN"));
        let qualifies = kept
            .get(index + 1)
            .is_some_and(|next| next.kind == Kind::Punct && &text[next.start..next.end] == ".");
        let source = &text[token.start..token.end];
        match token.kind {
            Kind::Param => {
                let inner = &source[1..source.len() - 1];
                let (name, type_text) = inner.split_once(':').unwrap_or((inner, "String"));
                let value = substitute(name.trim(), type_text, context.parameters)?;
                replacements.push((token.start, token.end, value));
            }
            Kind::Word => {
                if (after_source || qualifies) && source.eq_ignore_ascii_case(INPUT_TABLE_NAME) {
                    replacements.push((token.start, token.end, quote_identifier(INPUT_TABLE_NAME)));
                }
                let lower = source.to_ascii_lowercase();
                if lower.starts_with("pragma_") {
                    introspection = true;
                }
                if lower == "information_schema" {
                    reads_information_schema = true;
                }
            }
            Kind::Str if after_source => {
                let path = unquote(source);
                if context.formats.for_path(&path).is_some() {
                    let table = format!("__file_{}", files.len());
                    replacements.push((token.start, token.end, quote_identifier(&table)));
                    files.push(FileReference { path, table });
                }
            }
            _ => {}
        }
    }

    if introspection && !context.allow_introspection {
        return Err(LambdahouseError::AccessDenied(
            "Introspection functions are disabled, because setting 'allow_introspection_functions' is set to 0"
                .to_string(),
        ));
    }

    let mut sql = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, stop, value) in replacements {
        sql.push_str(&text[cursor..start]);
        sql.push_str(&value);
        cursor = stop;
    }
    sql.push_str(&text[cursor..kept[kept.len() - 1].end]);

    Ok(Statement {
        sql,
        format,
        files,
        reads_information_schema,
    })
}

fn substitute(name: &str, type_text: &str, parameters: &BTreeMap<String, String>) -> Result<String> {
    let value = parameters.get(name).ok_or_else(|| {
        LambdahouseError::BadArguments(format!("Substitution `{name}` is not set"))
    })?;
    let column_type = ColumnType::parse(type_text)?;
    if column_type.nullable && value == "\\N" {
        return Ok("NULL".to_string());
    }
    match column_type.storage {
        Storage::Integer | Storage::Real => Ok(column_type
            .convert(Some(value))?
            .to_text()
            .unwrap_or_else(|| "NULL".to_string())),
        Storage::Text => Ok(format!("'{}'", value.replace('\'', "''"))),
    }
}

fn unquote(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(q @ ('\'' | '"' | '`')) if token.len() >= 2 && token.ends_with(q) => {
            let body = &token[1..token.len() - 1];
            let doubled: String = [q, q].iter().collect();
            body.replace(&doubled, &q.to_string())
        }
        _ => token.to_string(),
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let start = i;
        let kind = match b {
            _ if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
                continue;
            }
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i)?;
                if b == b'\'' {
                    Kind::Str
                } else {
                    Kind::Quoted
                }
            }
            b'{' => match parameter_end(bytes, i) {
                Some(stop) => {
                    i = stop;
                    Kind::Param
                }
                None => {
                    i += 1;
                    Kind::Punct
                }
            },
            b'\\' if matches!(bytes.get(i + 1), Some(b'G' | b'g')) => {
                i += 2;
                Kind::Vertical
            }
            _ if b.is_ascii_digit() => {
                while i < bytes.len() && (is_word_byte(bytes[i]) || bytes[i] == b'.') {
                    i += 1;
                }
                Kind::Number
            }
            _ if is_word_byte(b) => {
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                Kind::Word
            }
            _ => {
                i += 1;
                Kind::Punct
            }
        };
        tokens.push(Token { kind, start, end: i });
    }
    Ok(tokens)
}

fn skip_quoted(bytes: &[u8], start: usize) -> Result<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return Ok(i + 1);
                }
            }
            _ => i += 1,
        }
    }
    Err(LambdahouseError::BadArguments(format!(
        "Syntax error: unterminated {} literal",
        if quote == b'\'' { "string" } else { "identifier" }
    )))
}

/// End of a `{name:Type}` placeholder starting at `start`, if it is one.
fn parameter_end(bytes: &[u8], start: usize) -> Option<usize> {
    let close = start + bytes[start..].iter().position(|&b| b == b'}')?;
    let inner = std::str::from_utf8(&bytes[start + 1..close]).ok()?;
    let (name, ty) = inner.split_once(':')?;
    let name = name.trim();
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !ty.trim().is_empty();
    valid.then_some(close + 1)
}
