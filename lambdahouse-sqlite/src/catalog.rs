//! The `system` and `information_schema` databases.

use crate::formats::FormatRegistry;
use crate::settings::Settings;
use crate::storage_error;
use crate::users::UserDirectory;
use lambdahouse_core::Result;
use sqlx::sqlite::SqliteConnection;
use std::collections::BTreeMap;
use std::path::Path;

const SYSTEM_TABLES: &str = "
    CREATE TABLE system.one (dummy INTEGER);
    INSERT INTO system.one VALUES (0);
    CREATE TABLE system.formats (name TEXT, is_input INTEGER, is_output INTEGER);
    CREATE TABLE system.settings (name TEXT, value TEXT, changed INTEGER);
    CREATE TABLE system.server_settings (name TEXT, value TEXT);
    CREATE TABLE system.macros (macro TEXT, substitution TEXT);
    CREATE TABLE system.users (name TEXT, profile TEXT, auth_type TEXT, networks TEXT);
    CREATE TABLE system.top_level_domains (list TEXT, domain TEXT);
";

const INFORMATION_SCHEMA_TABLES: &str = "
    CREATE TABLE information_schema.schemata (catalog_name TEXT, schema_name TEXT);
    CREATE TABLE information_schema.tables (
        table_catalog TEXT, table_schema TEXT, table_name TEXT, table_type TEXT
    );
";

/// Read-only facts copied into `system` when it is attached.
pub struct SystemSnapshot<'a> {
    pub formats: &'a FormatRegistry,
    pub settings: &'a Settings,
    pub users: &'a UserDirectory,
    pub server_settings: Vec<(String, String)>,
    pub macros: &'a BTreeMap<String, String>,
    pub top_level_domains: Vec<(String, String)>,
}

pub async fn attach_system_database(conn: &mut SqliteConnection, snapshot: &SystemSnapshot<'_>) -> Result<()> {
    sqlx::raw_sql("ATTACH DATABASE ':memory:' AS system")
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;
    sqlx::raw_sql(SYSTEM_TABLES)
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;

    for entry in snapshot.formats.entries() {
        sqlx::query("INSERT INTO system.formats (name, is_input, is_output) VALUES (?, ?, ?)")
            .bind(entry.name)
            .bind(entry.is_input)
            .bind(entry.is_output)
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
    }
    for (name, value, changed) in snapshot.settings.entries() {
        sqlx::query("INSERT INTO system.settings (name, value, changed) VALUES (?, ?, ?)")
            .bind(name)
            .bind(value)
            .bind(changed)
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
    }
    for (name, value) in &snapshot.server_settings {
        sqlx::query("INSERT INTO system.server_settings (name, value) VALUES (?, ?)")
            .bind(name)
            .bind(value)
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
    }
    for (name, substitution) in snapshot.macros {
        sqlx::query("INSERT INTO system.macros (macro, substitution) VALUES (?, ?)")
            .bind(name)
            .bind(substitution)
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
    }
    for user in snapshot.users.users() {
        sqlx::query("INSERT INTO system.users (name, profile, auth_type, networks) VALUES (?, ?, ?, ?)")
            .bind(&user.name)
            .bind(&user.profile)
            .bind(user.auth_type())
            .bind(user.networks.join(","))
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
    }
    for (list, domain) in &snapshot.top_level_domains {
        sqlx::query("INSERT INTO system.top_level_domains (list, domain) VALUES (?, ?)")
            .bind(list)
            .bind(domain)
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
    }
    Ok(())
}

pub async fn attach_information_schema(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::raw_sql("ATTACH DATABASE ':memory:' AS information_schema")
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;
    sqlx::raw_sql(INFORMATION_SCHEMA_TABLES)
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;
    Ok(())
}

/// Rebuilds `information_schema` from the live catalog.
pub async fn refresh_information_schema(
    conn: &mut SqliteConnection,
    default_database: &str,
    with_system: bool,
) -> Result<()> {
    sqlx::raw_sql("DELETE FROM information_schema.schemata; DELETE FROM information_schema.tables;")
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;

    let mut schemas = vec![(default_database, "main"), ("temp", "temp")];
    if with_system {
        schemas.push(("system", "system"));
    }
    schemas.push(("information_schema", "information_schema"));

    for (schema, attached) in schemas {
        sqlx::query("INSERT INTO information_schema.schemata (catalog_name, schema_name) VALUES (?, ?)")
            .bind(schema)
            .bind(schema)
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
        let listing = format!(
            "INSERT INTO information_schema.tables (table_catalog, table_schema, table_name, table_type)
             SELECT ?, ?, name, CASE type WHEN 'view' THEN 'VIEW' ELSE 'BASE TABLE' END
             FROM {attached}.sqlite_master
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
             ORDER BY name"
        );
        sqlx::query(&listing)
            .bind(schema)
            .bind(schema)
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
    }
    Ok(())
}

/// Reads every file in `dir` as a domain list named after the file.
pub fn load_top_level_domains(dir: &Path) -> Result<Vec<(String, String)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut domains = Vec::new();
    for path in files {
        let list = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = std::fs::read_to_string(&path)?;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            domains.push((list.clone(), line.to_string()));
        }
    }
    tracing::debug!(count = domains.len(), "loaded top level domains");
    Ok(domains)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_domain_lists_skipping_comments() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("public_suffix_list.dat"), "// comment\ncom\n\nco.uk\n").unwrap();
        let domains = load_top_level_domains(dir.path()).unwrap();
        assert_eq!(
            domains,
            vec![
                ("public_suffix_list.dat".to_string(), "com".to_string()),
                ("public_suffix_list.dat".to_string(), "co.uk".to_string()),
            ]
        );
    }

    #[test]
    fn missing_directory_means_no_domains() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_top_level_domains(&dir.path().join("absent")).unwrap().is_empty());
    }
}
