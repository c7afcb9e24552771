use crate::formats::input::{read_records, Records};
use crate::formats::{FormatKind, FormatOptions};
use crate::storage_error;
use crate::structure::{quote_identifier, Structure};
use crate::value::SqlValue;
use lambdahouse_core::{LambdahouseError, Result};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection};
use sqlx::Connection;
use std::path::Path;

/// Rows materialized from inline data or a file, ready to be loaded into SQLite.
///
/// Attached into the `temp` schema, the table shadows a `main` table of the
/// same name until it is detached.
#[derive(Debug, Clone)]
pub struct EphemeralTable {
    name: String,
    structure: Structure,
    rows: Vec<Vec<SqlValue>>,
}

impl EphemeralTable {
    pub fn from_data(
        name: &str,
        structure: &str,
        kind: FormatKind,
        data: &[u8],
        options: FormatOptions,
    ) -> Result<Self> {
        let structure = Structure::parse(structure)?;
        let records = read_records(kind, data, Some(&structure.names()), options)?;
        Self::from_records(name, structure, records)
    }

    /// Loads a file, taking column names from its header and types from its values.
    pub fn from_file(name: &str, path: &Path, kind: FormatKind, options: FormatOptions) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            LambdahouseError::BadArguments(format!("Cannot read file {}: {e}", path.display()))
        })?;
        let records = read_records(kind, &data, None, options)?;
        let structure = Structure::infer(&records.names, &records.rows)?;
        Self::from_records(name, structure, records)
    }

    fn from_records(name: &str, structure: Structure, records: Records) -> Result<Self> {
        let mut rows = Vec::with_capacity(records.rows.len());
        for (index, raw) in records.rows.into_iter().enumerate() {
            let row = structure
                .columns
                .iter()
                .zip(raw.iter())
                .map(|(column, field)| {
                    column.column_type.convert(field.as_deref()).map_err(|e| {
                        LambdahouseError::IncorrectData(format!(
                            "{e} (row {}, column {})",
                            index + 1,
                            column.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        Ok(Self {
            name: name.to_string(),
            structure,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn qualified(&self, schema: &str) -> String {
        format!("{schema}.{}", quote_identifier(&self.name))
    }

    /// Creates the table in the `temp` schema, replacing a stale copy.
    pub async fn attach(&self, conn: &mut SqliteConnection) -> Result<()> {
        self.create_in(conn, "temp").await
    }

    /// Creates the table in the default database, where it stays for the process lifetime.
    pub async fn persist(&self, conn: &mut SqliteConnection) -> Result<()> {
        self.create_in(conn, "main").await
    }

    pub async fn detach(&self, conn: &mut SqliteConnection) -> Result<()> {
        drop_temp_table(conn, &self.name).await
    }

    async fn create_in(&self, conn: &mut SqliteConnection, schema: &str) -> Result<()> {
        let qualified = self.qualified(schema);
        let mut tx = conn.begin().await.map_err(storage_error)?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {qualified}"))
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        sqlx::query(&self.structure.create_table_sql(&qualified))
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        let insert = self.structure.insert_sql(&qualified);
        for row in &self.rows {
            let mut query = sqlx::query(&insert);
            for value in row {
                query = bind_value(query, value);
            }
            query.execute(&mut *tx).await.map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        tracing::debug!(table = %qualified, rows = self.rows.len(), "table loaded");
        Ok(())
    }
}

pub async fn drop_temp_table(conn: &mut SqliteConnection, name: &str) -> Result<()> {
    sqlx::query(&format!("DROP TABLE IF EXISTS temp.{}", quote_identifier(name)))
        .execute(conn)
        .await
        .map_err(storage_error)?;
    Ok(())
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Integer(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Blob(v) => query.bind(v.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_rows_to_column_types() {
        let table = EphemeralTable::from_data(
            "table",
            "a Int64, b Nullable(Float64)",
            FormatKind::Csv,
            b"1,2.5\n3,\\N\n",
            FormatOptions::default(),
        )
        .unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[1], vec![SqlValue::Integer(3), SqlValue::Null]);
    }

    #[test]
    fn reports_the_failing_row_and_column() {
        let err = EphemeralTable::from_data(
            "table",
            "a UInt8",
            FormatKind::TabSeparated,
            b"1\n999\n",
            FormatOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Value 999 is out of range for UInt8 (row 2, column a)"
        );
    }

    #[test]
    fn infers_structure_for_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "name,age\nann,31\nbob,27\n").unwrap();
        let table =
            EphemeralTable::from_file("__file_0", &path, FormatKind::CsvWithNames, FormatOptions::default())
                .unwrap();
        assert_eq!(table.structure().names(), vec!["name", "age"]);
        assert_eq!(table.rows[0], vec![SqlValue::Text("ann".into()), SqlValue::Integer(31)]);
    }
}
