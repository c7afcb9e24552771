use crate::caches::{physical_memory, CacheSizes};
use crate::catalog::{self, SystemSnapshot};
use crate::config::EngineConfig;
use crate::formats::output::write_result;
use crate::formats::{FormatOptions, FormatRegistry};
use crate::settings::{OverflowMode, ReadMethod, Settings};
use crate::statement::{analyze, StatementContext, INPUT_TABLE_NAME};
use crate::storage_error;
use crate::table::EphemeralTable;
use crate::users::UserDirectory;
use crate::value::ResultSet;
use crate::workdir::WorkingDirectory;
use lambdahouse_core::{LambdahouseError, Query, QueryEngine, QueryResult, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Column, ConnectOptions, Connection, Executor, Statement as _};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

/// The embedded engine: one SQLite connection plus the runtime that drives it.
///
/// Built and used on the worker thread only. Every query runs to completion
/// inside `block_on` on a private current-thread runtime.
pub struct SqliteEngine {
    runtime: tokio::runtime::Runtime,
    session: Session,
}

struct Session {
    conn: Option<SqliteConnection>,
    settings: Settings,
    formats: FormatRegistry,
    default_output_format: String,
    default_input_format: String,
    default_database: String,
    query_parameters: BTreeMap<String, String>,
    system_tables: bool,
    workdir: Option<WorkingDirectory>,
}

impl SqliteEngine {
    pub fn start(config: EngineConfig) -> Result<Self> {
        let started = Instant::now();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(config.max_io_threads)
            .thread_name("lambdahouse-io")
            .build()?;
        let session = runtime.block_on(Session::open(config))?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine initialized"
        );
        Ok(Self { runtime, session })
    }

    pub fn settings(&self) -> &Settings {
        &self.session.settings
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.session.workdir.as_ref().map(WorkingDirectory::root)
    }
}

impl QueryEngine for SqliteEngine {
    fn run_query(&mut self, query: Query) -> QueryResult {
        let query_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("query", %query_id);
        let _entered = span.enter();
        let started = Instant::now();
        tracing::debug!(query = %query.query_text, "executing");

        match self.runtime.block_on(self.session.execute(query)) {
            Ok((format, data)) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    bytes = data.len(),
                    "query finished"
                );
                QueryResult::success(format, data)
            }
            Err(err) => {
                tracing::warn!(code = err.code(), "query failed: {err}");
                QueryResult::from(err)
            }
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        let mut first_error = None;
        if let Some(conn) = self.session.conn.take() {
            if let Err(err) = self.runtime.block_on(conn.close()) {
                tracing::warn!("closing the engine connection failed: {err}");
                first_error = Some(storage_error(err));
            }
        }
        if let Some(workdir) = self.session.workdir.take() {
            if let Err(err) = workdir.cleanup() {
                tracing::warn!("cleaning the working directory failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Session {
    async fn open(config: EngineConfig) -> Result<Self> {
        let formats = FormatRegistry::new();

        let mut workdir = WorkingDirectory::prepare(
            config.path.as_deref(),
            config.user_scripts_path.as_deref(),
            config.top_level_domains_path.as_deref(),
        )?;
        if !workdir.is_temporary() {
            workdir.write_status()?;
        }

        let users = UserDirectory::load(&config.tree, config.password_policy)?;
        let user = users.login(&config.user, &config.password, IpAddr::V6(Ipv6Addr::LOCALHOST))?;
        let mut settings = Settings::default();
        for (name, value) in users.profile_settings(&user.profile) {
            settings.set(name, value)?;
        }
        settings.apply_lambda_overrides()?;

        let caches = CacheSizes::from_config(&config.tree, physical_memory())?;

        let persisted = (!workdir.is_temporary() && !config.only_system_tables)
            .then(|| workdir.data().join(format!("{}.sqlite", config.default_database)));
        let options = match &persisted {
            Some(file) => SqliteConnectOptions::new()
                .filename(file)
                .create_if_missing(true),
            None => SqliteConnectOptions::from_str("sqlite::memory:").map_err(storage_error)?,
        };
        let mut conn = options
            .disable_statement_logging()
            .connect()
            .await
            .map_err(storage_error)?;

        sqlx::raw_sql(&format!("PRAGMA cache_size = -{}", caches.page_cache_kib()))
            .execute(&mut conn)
            .await
            .map_err(storage_error)?;
        let mmap_size = match settings.storage_file_read_method {
            ReadMethod::Mmap => caches.mmap,
            ReadMethod::Read | ReadMethod::Pread => 0,
        };
        sqlx::raw_sql(&format!("PRAGMA mmap_size = {mmap_size}"))
            .execute(&mut conn)
            .await
            .map_err(storage_error)?;
        let tmp = workdir.tmp().display().to_string().replace('\'', "''");
        if let Err(err) = sqlx::raw_sql(&format!("PRAGMA temp_store_directory = '{tmp}'"))
            .execute(&mut conn)
            .await
        {
            tracing::warn!("temporary storage stays at the SQLite default: {err}");
        }

        if !config.only_system_tables {
            load_user_defined_objects(&mut conn, &workdir.user_defined()).await?;
        }

        let system_tables = !config.no_system_tables;
        if system_tables {
            let mut server_settings = vec![
                ("max_concurrent_queries".to_string(), "0".to_string()),
                ("default_database".to_string(), config.default_database.clone()),
                ("path".to_string(), workdir.root().display().to_string()),
                ("max_io_thread_pool_size".to_string(), config.max_io_threads.to_string()),
                ("output-format".to_string(), config.default_output_format.clone()),
            ];
            server_settings.extend(
                caches
                    .entries()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value)),
            );
            let snapshot = SystemSnapshot {
                formats: &formats,
                settings: &settings,
                users: &users,
                server_settings,
                macros: &config.macros,
                top_level_domains: catalog::load_top_level_domains(workdir.top_level_domains())?,
            };
            catalog::attach_system_database(&mut conn, &snapshot).await?;
            catalog::attach_information_schema(&mut conn).await?;
        }

        if let Some(initial) = &config.initial_table {
            let kind = formats.input(&initial.format)?;
            let options = FormatOptions::from(&settings);
            let table = match &initial.structure {
                Some(structure) => {
                    let data = std::fs::read(&initial.file).map_err(|e| {
                        LambdahouseError::BadArguments(format!(
                            "Cannot read file {}: {e}",
                            initial.file.display()
                        ))
                    })?;
                    EphemeralTable::from_data(&initial.name, structure, kind, &data, options)?
                }
                None => EphemeralTable::from_file(&initial.name, &initial.file, kind, options)?,
            };
            table.persist(&mut conn).await?;
            tracing::info!(table = %initial.name, rows = table.row_count(), "initial table loaded");
        }

        tracing::info!(
            path = %workdir.root().display(),
            user = %user.name,
            persisted = persisted.is_some(),
            system_tables,
            "engine session opened"
        );

        Ok(Self {
            conn: Some(conn),
            settings,
            formats,
            default_output_format: config.default_output_format,
            default_input_format: config.default_input_format,
            default_database: config.default_database,
            query_parameters: config.query_parameters,
            system_tables,
            workdir: Some(workdir),
        })
    }

    async fn execute(&mut self, query: Query) -> Result<(String, String)> {
        if query.query_text.len() > self.settings.max_query_size {
            return Err(LambdahouseError::QueryTooLarge(format!(
                "Max query size exceeded: {} bytes, limit is {}",
                query.query_text.len(),
                self.settings.max_query_size
            )));
        }
        let options = FormatOptions::from(&self.settings);

        let input = if query.has_input() {
            let format = if query.input_format.is_empty() {
                &self.default_input_format
            } else {
                &query.input_format
            };
            let kind = self.formats.input(format)?;
            Some(EphemeralTable::from_data(
                INPUT_TABLE_NAME,
                &query.input_structure,
                kind,
                &query.input_data,
                options,
            )?)
        } else {
            None
        };

        let statement = analyze(
            &query.query_text,
            &StatementContext {
                parameters: &self.query_parameters,
                allow_introspection: self.settings.allow_introspection_functions,
                formats: &self.formats,
            },
        )?;

        let format = statement
            .format
            .clone()
            .or_else(|| (!query.output_format.is_empty()).then(|| query.output_format.clone()))
            .unwrap_or_else(|| self.default_output_format.clone());
        let kind = self.formats.output(&format)?;

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| LambdahouseError::Internal("engine is shut down".to_string()))?;

        let mut tables = Vec::new();
        if let Some(table) = input {
            tables.push(table);
        }
        for file in &statement.files {
            let kind = self.formats.for_path(&file.path).ok_or_else(|| {
                LambdahouseError::UnknownFormat(format!("for file {}", file.path))
            })?;
            tables.push(EphemeralTable::from_file(&file.table, Path::new(&file.path), kind, options)?);
        }

        let default_database = self.default_database.as_str();
        let refresh_schema = statement.reads_information_schema && self.system_tables;
        let outcome = async {
            for table in &tables {
                table.attach(&mut *conn).await?;
            }
            if refresh_schema {
                catalog::refresh_information_schema(&mut *conn, default_database, true).await?;
            }
            fetch(&mut *conn, &statement.sql).await
        }
        .await;

        for table in &tables {
            if let Err(err) = table.detach(conn).await {
                tracing::warn!(table = table.name(), "dropping input table failed: {err}");
            }
        }

        let mut set = outcome?;
        apply_result_limits(&mut set, &self.settings)?;
        let data = write_result(kind, &set, options)?;
        Ok((format, data))
    }
}

async fn fetch(conn: &mut SqliteConnection, sql: &str) -> Result<ResultSet> {
    let rows = sqlx::raw_sql(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(storage_error)?;
    let mut set = ResultSet::from_rows(&rows)?;
    if set.columns.is_empty() {
        // Header formats still need names when nothing came back.
        if let Ok(prepared) = (&mut *conn).prepare(sql).await {
            set.columns = prepared.columns().iter().map(|c| c.name().to_string()).collect();
        }
    }
    Ok(set)
}

fn apply_result_limits(set: &mut ResultSet, settings: &Settings) -> Result<()> {
    let max = settings.max_result_rows;
    let rows = set.rows.len() as u64;
    if max == 0 || rows <= max {
        return Ok(());
    }
    match settings.result_overflow_mode {
        OverflowMode::Throw => Err(LambdahouseError::TooManyRows(format!(
            "Limit for result exceeded, max rows: {max}, current rows: {rows}"
        ))),
        OverflowMode::Break => {
            set.rows.truncate(max as usize);
            Ok(())
        }
    }
}

/// Runs `user_defined/*.sql` in name order. A failing file aborts startup.
async fn load_user_defined_objects(conn: &mut SqliteConnection, dir: &Path) -> Result<()> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    files.sort();

    for path in files {
        let sql = std::fs::read_to_string(&path)?;
        sqlx::raw_sql(&sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                LambdahouseError::Storage(format!(
                    "Cannot load {}: {}",
                    path.display(),
                    storage_error(e)
                ))
            })?;
        tracing::debug!(file = %path.display(), "loaded user defined objects");
    }
    Ok(())
}
