pub mod caches;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod formats;
pub mod settings;
pub mod statement;
pub mod structure;
pub mod table;
pub mod users;
pub mod value;
pub mod workdir;

pub use config::{EngineConfig, InitialTable};
pub use engine::SqliteEngine;

use lambdahouse_core::LambdahouseError;

/// Keeps only the database message for engine errors, e.g. `no such function: f`.
pub(crate) fn storage_error(err: sqlx::Error) -> LambdahouseError {
    match err.as_database_error() {
        Some(db) => LambdahouseError::Storage(db.message().to_string()),
        None => LambdahouseError::Storage(err.to_string()),
    }
}
