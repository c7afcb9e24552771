pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod testing;
pub mod worker;

pub use channel::{BoundedQueue, DispatcherSide, Rendezvous, WorkerSide, DEFAULT_QUEUE_CAPACITY};
pub use codec::RequestContext;
pub use config::ConfigTree;
pub use error::{LambdahouseError, Result};
pub use worker::{spawn_worker, WorkerExit};

use serde::{Deserialize, Serialize};

/// One query submitted by an invocation.
///
/// Empty `output_format` and `input_format` mean "use the engine default".
/// `input_data` is only meaningful together with `input_structure`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub query_text: String,
    pub output_format: String,
    pub input_format: String,
    pub input_structure: String,
    pub input_data: Vec<u8>,
}

impl Query {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            ..Default::default()
        }
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    pub fn with_input(
        mut self,
        format: impl Into<String>,
        structure: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.input_format = format.into();
        self.input_structure = structure.into();
        self.input_data = data.into();
        self
    }

    pub fn has_input(&self) -> bool {
        !self.input_data.is_empty()
    }
}

/// Outcome of a single query: formatted output or an error message, never both.
///
/// Serializes to the wire shape directly: `{"format", "data"}` or `{"error"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResult {
    Success { format: String, data: String },
    Failure { error: String },
}

impl QueryResult {
    pub fn success(format: impl Into<String>, data: impl Into<String>) -> Self {
        QueryResult::Success {
            format: format.into(),
            data: data.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        QueryResult::Failure {
            error: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success { .. })
    }
}

impl From<LambdahouseError> for QueryResult {
    fn from(err: LambdahouseError) -> Self {
        QueryResult::error(err.to_string())
    }
}

/// An embedded engine that turns a [`Query`] into a [`QueryResult`].
///
/// Implementations are created and driven on the worker thread only, so they
/// need not be `Send` or `Sync`.
pub trait QueryEngine {
    fn run_query(&mut self, query: Query) -> QueryResult;

    /// Releases process-wide resources. Called once when the worker exits.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
