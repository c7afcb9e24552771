use lambdahouse_core::codec::{decode_event, encode_result};
use lambdahouse_core::{DispatcherSide, QueryResult};
use lambda_runtime::Diagnostic;
use serde_json::Value;
use std::time::Instant;

pub const DISCONNECTED_ERROR_TYPE: &str = "FAILURE";
pub const DISCONNECTED_MESSAGE: &str = "ClickHouse lambda server disconnected";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("ClickHouse lambda server disconnected")]
    Disconnected,
}

impl From<DispatchError> for Diagnostic {
    fn from(err: DispatchError) -> Self {
        let error_type = match err {
            DispatchError::Disconnected => DISCONNECTED_ERROR_TYPE,
        };
        Diagnostic {
            error_type: error_type.to_string(),
            error_message: err.to_string(),
        }
    }
}

/// Turns one invocation payload into one engine round trip.
#[derive(Clone)]
pub struct Dispatcher {
    side: DispatcherSide,
}

impl Dispatcher {
    pub fn new(side: DispatcherSide) -> Self {
        Self { side }
    }

    pub async fn handle(&self, event: Value) -> Result<Value, DispatchError> {
        let started = Instant::now();
        let (context, query) = decode_event(event);
        let result = match query {
            Ok(query) => {
                let side = self.side.clone();
                // Push and pop block, so they run off the runtime's worker threads.
                let received = tokio::task::spawn_blocking(move || side.execute(query))
                    .await
                    .ok()
                    .flatten();
                match received {
                    Some(result) => result,
                    None => {
                        tracing::error!("engine worker is gone");
                        return Err(DispatchError::Disconnected);
                    }
                }
            }
            Err(err) => {
                tracing::warn!("rejected invocation payload: {err}");
                QueryResult::from(err)
            }
        };

        tracing::debug!(
            ?context,
            success = result.is_success(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "invocation handled"
        );
        Ok(encode_result(&result, context))
    }
}
