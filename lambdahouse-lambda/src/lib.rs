pub mod dispatcher;
pub mod logging;
pub mod options;

pub use dispatcher::{DispatchError, Dispatcher, DISCONNECTED_ERROR_TYPE, DISCONNECTED_MESSAGE};

use lambdahouse_core::worker::panic_message;
use lambdahouse_core::{spawn_worker, QueryEngine, Rendezvous, Result, WorkerExit, DEFAULT_QUEUE_CAPACITY};
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use std::thread::JoinHandle;

/// The engine worker and the channel that feeds it.
///
/// The engine is built on the worker thread by the factory passed to
/// [`LambdaServer::start`]; only queries and results cross threads.
pub struct LambdaServer {
    channel: Arc<Rendezvous>,
    worker: JoinHandle<WorkerExit>,
}

impl LambdaServer {
    pub fn start<E, F>(factory: F) -> Result<Self>
    where
        E: QueryEngine,
        F: FnOnce() -> Result<E> + Send + 'static,
    {
        let channel = Rendezvous::new(DEFAULT_QUEUE_CAPACITY);
        let worker = spawn_worker(factory, channel.worker())?;
        Ok(Self { channel, worker })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.channel.dispatcher())
    }

    /// Closes both queues and waits for the worker to tear the engine down.
    pub fn shutdown(self) -> WorkerExit {
        self.channel.close();
        match self.worker.join() {
            Ok(exit) => exit,
            Err(payload) => WorkerExit::Panicked(panic_message(payload.as_ref())),
        }
    }
}

/// Serves invocations until the runtime stops.
pub async fn run_lambda(dispatcher: Dispatcher) -> std::result::Result<(), lambda_runtime::Error> {
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let dispatcher = dispatcher.clone();
        async move { dispatcher.handle(event.payload).await }
    }))
    .await
}
