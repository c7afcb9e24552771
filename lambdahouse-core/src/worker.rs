use crate::channel::WorkerSide;
use crate::{LambdahouseError, QueryEngine, QueryResult, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

pub const WORKER_THREAD_NAME: &str = "lambdahouse-engine";

/// How the engine worker thread ended.
#[derive(Debug)]
pub enum WorkerExit {
    Stopped { served: u64 },
    InitFailed(LambdahouseError),
    Panicked(String),
}

impl WorkerExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerExit::Stopped { .. } => 0,
            WorkerExit::InitFailed(err) => err.code(),
            WorkerExit::Panicked(_) => LambdahouseError::Internal(String::new()).code(),
        }
    }
}

/// Starts the engine worker on its own thread. The engine is built by
/// `factory` on that thread and never leaves it.
pub fn spawn_worker<E, F>(factory: F, side: WorkerSide) -> std::io::Result<JoinHandle<WorkerExit>>
where
    E: QueryEngine,
    F: FnOnce() -> Result<E> + Send + 'static,
{
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run_worker(factory, side))
}

pub fn run_worker<E, F>(factory: F, side: WorkerSide) -> WorkerExit
where
    E: QueryEngine,
    F: FnOnce() -> Result<E>,
{
    let mut engine = match factory() {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(code = err.code(), "engine initialization failed: {err}");
            side.close();
            return WorkerExit::InitFailed(err);
        }
    };
    tracing::info!("engine ready, waiting for queries");

    let served = serve(&mut engine, &side);

    if let Err(err) = engine.shutdown() {
        tracing::warn!("engine shutdown failed: {err}");
    }
    side.close();
    tracing::info!(served, "engine worker stopped");
    WorkerExit::Stopped { served }
}

fn serve<E: QueryEngine>(engine: &mut E, side: &WorkerSide) -> u64 {
    let mut served = 0;
    while let Some(query) = side.next_query() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| engine.run_query(query)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!("query panicked: {message}");
                QueryResult::error(format!("Internal error while executing query: {message}"))
            });
        if !side.respond(result) {
            break;
        }
        served += 1;
    }
    served
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;
    use crate::{Query, Rendezvous};

    #[test]
    fn serves_until_the_channel_closes() {
        let channel = Rendezvous::new(2);
        let handle = spawn_worker(|| Ok(ScriptedEngine::echo()), channel.worker()).unwrap();

        let dispatcher = channel.dispatcher();
        let result = dispatcher.execute(Query::new("SELECT 1")).unwrap();
        assert_eq!(result, QueryResult::success("TSV", "SELECT 1"));

        dispatcher.close();
        match handle.join().unwrap() {
            WorkerExit::Stopped { served } => assert_eq!(served, 1),
            other => panic!("unexpected exit: {other:?}"),
        }
    }

    #[test]
    fn init_failure_closes_the_channel() {
        let channel = Rendezvous::new(2);
        let handle = spawn_worker(
            || -> Result<ScriptedEngine> {
                Err(LambdahouseError::BadArguments("no engine".to_string()))
            },
            channel.worker(),
        )
        .unwrap();

        let exit = handle.join().unwrap();
        assert_eq!(exit.exit_code(), 36);
        assert_eq!(channel.dispatcher().execute(Query::new("SELECT 1")), None);
    }

    #[test]
    fn engine_panics_become_error_results() {
        let channel = Rendezvous::new(2);
        let handle = spawn_worker(|| Ok(ScriptedEngine::echo()), channel.worker()).unwrap();

        let dispatcher = channel.dispatcher();
        let result = dispatcher.execute(Query::new(ScriptedEngine::PANIC)).unwrap();
        match result {
            QueryResult::Failure { error } => {
                assert!(error.starts_with("Internal error while executing query"))
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let result = dispatcher.execute(Query::new("SELECT 2")).unwrap();
        assert!(result.is_success());

        dispatcher.close();
        handle.join().unwrap();
    }
}
