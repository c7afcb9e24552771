use lambdahouse_lambda::logging::{init_logging, LogSettings};
use lambdahouse_lambda::options::{Options, OptionsError};
use lambdahouse_lambda::{run_lambda, LambdaServer};
use lambdahouse_core::LambdahouseError;
use lambdahouse_sqlite::{EngineConfig, SqliteEngine};
use std::process::ExitCode;

fn main() -> ExitCode {
    let code = run();
    // The platform sees only the low byte of the engine error code.
    ExitCode::from(u8::try_from(code.rem_euclid(256)).unwrap_or(u8::MAX))
}

fn run() -> i32 {
    let options = match Options::parse_from(std::env::args()) {
        Ok(options) => options,
        Err(OptionsError::Usage(err))
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            err.exit()
        }
        Err(err) => {
            eprintln!("{err}");
            return err.code();
        }
    };

    let tree = match options.load_config() {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("{err}");
            return err.code();
        }
    };

    let logging = LogSettings::from_config(&tree).and_then(|settings| {
        init_logging(&settings).map_err(|e| LambdahouseError::BadArguments(e.to_string()))
    });
    if let Err(err) = logging {
        eprintln!("{err}");
        return err.code();
    }

    let config = match EngineConfig::from_tree(tree) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(code = err.code(), "invalid configuration: {err}");
            return err.code();
        }
    };

    let server = match LambdaServer::start(move || SqliteEngine::start(config)) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(code = err.code(), "cannot start the engine worker: {err}");
            return err.code();
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            let err = LambdahouseError::Io(err);
            tracing::error!("cannot start the invocation runtime: {err}");
            let _ = server.shutdown();
            return err.code();
        }
    };

    tracing::info!("serving lambda invocations");
    let served = runtime.block_on(run_lambda(server.dispatcher()));
    drop(runtime);

    let exit = server.shutdown();
    let mut code = exit.exit_code();
    if let Err(err) = served {
        tracing::error!("lambda runtime stopped: {err}");
        if code == 0 {
            code = LambdahouseError::Internal(String::new()).code();
        }
    }
    tracing::info!(?exit, code, "lambdahouse stopped");
    code
}
