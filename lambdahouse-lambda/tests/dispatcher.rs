use lambda_runtime::Diagnostic;
use lambdahouse_core::testing::ScriptedEngine;
use lambdahouse_core::{LambdahouseError, WorkerExit};
use lambdahouse_lambda::{DispatchError, LambdaServer};
use serde_json::json;
use std::sync::atomic::Ordering;

fn echo_server() -> LambdaServer {
    LambdaServer::start(|| Ok(ScriptedEngine::echo())).unwrap()
}

#[tokio::test]
async fn direct_invocation_round_trips_through_the_worker() {
    let server = echo_server();
    let response = server
        .dispatcher()
        .handle(json!({ "clickHouse": { "query": "SELECT 1", "outputFormat": "CSV" } }))
        .await
        .unwrap();
    assert_eq!(response, json!({ "format": "CSV", "data": "SELECT 1" }));
    assert!(matches!(server.shutdown(), WorkerExit::Stopped { served: 1 }));
}

#[tokio::test]
async fn rest_gateway_responses_are_wrapped_in_body() {
    let server = echo_server();
    let response = server
        .dispatcher()
        .handle(json!({
            "httpMethod": "POST",
            "body": "{\"clickHouse\":{\"query\":\"SELECT 1\"}}"
        }))
        .await
        .unwrap();
    assert_eq!(response, json!({ "body": { "format": "TSV", "data": "SELECT 1" } }));
    server.shutdown();
}

#[tokio::test]
async fn bad_payloads_never_reach_the_engine() {
    let server = echo_server();
    let dispatcher = server.dispatcher();
    let response = dispatcher.handle(json!("not json")).await.unwrap();
    let error = response["error"].as_str().unwrap();
    assert!(error.starts_with("Failed to parse lambda input JSON: "), "{error}");
    assert!(matches!(server.shutdown(), WorkerExit::Stopped { served: 0 }));
}

#[tokio::test]
async fn engine_failures_and_panics_become_error_responses() {
    let server = echo_server();
    let dispatcher = server.dispatcher();

    let failed = dispatcher
        .handle(json!({ "clickHouse": { "query": ScriptedEngine::FAIL } }))
        .await
        .unwrap();
    assert_eq!(failed, json!({ "error": "scripted failure" }));

    let panicked = dispatcher
        .handle(json!({ "clickHouse": { "query": ScriptedEngine::PANIC } }))
        .await
        .unwrap();
    assert_eq!(
        panicked,
        json!({ "error": "Internal error while executing query: scripted panic" })
    );

    let after = dispatcher
        .handle(json!({ "clickHouse": { "query": "SELECT 2" } }))
        .await
        .unwrap();
    assert_eq!(after, json!({ "format": "TSV", "data": "SELECT 2" }));
    server.shutdown();
}

#[tokio::test]
async fn concurrent_invocations_each_get_their_own_result() {
    let server = echo_server();
    let mut handles = Vec::new();
    for i in 0..8 {
        let dispatcher = server.dispatcher();
        handles.push(tokio::spawn(async move {
            let text = format!("SELECT {i}");
            let response = dispatcher
                .handle(json!({ "clickHouse": { "query": text } }))
                .await
                .unwrap();
            (text, response)
        }));
    }
    for handle in handles {
        let (text, response) = handle.await.unwrap();
        assert_eq!(response["data"], json!(text));
    }
    assert!(matches!(server.shutdown(), WorkerExit::Stopped { served: 8 }));
}

#[tokio::test]
async fn failed_engine_start_reports_disconnection() {
    let server = LambdaServer::start(|| -> lambdahouse_core::Result<ScriptedEngine> {
        Err(LambdahouseError::CannotLoadConfig("broken".to_string()))
    })
    .unwrap();
    let err = server
        .dispatcher()
        .handle(json!({ "clickHouse": { "query": "SELECT 1" } }))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Disconnected));

    let diagnostic = Diagnostic::from(err);
    assert_eq!(diagnostic.error_type, "FAILURE");
    assert_eq!(diagnostic.error_message, "ClickHouse lambda server disconnected");

    let exit = server.shutdown();
    assert_eq!(exit.exit_code(), 573);
}

#[tokio::test]
async fn shutdown_runs_the_engine_teardown() {
    let engine = ScriptedEngine::echo();
    let flag = engine.shutdown_flag();
    let server = LambdaServer::start(move || Ok(engine)).unwrap();
    server
        .dispatcher()
        .handle(json!({ "clickHouse": { "query": "SELECT 1" } }))
        .await
        .unwrap();
    server.shutdown();
    assert!(flag.load(Ordering::SeqCst));
}
