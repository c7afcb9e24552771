use base64::Engine as _;
use lambdahouse_core::ConfigTree;
use lambdahouse_lambda::LambdaServer;
use lambdahouse_sqlite::{EngineConfig, SqliteEngine};
use serde_json::{json, Value};

fn sqlite_server() -> LambdaServer {
    let config = EngineConfig::from_tree(ConfigTree::new()).unwrap();
    LambdaServer::start(move || SqliteEngine::start(config)).unwrap()
}

async fn invoke(server: &LambdaServer, event: Value) -> Value {
    server.dispatcher().handle(event).await.unwrap()
}

#[tokio::test]
async fn inline_csv_is_summed_per_row() {
    let server = sqlite_server();
    let response = invoke(
        &server,
        json!({ "clickHouse": {
            "query": "SELECT a+b FROM table",
            "inputFormat": "CSV",
            "structure": "a Int64, b Int64",
            "data": "1,2\n3,4"
        }}),
    )
    .await;
    assert_eq!(response, json!({ "format": "TSV", "data": "3\n7\n" }));
    server.shutdown();
}

#[tokio::test]
async fn requested_output_format_is_echoed() {
    let server = sqlite_server();
    let response = invoke(
        &server,
        json!({ "clickHouse": { "query": "SELECT 1", "outputFormat": "JSONEachRow" } }),
    )
    .await;
    assert_eq!(response, json!({ "format": "JSONEachRow", "data": "{\"1\":1}\n" }));
    server.shutdown();
}

#[tokio::test]
async fn rest_gateway_gets_a_body_wrapper_with_or_without_base64() {
    let server = sqlite_server();
    let body = "{\"clickHouse\":{\"query\":\"SELECT 1\"}}";
    let expected = json!({ "body": { "format": "TSV", "data": "1\n" } });

    let plain = invoke(
        &server,
        json!({ "httpMethod": "POST", "body": body, "isBase64Encoded": "false" }),
    )
    .await;
    assert_eq!(plain, expected);

    let encoded = base64::engine::general_purpose::STANDARD.encode(body);
    let decoded = invoke(
        &server,
        json!({ "httpMethod": "POST", "body": encoded, "isBase64Encoded": "true" }),
    )
    .await;
    assert_eq!(decoded, expected);
    server.shutdown();
}

#[tokio::test]
async fn engine_errors_are_returned_as_error_objects() {
    let server = sqlite_server();
    let response = invoke(&server, json!({ "clickHouse": { "query": "SELECT nonexistent()" } })).await;
    assert_eq!(response, json!({ "error": "no such function: nonexistent" }));
    server.shutdown();
}

#[tokio::test]
async fn non_object_payload_is_a_parse_error() {
    let server = sqlite_server();
    let response = invoke(&server, json!("not json")).await;
    assert!(response["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to parse lambda input JSON: "));
    server.shutdown();
}

#[tokio::test]
async fn input_table_is_gone_after_the_invocation() {
    let server = sqlite_server();
    let with_data = invoke(
        &server,
        json!({ "clickHouse": {
            "query": "SELECT count(*) FROM table",
            "structure": "s String",
            "data": "a\nb\nc\n"
        }}),
    )
    .await;
    assert_eq!(with_data, json!({ "format": "TSV", "data": "3\n" }));

    let without = invoke(&server, json!({ "clickHouse": { "query": "SELECT count(*) FROM table" } })).await;
    assert_eq!(without, json!({ "error": "no such table: table" }));
    server.shutdown();
}
