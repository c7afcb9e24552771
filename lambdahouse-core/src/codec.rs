//! Lambda payload decoding and response encoding.
//!
//! Three request shapes are accepted:
//!
//! * direct invocation: `{"clickHouse": {...}}`
//! * REST API gateway: `{"httpMethod": ..., "body": "<json>", "isBase64Encoded": "true"?}`
//! * HTTP API gateway: `{"requestContext": {...}, "body": "<json>", ...}`
//!
//! Responses mirror the request shape: REST gateway results are wrapped in
//! `{"body": ...}`, the other two are returned as is.

use crate::{LambdahouseError, Query, QueryResult, Result};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const RESPONSE_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestContext {
    #[default]
    Direct,
    RestGateway,
    HttpGateway,
}

impl RequestContext {
    /// Classifies a top-level payload object by the gateway fields it carries.
    pub fn detect(event: &Map<String, Value>) -> Self {
        let present = |key: &str| event.get(key).is_some_and(|v| !v.is_null());
        if present("httpMethod") {
            RequestContext::RestGateway
        } else if present("requestContext") {
            RequestContext::HttpGateway
        } else {
            RequestContext::Direct
        }
    }
}

fn payload_error(detail: impl Into<String>) -> LambdahouseError {
    LambdahouseError::Payload(detail.into())
}

/// Decodes raw invocation bytes. The envelope kind is reported even when
/// decoding fails so the error can be wrapped the same way as a result.
pub fn decode_request(payload: &[u8]) -> (RequestContext, Result<Query>) {
    match serde_json::from_slice::<Value>(payload) {
        Ok(event) => decode_event(event),
        Err(e) => (RequestContext::Direct, Err(payload_error(e.to_string()))),
    }
}

pub fn decode_event(event: Value) -> (RequestContext, Result<Query>) {
    let Value::Object(event) = event else {
        return (
            RequestContext::Direct,
            Err(payload_error("expected a JSON object")),
        );
    };
    let context = RequestContext::detect(&event);
    let query = match context {
        RequestContext::Direct => query_from_object(&event),
        RequestContext::RestGateway | RequestContext::HttpGateway => {
            gateway_body(&event).and_then(|body| match body {
                Value::Object(inner) => query_from_object(&inner),
                _ => Err(payload_error("request body must be a JSON object")),
            })
        }
    };
    (context, query)
}

fn gateway_body(event: &Map<String, Value>) -> Result<Value> {
    let body = match event.get("body") {
        Some(Value::String(body)) => body,
        Some(_) => return Err(payload_error("Field 'body' must be a string")),
        None => return Err(payload_error("Missing 'body' field")),
    };

    // Only the literal string "true" marks an encoded body.
    let encoded = matches!(event.get("isBase64Encoded"), Some(Value::String(flag)) if flag == "true");
    let bytes = if encoded {
        base64::engine::general_purpose::STANDARD
            .decode(body.trim())
            .map_err(|e| payload_error(format!("Invalid base64 body: {e}")))?
    } else {
        body.as_bytes().to_vec()
    };

    serde_json::from_slice(&bytes).map_err(|e| payload_error(e.to_string()))
}

fn query_from_object(object: &Map<String, Value>) -> Result<Query> {
    let request = match object.get("clickHouse") {
        Some(Value::Object(request)) => request,
        Some(_) => return Err(payload_error("Field 'clickHouse' must be an object")),
        None => return Err(payload_error("Missing 'clickHouse' object")),
    };

    let query_text = optional_string(request, "query")?
        .ok_or_else(|| payload_error("Missing 'query' field"))?;
    if query_text.trim().is_empty() {
        return Err(payload_error("Field 'query' is empty"));
    }

    Ok(Query {
        query_text,
        output_format: optional_string(request, "outputFormat")?.unwrap_or_default(),
        input_format: optional_string(request, "inputFormat")?.unwrap_or_default(),
        input_structure: optional_string(request, "structure")?.unwrap_or_default(),
        input_data: optional_string(request, "data")?
            .unwrap_or_default()
            .into_bytes(),
    })
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(payload_error(format!("Field '{key}' must be a string"))),
    }
}

pub fn encode_result(result: &QueryResult, context: RequestContext) -> Value {
    match context {
        RequestContext::RestGateway => json!({ "body": result }),
        RequestContext::Direct | RequestContext::HttpGateway => json!(result),
    }
}

pub fn encode_result_bytes(result: &QueryResult, context: RequestContext) -> Vec<u8> {
    encode_result(result, context).to_string().into_bytes()
}

/// Reads an encoded response back into a [`QueryResult`], unwrapping `body` if present.
pub fn decode_response(response: &Value) -> Result<QueryResult> {
    let object = match response.get("body") {
        Some(body) => body,
        None => response,
    };
    if let Some(error) = object.get("error").and_then(Value::as_str) {
        return Ok(QueryResult::error(error));
    }
    QueryResult::deserialize(object)
        .map_err(|_| payload_error("response carries neither result nor error"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(query: Value) -> Value {
        json!({ "clickHouse": query })
    }

    #[test]
    fn decodes_a_direct_invocation() {
        let event = direct(json!({
            "query": "SELECT a+b FROM table",
            "inputFormat": "CSV",
            "structure": "a Int64, b Int64",
            "data": "1,2\n3,4"
        }));
        let (context, query) = decode_event(event);
        let query = query.unwrap();
        assert_eq!(context, RequestContext::Direct);
        assert_eq!(query.query_text, "SELECT a+b FROM table");
        assert_eq!(query.input_format, "CSV");
        assert_eq!(query.input_structure, "a Int64, b Int64");
        assert_eq!(query.input_data, b"1,2\n3,4".to_vec());
        assert!(query.output_format.is_empty());
    }

    #[test]
    fn decodes_a_rest_gateway_body() {
        let event = json!({
            "httpMethod": "POST",
            "body": "{\"clickHouse\":{\"query\":\"SELECT 1\"}}"
        });
        let (context, query) = decode_event(event);
        assert_eq!(context, RequestContext::RestGateway);
        assert_eq!(query.unwrap().query_text, "SELECT 1");
    }

    #[test]
    fn decodes_base64_only_for_the_string_true() {
        let body = base64::engine::general_purpose::STANDARD
            .encode("{\"clickHouse\":{\"query\":\"SELECT 1\"}}");

        let encoded = json!({ "requestContext": {}, "body": body, "isBase64Encoded": "true" });
        let (context, query) = decode_event(encoded);
        assert_eq!(context, RequestContext::HttpGateway);
        assert_eq!(query.unwrap().query_text, "SELECT 1");

        let flagged_bool = json!({ "requestContext": {}, "body": body, "isBase64Encoded": true });
        let (_, query) = decode_event(flagged_bool);
        assert!(query.is_err());
    }

    #[test]
    fn rejects_a_missing_query() {
        let (_, query) = decode_event(direct(json!({ "outputFormat": "CSV" })));
        assert_eq!(
            query.unwrap_err().to_string(),
            "Failed to parse lambda input JSON: Missing 'query' field"
        );
    }

    #[test]
    fn rejects_non_object_payloads() {
        let (context, query) = decode_request(b"\"not json\"");
        assert_eq!(context, RequestContext::Direct);
        assert!(query
            .unwrap_err()
            .to_string()
            .starts_with("Failed to parse lambda input JSON: "));

        let (_, query) = decode_request(b"not json");
        assert!(query.is_err());
    }

    #[test]
    fn reports_rest_context_when_the_body_is_broken() {
        let (context, query) = decode_event(json!({ "httpMethod": "POST", "body": "{" }));
        assert_eq!(context, RequestContext::RestGateway);
        assert!(query.is_err());
    }

    #[test]
    fn wraps_only_rest_gateway_responses() {
        let result = QueryResult::success("TSV", "1\n");
        assert_eq!(
            encode_result(&result, RequestContext::Direct),
            json!({ "format": "TSV", "data": "1\n" })
        );
        assert_eq!(
            encode_result(&result, RequestContext::HttpGateway),
            json!({ "format": "TSV", "data": "1\n" })
        );
        assert_eq!(
            encode_result(&result, RequestContext::RestGateway),
            json!({ "body": { "format": "TSV", "data": "1\n" } })
        );
    }

    #[test]
    fn encodes_errors_without_data() {
        let encoded = encode_result(&QueryResult::error("boom"), RequestContext::Direct);
        assert_eq!(encoded, json!({ "error": "boom" }));
    }

    #[test]
    fn rest_responses_decode_back_to_the_result() {
        for result in [QueryResult::success("CSV", "1,2\n"), QueryResult::error("nope")] {
            let bytes = encode_result_bytes(&result, RequestContext::RestGateway);
            let value: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(decode_response(&value).unwrap(), result);
        }
    }
}
