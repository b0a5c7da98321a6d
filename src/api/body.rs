//! Request body extraction.
//!
//! Bodies arrive either as JSON objects or as URL-encoded forms. Both are
//! turned into a [`Document`] so field validation has a single input shape.
//! In a form, a key that appears once yields a string and a repeated key (or
//! one written as `key[]`) yields an array of strings.

use axum::{
    Form,
    body::Bytes,
    extract::{FromRequest, Request},
    http::header,
};
use serde_json::Value;

use super::error::ApiErrorResponse;
use crate::domain::Document;

/// A request body as a JSON document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(pub Document);

impl<S: Send + Sync> FromRequest<S> for Payload {
    type Rejection = ApiErrorResponse;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| {
                content_type.starts_with("application/x-www-form-urlencoded")
            });

        if is_form {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, state)
                .await
                .map_err(|_| ApiErrorResponse::bad_request("Invalid form body"))?;
            return Ok(Self(form_document(pairs)));
        }

        let bytes = Bytes::from_request(request, state)
            .await
            .map_err(|_| ApiErrorResponse::bad_request("Invalid request body"))?;
        json_document(&bytes).map(Self)
    }
}

/// Parses a JSON body. An empty body is an empty document.
fn json_document(bytes: &[u8]) -> Result<Document, ApiErrorResponse> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(ApiErrorResponse::bad_request(
            "Request body must be a JSON object",
        )),
        Err(_) => Err(ApiErrorResponse::bad_request("Invalid JSON body")),
    }
}

fn form_document(pairs: Vec<(String, String)>) -> Document {
    let mut document = Document::new();
    for (key, value) in pairs {
        let (key, forced_array) = match key.strip_suffix("[]") {
            Some(stripped) => (stripped.to_string(), true),
            None => (key, false),
        };
        let value = Value::String(value);
        match document.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                let value = if forced_array {
                    Value::Array(vec![value])
                } else {
                    value
                };
                document.insert(key, value);
            }
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;
    use rstest::rstest;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[rstest]
    #[case(&[("name", "Ada")], json!({"name": "Ada"}))]
    #[case(&[("pendingTasks", "t1")], json!({"pendingTasks": "t1"}))]
    #[case(&[("pendingTasks", "t1"), ("pendingTasks", "t2")], json!({"pendingTasks": ["t1", "t2"]}))]
    #[case(&[("pendingTasks[]", "t1")], json!({"pendingTasks": ["t1"]}))]
    #[case(&[("a", "1"), ("a", "2"), ("a", "3")], json!({"a": ["1", "2", "3"]}))]
    fn test_form_document(#[case] input: &[(&str, &str)], #[case] expected: Value) {
        assert_eq!(Value::Object(form_document(pairs(input))), expected);
    }

    #[rstest]
    #[case(b"".as_slice(), Some(json!({})))]
    #[case(b"  ".as_slice(), Some(json!({})))]
    #[case(br#"{"name": "Ada"}"#.as_slice(), Some(json!({"name": "Ada"})))]
    #[case(b"[1, 2]".as_slice(), None)]
    #[case(b"{name".as_slice(), None)]
    fn test_json_document(#[case] input: &[u8], #[case] expected: Option<Value>) {
        assert_eq!(json_document(input).ok().map(Value::Object), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn test_extracts_form_body() {
        let request = http::Request::builder()
            .method(http::Method::POST)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=Ada&email=ada%40example.com"))
            .unwrap();

        let Payload(document) = Payload::from_request(request, &()).await.unwrap();

        assert_eq!(
            Value::Object(document),
            json!({"name": "Ada", "email": "ada@example.com"})
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_rejects_invalid_json_body() {
        let request = http::Request::builder()
            .method(http::Method::POST)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{"))
            .unwrap();

        let rejection = Payload::from_request(request, &()).await.unwrap_err();

        assert_eq!(rejection.message, "Invalid JSON body");
    }
}
