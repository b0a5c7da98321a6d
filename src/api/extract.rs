//! Query-string and path extractors that reject with [`ApiErrorResponse`].
//!
//! A parameter repeated in the query string keeps its first value.

use axum::{
    extract::{FromRequestParts, Path, Query},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::error::ApiErrorResponse;

/// Query parameters deserialized into `T`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|_| ApiErrorResponse::bad_request("Invalid query string"))?;
        first_values(pairs).map(Self)
    }
}

fn first_values<T: DeserializeOwned>(pairs: Vec<(String, String)>) -> Result<T, ApiErrorResponse> {
    let mut values = Map::new();
    for (key, value) in pairs {
        values.entry(key).or_insert(Value::String(value));
    }
    serde_json::from_value(Value::Object(values))
        .map_err(|_| ApiErrorResponse::bad_request("Invalid query string"))
}

/// The `{id}` segment of a resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ResourceId {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiErrorResponse::bad_request("Invalid resource id"))?;
        Ok(Self(id))
    }
}
