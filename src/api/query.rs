//! Query-string parameters for list and read endpoints.
//!
//! `where`, `sort` and `select` carry JSON documents; `skip`, `limit` and
//! `count` are plain values. An empty parameter counts as absent.

use serde::Deserialize;
use serde_json::Value;

use super::error::{ApiErrorResponse, internal_failure};
use crate::infrastructure::query::{Filter, FindQuery, Projection, QueryError, SortSpec};
use crate::infrastructure::{Collection, DocumentStore};

/// Query parameters accepted by `GET /tasks` and `GET /users`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "where")]
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub select: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub count: Option<String>,
}

/// Query parameters accepted by `GET /tasks/{id}` and `GET /users/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectParams {
    pub select: Option<String>,
}

/// What a list request asks the store for.
#[derive(Debug, Clone, PartialEq)]
pub enum ListRequest {
    /// Count the matching documents.
    Count(Filter),
    /// Fetch the matching documents.
    Find(FindQuery),
}

impl ListParams {
    /// Parses the parameters.
    ///
    /// `default_limit` applies when `limit` is absent; `None` and an explicit
    /// `limit=0` mean unlimited. With `count=true`, `sort` and `select` are
    /// still validated but only the filter is used, and `skip` and `limit`
    /// are not read.
    ///
    /// # Errors
    ///
    /// Returns 400 if a JSON parameter is malformed or describes an invalid
    /// query, or if `skip` or `limit` is not a non-negative integer.
    pub fn into_request(self, default_limit: Option<usize>) -> Result<ListRequest, ApiErrorResponse> {
        let filter = parse_document("where", self.filter.as_deref(), Filter::parse)?
            .unwrap_or_default();
        let sort = parse_document("sort", self.sort.as_deref(), SortSpec::parse)?
            .unwrap_or_default();
        let projection = parse_projection(self.select.as_deref())?;

        if self.count.as_deref() == Some("true") {
            return Ok(ListRequest::Count(filter));
        }

        let skip = parse_integer("skip", self.skip.as_deref())?.unwrap_or(0);
        let limit = match parse_integer("limit", self.limit.as_deref())? {
            Some(0) => None,
            Some(limit) => Some(limit),
            None => default_limit,
        };

        Ok(ListRequest::Find(FindQuery {
            filter,
            sort,
            projection,
            skip,
            limit,
        }))
    }
}

impl SelectParams {
    /// Parses the projection.
    ///
    /// # Errors
    ///
    /// Returns 400 if `select` is malformed.
    pub fn projection(&self) -> Result<Projection, ApiErrorResponse> {
        parse_projection(self.select.as_deref())
    }
}

/// Runs a list request and returns the response payload: a count or an
/// array of documents.
///
/// # Errors
///
/// Returns 500 if the store fails.
pub async fn run_list(
    store: &dyn DocumentStore,
    collection: Collection,
    request: ListRequest,
) -> Result<Value, ApiErrorResponse> {
    let (count_failure, find_failure) = match collection {
        Collection::Tasks => ("Error counting tasks", "Error retrieving tasks"),
        Collection::Users => ("Error counting users", "Error retrieving users"),
    };

    match request {
        ListRequest::Count(filter) => store
            .count(collection, filter)
            .await
            .map(Value::from)
            .map_err(internal_failure(count_failure)),
        ListRequest::Find(query) => store
            .find(collection, query)
            .await
            .map(|documents| Value::Array(documents.into_iter().map(Value::Object).collect()))
            .map_err(internal_failure(find_failure)),
    }
}

fn parse_projection(raw: Option<&str>) -> Result<Projection, ApiErrorResponse> {
    Ok(parse_document("select", raw, Projection::parse)?.unwrap_or_default())
}

fn parse_document<T>(
    name: &'static str,
    raw: Option<&str>,
    parser: fn(&Value) -> Result<T, QueryError>,
) -> Result<Option<T>, ApiErrorResponse> {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).map_err(|_| {
        ApiErrorResponse::bad_request(format!("Invalid JSON in '{name}' parameter"))
    })?;
    parser(&value)
        .map(Some)
        .map_err(|error| ApiErrorResponse::bad_request(format!("Invalid '{name}' parameter: {error}")))
}

fn parse_integer(name: &'static str, raw: Option<&str>) -> Result<Option<usize>, ApiErrorResponse> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<usize>().map(Some).map_err(|_| {
        ApiErrorResponse::bad_request(format!("Invalid '{name}' parameter: expected a non-negative integer"))
    })
}
