//! `PostgreSQL` document store.
//!
//! Each collection is a table of JSONB documents. Filters, sort orders and
//! paging are translated into SQL; projections are applied after the rows are
//! fetched.
//!
//! # Table Schema
//!
//! ```sql
//! CREATE TABLE tasks (
//!     seq BIGSERIAL,
//!     id TEXT PRIMARY KEY,
//!     data JSONB NOT NULL
//! );
//!
//! CREATE TABLE users (
//!     seq BIGSERIAL,
//!     id TEXT PRIMARY KEY,
//!     data JSONB NOT NULL
//! );
//! CREATE UNIQUE INDEX users_email_key ON users ((data ->> 'email'));
//! ```
//!
//! `seq` records insertion order, which is the order of unsorted results and
//! the tie-breaker of sorted ones.

use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, PgPoolOptions, Postgres};
use sqlx::query::QueryAs;

use super::query::{Condition, Filter, FindQuery, Projection, SortDirection, SortSpec};
use super::store::{
    Collection, DocumentEdit, DocumentStore, StoreError, StoreFuture, stamp_new_document,
};
use crate::domain::{Document, ID_FIELD};

// =============================================================================
// SQL Translation
// =============================================================================

/// A value bound to a numbered SQL parameter.
#[derive(Debug, Clone, PartialEq)]
enum SqlBind {
    /// A field path, used with the `#>` operator.
    Path(Vec<String>),
    Json(Value),
    Integer(i64),
}

/// Accumulates SQL fragments and the parameters they reference.
#[derive(Debug, Default)]
struct SqlBuilder {
    binds: Vec<SqlBind>,
}

impl SqlBuilder {
    /// Adds a parameter and returns its placeholder.
    fn push(&mut self, bind: SqlBind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    fn field(&mut self, segments: &[String]) -> String {
        let path = self.push(SqlBind::Path(segments.to_vec()));
        format!("(data #> {path}::text[])")
    }

    /// Translates a filter into a boolean SQL expression that is never NULL.
    fn filter(&mut self, filter: &Filter) -> String {
        match filter {
            Filter::All => "TRUE".to_string(),
            Filter::And(filters) => self.join(filters, " AND ", "TRUE"),
            Filter::Or(filters) => self.join(filters, " OR ", "FALSE"),
            Filter::Nor(filters) => format!("NOT {}", self.join(filters, " OR ", "FALSE")),
            Filter::Field { path, condition } => {
                let field = self.field(path.segments());
                self.condition(&field, condition)
            }
        }
    }

    fn join(&mut self, filters: &[Filter], separator: &str, empty: &str) -> String {
        if filters.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = filters.iter().map(|filter| self.filter(filter)).collect();
        format!("({})", parts.join(separator))
    }

    fn condition(&mut self, field: &str, condition: &Condition) -> String {
        match condition {
            Condition::Eq(value) => self.equals(field, value),
            Condition::Ne(value) => format!("NOT {}", self.equals(field, value)),
            Condition::Gt(bound) => self.compare(field, ">", bound),
            Condition::Gte(bound) => self.compare(field, ">=", bound),
            Condition::Lt(bound) => self.compare(field, "<", bound),
            Condition::Lte(bound) => self.compare(field, "<=", bound),
            Condition::In(values) => self.any_equals(field, values),
            Condition::Nin(values) => format!("NOT {}", self.any_equals(field, values)),
            Condition::Exists(true) => format!("({field} IS NOT NULL)"),
            Condition::Exists(false) => format!("({field} IS NULL)"),
        }
    }

    /// Whole-value or array-element equality; an absent field equals `null`.
    fn equals(&mut self, field: &str, value: &Value) -> String {
        if value.is_null() {
            return format!(
                "COALESCE(({field} IS NULL OR {field} = 'null'::jsonb \
                 OR (jsonb_typeof({field}) = 'array' AND {field} @> '[null]'::jsonb)), FALSE)"
            );
        }
        let operand = self.push(SqlBind::Json(value.clone()));
        format!(
            "COALESCE(({field} = {operand}::jsonb \
             OR (jsonb_typeof({field}) = 'array' AND {field} @> jsonb_build_array({operand}::jsonb))), FALSE)"
        )
    }

    fn any_equals(&mut self, field: &str, values: &[Value]) -> String {
        if values.is_empty() {
            return "FALSE".to_string();
        }
        let parts: Vec<String> = values.iter().map(|value| self.equals(field, value)).collect();
        format!("({})", parts.join(" OR "))
    }

    /// Orders scalars of the same JSON type; other pairs never match.
    fn compare(&mut self, field: &str, operator: &str, bound: &Value) -> String {
        if !matches!(bound, Value::Number(_) | Value::String(_) | Value::Bool(_)) {
            return "FALSE".to_string();
        }
        let operand = self.push(SqlBind::Json(bound.clone()));
        format!(
            "COALESCE((jsonb_typeof({field}) = jsonb_typeof({operand}::jsonb) \
             AND {field} {operator} {operand}::jsonb), FALSE)"
        )
    }

    fn order_by(&mut self, sort: &SortSpec) -> String {
        let mut keys: Vec<String> = sort
            .keys()
            .iter()
            .map(|(path, direction)| {
                let field = self.field(path.segments());
                match direction {
                    SortDirection::Ascending => format!("{field} ASC NULLS FIRST"),
                    SortDirection::Descending => format!("{field} DESC NULLS LAST"),
                }
            })
            .collect();
        keys.push("seq ASC".to_string());
        keys.join(", ")
    }

    fn find(mut self, collection: Collection, query: &FindQuery) -> (String, Vec<SqlBind>) {
        let condition = self.filter(&query.filter);
        let order = self.order_by(&query.sort);
        let mut sql = format!(
            "SELECT data FROM {collection} WHERE {condition} ORDER BY {order}"
        );
        if query.skip > 0 {
            let offset = self.push(SqlBind::Integer(to_sql_integer(query.skip)));
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        if let Some(limit) = query.limit {
            let limit = self.push(SqlBind::Integer(to_sql_integer(limit)));
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        (sql, self.binds)
    }

    fn count(mut self, collection: Collection, filter: &Filter) -> (String, Vec<SqlBind>) {
        let condition = self.filter(filter);
        (
            format!("SELECT COUNT(*) FROM {collection} WHERE {condition}"),
            self.binds,
        )
    }
}

fn to_sql_integer(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn bind_all<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    binds: Vec<SqlBind>,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for bind in binds {
        query = match bind {
            SqlBind::Path(path) => query.bind(path),
            SqlBind::Json(value) => query.bind(value),
            SqlBind::Integer(value) => query.bind(value),
        };
    }
    query
}

// =============================================================================
// Error and Row Conversion
// =============================================================================

/// Maps a driver error, recognizing unique index violations.
///
/// Unique indexes are named `{table}_{field}_key`; the primary key is
/// reported as a violation on `_id`.
fn store_error(collection: Collection, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.is_unique_violation()
    {
        let constraint = database_error.constraint().unwrap_or_default();
        let field = constraint
            .strip_prefix(&format!("{}_", collection.name()))
            .and_then(|rest| rest.strip_suffix("_key"))
            .map_or_else(|| ID_FIELD.to_string(), ToString::to_string);
        return StoreError::UniqueViolation { collection, field };
    }
    StoreError::DatabaseError(error.to_string())
}

fn into_document(data: Value) -> Result<Document, StoreError> {
    match data {
        Value::Object(document) => Ok(document),
        other => Err(StoreError::SerializationError(format!(
            "stored document is not an object: {other}"
        ))),
    }
}

// =============================================================================
// PostgreSQL Document Store
// =============================================================================

/// `PostgreSQL` implementation of `DocumentStore`.
///
/// # Example
///
/// ```ignore
/// use infrastructure::postgres::PostgresDocumentStore;
///
/// let store = PostgresDocumentStore::connect("postgres://localhost/tasks", 10).await?;
/// store.ensure_schema().await?;
/// let saved = store.insert_one(Collection::Users, document).await?;
/// ```
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DatabaseError` if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|error| StoreError::DatabaseError(error.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the collection tables and unique indexes if they are missing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DatabaseError` if a statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            let table = collection.name();
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 seq BIGSERIAL, id TEXT PRIMARY KEY, data JSONB NOT NULL)"
            ))
            .execute(&self.pool)
            .await
            .map_err(|error| store_error(collection, error))?;

            for field in collection.unique_fields() {
                sqlx::query(&format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {table}_{field}_key \
                     ON {table} ((data ->> '{field}'))"
                ))
                .execute(&self.pool)
                .await
                .map_err(|error| store_error(collection, error))?;
            }
        }
        tracing::debug!("document store schema is ready");
        Ok(())
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn find(&self, collection: Collection, query: FindQuery) -> StoreFuture<Vec<Document>> {
        let pool = self.pool.clone();

        Box::pin(async move {
            let (sql, binds) = SqlBuilder::default().find(collection, &query);
            let rows = bind_all(sqlx::query_as::<_, (Value,)>(&sql), binds)
                .fetch_all(&pool)
                .await
                .map_err(|error| store_error(collection, error))?;

            rows.into_iter()
                .map(|(data,)| into_document(data).map(|document| query.projection.apply(document)))
                .collect::<Result<Vec<_>, _>>()
        })
    }

    fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
        projection: Projection,
    ) -> StoreFuture<Option<Document>> {
        let pool = self.pool.clone();
        let id = id.to_string();

        Box::pin(async move {
            let row: Option<(Value,)> =
                sqlx::query_as(&format!("SELECT data FROM {collection} WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&pool)
                    .await
                    .map_err(|error| store_error(collection, error))?;

            row.map(|(data,)| into_document(data).map(|document| projection.apply(document)))
                .transpose()
        })
    }

    fn count(&self, collection: Collection, filter: Filter) -> StoreFuture<u64> {
        let pool = self.pool.clone();

        Box::pin(async move {
            let (sql, binds) = SqlBuilder::default().count(collection, &filter);
            let (count,) = bind_all(sqlx::query_as::<_, (i64,)>(&sql), binds)
                .fetch_one(&pool)
                .await
                .map_err(|error| store_error(collection, error))?;

            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    fn insert_one(&self, collection: Collection, document: Document) -> StoreFuture<Document> {
        let pool = self.pool.clone();

        Box::pin(async move {
            let mut document = document;
            let id = stamp_new_document(&mut document);

            let (data,): (Value,) = sqlx::query_as(&format!(
                "INSERT INTO {collection} (id, data) VALUES ($1, $2) RETURNING data"
            ))
            .bind(id)
            .bind(Value::Object(document))
            .fetch_one(&pool)
            .await
            .map_err(|error| store_error(collection, error))?;

            into_document(data)
        })
    }

    fn replace_one(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StoreFuture<Option<Document>> {
        let pool = self.pool.clone();
        let id = id.to_string();

        Box::pin(async move {
            let mut document = document;
            document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

            let row: Option<(Value,)> = sqlx::query_as(&format!(
                "UPDATE {collection} SET data = $2 WHERE id = $1 RETURNING data"
            ))
            .bind(id)
            .bind(Value::Object(document))
            .fetch_optional(&pool)
            .await
            .map_err(|error| store_error(collection, error))?;

            row.map(|(data,)| into_document(data)).transpose()
        })
    }

    fn update_one(
        &self,
        collection: Collection,
        id: &str,
        edit: DocumentEdit,
    ) -> StoreFuture<Option<bool>> {
        let pool = self.pool.clone();
        let id = id.to_string();

        Box::pin(async move {
            let mut transaction = pool
                .begin()
                .await
                .map_err(|error| store_error(collection, error))?;

            // Row lock held until commit or rollback on drop.
            let row: Option<(Value,)> = sqlx::query_as(&format!(
                "SELECT data FROM {collection} WHERE id = $1 FOR UPDATE"
            ))
            .bind(id.as_str())
            .fetch_optional(&mut *transaction)
            .await
            .map_err(|error| store_error(collection, error))?;

            let Some((data,)) = row else {
                return Ok(None);
            };
            let mut document = into_document(data)?;
            if !edit(&mut document)? {
                return Ok(Some(false));
            }
            document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

            sqlx::query(&format!("UPDATE {collection} SET data = $2 WHERE id = $1"))
                .bind(id.as_str())
                .bind(Value::Object(document))
                .execute(&mut *transaction)
                .await
                .map_err(|error| store_error(collection, error))?;
            transaction
                .commit()
                .await
                .map_err(|error| store_error(collection, error))?;

            Ok(Some(true))
        })
    }

    fn update_many(
        &self,
        collection: Collection,
        ids: Vec<String>,
        patch: Document,
    ) -> StoreFuture<u64> {
        let pool = self.pool.clone();

        Box::pin(async move {
            if ids.is_empty() {
                return Ok(0);
            }
            let result = sqlx::query(&format!(
                "UPDATE {collection} SET data = data || $1 WHERE id = ANY($2)"
            ))
            .bind(Value::Object(patch))
            .bind(ids)
            .execute(&pool)
            .await
            .map_err(|error| store_error(collection, error))?;

            Ok(result.rows_affected())
        })
    }

    fn delete_one(&self, collection: Collection, id: &str) -> StoreFuture<Option<Document>> {
        let pool = self.pool.clone();
        let id = id.to_string();

        Box::pin(async move {
            let row: Option<(Value,)> = sqlx::query_as(&format!(
                "DELETE FROM {collection} WHERE id = $1 RETURNING data"
            ))
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(|error| store_error(collection, error))?;

            row.map(|(data,)| into_document(data)).transpose()
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
