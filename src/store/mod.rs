//! Remote document store seam.
//!
//! The hosted database is consumed through `RemoteStore`: collection-scoped
//! CRUD, equality queries, single-field ordering and a limit. Documents are
//! plain JSON objects keyed by a store-side identifier.

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{Map, Value};

pub use memory::MemoryStore;

/// A stored document body.
pub type Document = Map<String, Value>;

/// Errors returned by a `RemoteStore` implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Network or provider failure, including exhausted quota.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// Target document does not exist.
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Security rules refused the caller.
    #[error("remote store denied access: {0}")]
    PermissionDenied(String),

    /// The store refused the payload as malformed.
    #[error("remote store rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }
}

/// Equality filters, one ordering, optional limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

/// Ordering used when sorting documents by a field value.
///
/// Numbers compare numerically. Strings that both parse as RFC 3339 compare
/// as instants, since serialized fractional seconds vary in width; other
/// strings compare lexically. Missing values sort first.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(tx), Ok(ty)) => tx.cmp(&ty),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Collection-scoped document store.
///
/// Implementations must be `Send + Sync + 'static` so a single store can be
/// shared by every repository and the outbound queue.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Query a collection. Returns `(id, document)` pairs.
    async fn list(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<(String, Document)>, RemoteError>;

    /// Read one document. `Ok(None)` when absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError>;

    /// Create or overwrite the document at `id`.
    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), RemoteError>;

    /// Create a document under a store-generated id.
    async fn add(&self, collection: &str, doc: Document) -> Result<String, RemoteError>;

    /// Merge `fields` into an existing document.
    ///
    /// Returns `Err(RemoteError::NotFound)` if the document does not exist.
    async fn merge(&self, collection: &str, id: &str, fields: Document)
        -> Result<(), RemoteError>;

    /// Delete a document.
    ///
    /// Returns `Err(RemoteError::NotFound)` if the document does not exist.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;
}
