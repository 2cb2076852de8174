//! In-process `RemoteStore`.
//!
//! Keeps collections in insertion order. `set_available(false)` makes every
//! call fail with `RemoteError::Unavailable`, which is how offline behavior
//! is exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{compare_values, Direction, Document, Query, RemoteError, RemoteStore};

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<(String, Document)>>>,
    offline: AtomicBool,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    /// Number of documents in a collection, regardless of availability.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Raw documents of a collection, regardless of availability.
    pub fn documents(&self, collection: &str) -> Vec<(String, Document)> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<(String, Document)>, RemoteError> {
        self.check_online()?;
        let mut docs: Vec<(String, Document)> = self
            .collections
            .lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| query.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order_by {
            docs.sort_by(|(_, a), (_, b)| {
                let ord = compare_values(a.get(&order.field), b.get(&order.field));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        self.check_online()?;
        Ok(self.collections.lock().get(collection).and_then(|docs| {
            docs.iter()
                .find(|(doc_id, _)| doc_id == id)
                .map(|(_, doc)| doc.clone())
        }))
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), RemoteError> {
        self.check_online()?;
        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|(doc_id, _)| doc_id == id) {
            Some((_, existing)) => *existing = doc,
            None => docs.push((id.to_string(), doc)),
        }
        Ok(())
    }

    async fn add(&self, collection: &str, doc: Document) -> Result<String, RemoteError> {
        self.check_online()?;
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), doc));
        Ok(id)
    }

    async fn merge(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<(), RemoteError> {
        self.check_online()?;
        let mut collections = self.collections.lock();
        let existing = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(doc_id, _)| doc_id == id))
            .map(|(_, doc)| doc)
            .ok_or_else(|| RemoteError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for (key, value) in fields {
            existing.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.check_online()?;
        let mut collections = self.collections.lock();
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| RemoteError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let before = docs.len();
        docs.retain(|(doc_id, _)| doc_id != id);
        if docs.len() == before {
            return Err(RemoteError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OrderBy;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn test_list_orders_filters_and_limits() {
        let store = MemoryStore::new();
        store
            .set("c", "a", doc(json!({"n": 1, "kind": "x"})))
            .await
            .expect("set");
        store
            .set("c", "b", doc(json!({"n": 3, "kind": "x"})))
            .await
            .expect("set");
        store
            .set("c", "c", doc(json!({"n": 2, "kind": "y"})))
            .await
            .expect("set");

        let query = Query::new()
            .where_eq("kind", "x")
            .order_by(OrderBy::desc("n"))
            .limit(5);
        let ids: Vec<String> = store
            .list("c", &query)
            .await
            .expect("list")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);

        let limited = store
            .list("c", &Query::new().order_by(OrderBy::asc("n")).limit(1))
            .await
            .expect("list");
        assert_eq!(limited[0].0, "a");
    }

    #[tokio::test]
    async fn test_merge_and_delete_missing_are_not_found() {
        let store = MemoryStore::new();
        let err = store
            .merge("c", "nope", Document::new())
            .await
            .expect_err("missing");
        assert!(matches!(err, RemoteError::NotFound { .. }));

        let err = store.delete("c", "nope").await.expect_err("missing");
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.list("c", &Query::new()).await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(store.add("c", Document::new()).await.is_err());
        assert_eq!(store.count("c"), 0);

        store.set_available(true);
        let id = store.add("c", Document::new()).await.expect("add");
        assert_eq!(id, "doc-1");
    }
}
