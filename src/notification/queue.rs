//! Outbound queue documents.
//!
//! Messages that could not be sent directly are written to a remote
//! collection and picked up later by whatever processes the queue.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::store::{Document, RemoteError, RemoteStore};

pub const EMAIL_QUEUE: &str = "emailQueue";
pub const SMS_QUEUE: &str = "smsQueue";

#[derive(Clone)]
pub struct OutboundQueue {
    store: Arc<dyn RemoteStore>,
}

impl OutboundQueue {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Append a pending queue document. `body` is merged into the document
    /// next to the fixed envelope fields. Returns the store-generated id.
    pub async fn enqueue(
        &self,
        collection: &str,
        kind: &str,
        recipients: &[String],
        body: Document,
    ) -> Result<String, RemoteError> {
        let mut doc = body;
        doc.insert("type".to_string(), Value::String(kind.to_string()));
        doc.insert("recipients".to_string(), json!(recipients));
        doc.insert("status".to_string(), Value::String("pending".to_string()));
        doc.insert(
            "createdAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let id = self.store.add(collection, doc).await?;
        log::debug!("Queued {} in {} as {}", kind, collection, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_enqueue_writes_envelope() {
        let store = Arc::new(MemoryStore::new());
        let queue = OutboundQueue::new(store.clone());

        let mut body = Document::new();
        body.insert("message".to_string(), json!("hello"));
        queue
            .enqueue(SMS_QUEUE, "booking_confirmation", &["4165550100".to_string()], body)
            .await
            .expect("enqueue");

        let docs = store.documents(SMS_QUEUE);
        assert_eq!(docs.len(), 1);
        let doc = &docs[0].1;
        assert_eq!(doc.get("type"), Some(&json!("booking_confirmation")));
        assert_eq!(doc.get("recipients"), Some(&json!(["4165550100"])));
        assert_eq!(doc.get("status"), Some(&json!("pending")));
        assert_eq!(doc.get("message"), Some(&json!("hello")));
        assert!(doc.get("createdAt").is_some());
    }

    #[tokio::test]
    async fn test_enqueue_offline_fails() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let queue = OutboundQueue::new(store.clone());
        let result = queue
            .enqueue(EMAIL_QUEUE, "booking_confirmation", &[], Document::new())
            .await;
        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
        assert_eq!(store.count(EMAIL_QUEUE), 0);
    }
}
