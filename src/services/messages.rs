// Message service: contact form submissions and the admin inbox.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::auth::{authorize, Identity, Role};
use crate::error::SalonError;
use crate::record::{LifecycleStatus, Message, MessageStatus, Record};
use crate::repository::Repository;

/// Contact form fields. Phone and subject are optional on the form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
}

pub struct MessageService {
    repo: Arc<Repository<Message>>,
}

impl MessageService {
    pub fn new(repo: Arc<Repository<Message>>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<Repository<Message>> {
        &self.repo
    }

    /// Store a submission as unread and not yet replied to. Open to anyone.
    pub async fn submit(&self, submission: ContactSubmission) -> Result<Record, SalonError> {
        let mut record = Record::new(MessageStatus::Unread.as_str())
            .with("name", submission.name.trim())
            .with("email", submission.email.trim())
            .with("phone", submission.phone.trim())
            .with("subject", submission.subject.trim())
            .with("message", submission.message.trim())
            .with("readAt", Value::Null)
            .with("replied", false)
            .with("repliedAt", Value::Null);
        record.id = self.repo.save(record.clone()).await?;
        Ok(record)
    }

    /// Reload the inbox, newest first.
    pub async fn list(&self, session: Option<&Identity>) -> Result<Vec<Record>, SalonError> {
        authorize(session, Role::Admin)?;
        Ok(self.repo.load().await.records)
    }

    pub async fn get(&self, id: &str, session: Option<&Identity>) -> Result<Record, SalonError> {
        authorize(session, Role::Admin)?;
        self.repo.fetch(id).await
    }

    /// Unread messages after a reload.
    pub async fn unread_count(&self, session: Option<&Identity>) -> Result<usize, SalonError> {
        authorize(session, Role::Admin)?;
        self.repo.load().await;
        Ok(self
            .repo
            .find(|m| m.status == MessageStatus::Unread.as_str())
            .len())
    }

    pub async fn mark_read(&self, id: &str, session: Option<&Identity>) -> Result<(), SalonError> {
        authorize(session, Role::Admin)?;
        self.repo
            .update(
                id,
                fields(json!({
                    "status": MessageStatus::Read.as_str(),
                    "readAt": Utc::now().to_rfc3339(),
                })),
            )
            .await
    }

    /// Flag a message as answered. The read status is left alone.
    pub async fn mark_replied(&self, id: &str, session: Option<&Identity>) -> Result<(), SalonError> {
        authorize(session, Role::Admin)?;
        self.repo
            .update(
                id,
                fields(json!({
                    "replied": true,
                    "repliedAt": Utc::now().to_rfc3339(),
                })),
            )
            .await
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: MessageStatus,
        session: Option<&Identity>,
    ) -> Result<(), SalonError> {
        authorize(session, Role::Admin)?;
        self.repo
            .update(id, fields(json!({ "status": status.as_str() })))
            .await
    }

    pub async fn delete(&self, id: &str, session: Option<&Identity>) -> Result<(), SalonError> {
        authorize(session, Role::Admin)?;
        self.repo.remove(id).await
    }
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryMirror;
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, MessageService) {
        let store = Arc::new(MemoryStore::new());
        let repo = Arc::new(Repository::<Message>::new(
            store.clone(),
            Arc::new(MemoryMirror::new()),
        ));
        (store, MessageService::new(repo))
    }

    fn admin() -> Identity {
        Identity {
            uid: "a1".into(),
            email: "owner@salon.com".into(),
            roles: vec![Role::Admin],
        }
    }

    fn submission(subject: &str) -> ContactSubmission {
        ContactSubmission {
            name: "Mai".into(),
            email: "mai@example.com".into(),
            phone: "416-555-0100".into(),
            subject: subject.into(),
            message: "Do you do pedicures?".into(),
        }
    }

    #[tokio::test]
    async fn test_submit_stores_contact_fields() {
        let (store, service) = service();
        let message = service.submit(submission("Pedicures")).await.expect("submit");

        assert!(message.id.starts_with("msg_"));
        assert_eq!(message.status, "unread");
        let (_, doc) = store.documents("messages").pop().expect("stored");
        assert_eq!(doc.get("phone"), Some(&json!("416-555-0100")));
        assert_eq!(doc.get("subject"), Some(&json!("Pedicures")));
        assert_eq!(doc.get("replied"), Some(&json!(false)));
        assert_eq!(doc.get("readAt"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_inbox_is_admin_only() {
        let (_store, service) = service();
        let message = service.submit(submission("Hours")).await.expect("submit");

        let customer = Identity {
            uid: "u1".into(),
            email: "mai@example.com".into(),
            roles: vec![Role::Customer],
        };
        assert!(service.list(None).await.is_err());
        assert!(service.unread_count(Some(&customer)).await.is_err());
        assert!(service.mark_read(&message.id, Some(&customer)).await.is_err());
        assert!(service.delete(&message.id, None).await.is_err());
        assert_eq!(service.repository().len(), 1);
    }

    #[tokio::test]
    async fn test_read_and_reply_tracking() {
        let (_store, service) = service();
        let admin = admin();
        let first = service.submit(submission("Hours")).await.expect("submit");
        service.submit(submission("Gift cards")).await.expect("submit");
        assert_eq!(service.unread_count(Some(&admin)).await.expect("count"), 2);

        service.mark_read(&first.id, Some(&admin)).await.expect("read");
        assert_eq!(service.unread_count(Some(&admin)).await.expect("count"), 1);

        service.mark_replied(&first.id, Some(&admin)).await.expect("replied");
        let fetched = service.get(&first.id, Some(&admin)).await.expect("get");
        assert_eq!(fetched.status, "read");
        assert!(fetched.get_str("readAt").is_some());
        assert_eq!(fetched.get("replied"), Some(&json!(true)));
        assert!(fetched.get_str("repliedAt").is_some());

        service
            .set_status(&first.id, MessageStatus::Archived, Some(&admin))
            .await
            .expect("archive");
        assert_eq!(service.repository().get(&first.id).expect("cached").status, "archived");
    }

    #[tokio::test]
    async fn test_delete_and_missing_message() {
        let (store, service) = service();
        let admin = admin();
        let message = service.submit(submission("Hours")).await.expect("submit");

        service.delete(&message.id, Some(&admin)).await.expect("delete");
        assert_eq!(store.count("messages"), 0);
        assert!(service.list(Some(&admin)).await.expect("list").is_empty());

        let err = service.get(&message.id, Some(&admin)).await.expect_err("gone");
        assert!(matches!(err, SalonError::NotFound { .. }));
    }
}
