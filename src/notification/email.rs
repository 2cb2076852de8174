//! Booking confirmation email via the EmailJS REST API.
//!
//! Falls back to the `emailQueue` collection when EmailJS is not configured
//! or the send fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::queue::{OutboundQueue, EMAIL_QUEUE};
use super::{booking_field, ChannelError, DeliveryOutcome, NotificationChannel, NotificationEvent};
use crate::record::Record;
use crate::store::Document;

pub const EMAILJS_API_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailJsConfig {
    pub service_id: Option<String>,
    pub template_id: Option<String>,
    pub public_key: Option<String>,
    pub endpoint: String,
}

impl Default for EmailJsConfig {
    fn default() -> Self {
        Self {
            service_id: None,
            template_id: None,
            public_key: None,
            endpoint: EMAILJS_API_URL.to_string(),
        }
    }
}

impl EmailJsConfig {
    /// Service, template and public key, when all three are set.
    fn credentials(&self) -> Option<(&str, &str, &str)> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|s| !s.trim().is_empty())
        }
        Some((
            present(&self.service_id)?,
            present(&self.template_id)?,
            present(&self.public_key)?,
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

/// Template parameters for one recipient.
pub fn template_params(record: &Record, to_email: &str) -> serde_json::Value {
    let name = booking_field(record, &["name", "firstName"]);
    json!({
        "to_email": to_email,
        "customer_name": if name.is_empty() { "Customer".to_string() } else { name },
        "customer_email": booking_field(record, &["email"]),
        "customer_phone": booking_field(record, &["phone"]),
        "service": booking_field(record, &["service", "serviceName"]),
        "appointment_date": booking_field(record, &["appointmentDate", "date"]),
        "appointment_time": booking_field(record, &["appointmentTime", "time"]),
        "notes": booking_field(record, &["notes"]),
    })
}

pub struct EmailChannel {
    client: reqwest::Client,
    config: EmailJsConfig,
    queue: OutboundQueue,
}

impl EmailChannel {
    pub fn new(config: EmailJsConfig, queue: OutboundQueue) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            queue,
        }
    }

    async fn send(&self, record: &Record, recipients: &[String]) -> Result<(), ChannelError> {
        let (service_id, template_id, public_key) = self
            .config
            .credentials()
            .ok_or_else(|| ChannelError::Transport("EmailJS not configured".to_string()))?;

        for to_email in recipients {
            let body = json!({
                "service_id": service_id,
                "template_id": template_id,
                "user_id": public_key,
                "template_params": template_params(record, to_email),
            });
            let resp = self
                .client
                .post(&self.config.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| ChannelError::Transport(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(ChannelError::Rejected { status, body });
            }
        }
        Ok(())
    }

    async fn queue(&self, record: &Record, recipients: &[String]) -> DeliveryOutcome {
        let mut body = Document::new();
        body.insert(
            "data".to_string(),
            json!({
                "email": booking_field(record, &["email"]),
                "phone": booking_field(record, &["phone"]),
                "service": booking_field(record, &["service", "serviceName"]),
                "date": booking_field(record, &["appointmentDate", "date"]),
                "time": booking_field(record, &["appointmentTime", "time"]),
                "name": booking_field(record, &["name", "firstName"]),
            }),
        );
        match self
            .queue
            .enqueue(EMAIL_QUEUE, "booking_confirmation", recipients, body)
            .await
        {
            Ok(_) => DeliveryOutcome::Queued,
            Err(e) => {
                log::warn!("Failed to queue email for {}: {}", record.id, e);
                DeliveryOutcome::Dropped
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn is_primary(&self) -> bool {
        true
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<DeliveryOutcome, ChannelError> {
        let record = event.record();
        let recipients: Vec<String> = record
            .get_str("email")
            .filter(|e| !e.trim().is_empty())
            .map(|e| vec![e.to_string()])
            .unwrap_or_default();
        if recipients.is_empty() {
            return Ok(DeliveryOutcome::Skipped);
        }

        if !self.config.is_configured() {
            log::debug!("EmailJS not configured, queueing email for {}", record.id);
            return Ok(self.queue(record, &recipients).await);
        }

        match self.send(record, &recipients).await {
            Ok(()) => Ok(DeliveryOutcome::Sent),
            Err(e) => {
                log::warn!("EmailJS send failed for {}, queueing: {}", record.id, e);
                Ok(self.queue(record, &recipients).await)
            }
        }
    }
}
