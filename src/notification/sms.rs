//! Booking confirmation SMS. Always queued to `smsQueue`.

use async_trait::async_trait;
use serde_json::Value;

use super::queue::{OutboundQueue, SMS_QUEUE};
use super::{booking_field, ChannelError, DeliveryOutcome, NotificationChannel, NotificationEvent};
use crate::record::Record;
use crate::store::Document;

pub struct SmsChannel {
    business_name: String,
    queue: OutboundQueue,
}

impl SmsChannel {
    pub fn new(business_name: impl Into<String>, queue: OutboundQueue) -> Self {
        Self {
            business_name: business_name.into(),
            queue,
        }
    }

    pub fn message(&self, record: &Record) -> String {
        let service = booking_field(record, &["service", "serviceName"]);
        format!(
            "{}: Booking confirmed for {} on {} at {}. Reply if you need to reschedule.",
            self.business_name,
            if service.is_empty() { "Service" } else { service.as_str() },
            booking_field(record, &["appointmentDate", "date"]),
            booking_field(record, &["appointmentTime", "time"]),
        )
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn name(&self) -> &'static str {
        "sms"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<DeliveryOutcome, ChannelError> {
        let record = event.record();
        let phone = booking_field(record, &["phone"]);
        if phone.is_empty() {
            log::debug!("No phone on {}, skipping SMS", record.id);
            return Ok(DeliveryOutcome::Skipped);
        }

        let mut body = Document::new();
        body.insert("message".to_string(), Value::String(self.message(record)));
        match self
            .queue
            .enqueue(SMS_QUEUE, event.kind(), &[phone], body)
            .await
        {
            Ok(_) => Ok(DeliveryOutcome::Queued),
            Err(e) => {
                log::warn!("Failed to queue SMS for {}: {}", record.id, e);
                Ok(DeliveryOutcome::Dropped)
            }
        }
    }
}
