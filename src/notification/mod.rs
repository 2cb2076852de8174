//! Booking notification fan-out.
//!
//! A `Dispatcher` sends one event to every registered channel at once and
//! waits for all of them. Channel failures, including panics, are logged and
//! recorded in the report but never returned to the caller: a booking that
//! was saved stays saved no matter what happens here.

pub mod email;
pub mod queue;
pub mod sms;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::record::Record;
use crate::store::RemoteError;

pub use email::{EmailChannel, EmailJsConfig};
pub use queue::OutboundQueue;
pub use sms::SmsChannel;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    BookingCreated(Record),
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::BookingCreated(_) => "booking_confirmation",
        }
    }

    pub fn record(&self) -> &Record {
        match self {
            NotificationEvent::BookingCreated(record) => record,
        }
    }
}

/// What a channel did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    /// Delivered directly to the recipient.
    Sent,
    /// Written to an outbound queue for later processing.
    Queued,
    /// Nothing to deliver (for example, no phone number).
    Skipped,
    /// Neither sent nor queued. Already logged by the channel.
    Dropped,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("queue write failed: {0}")]
    Queue(#[from] RemoteError),
}

#[async_trait]
pub trait NotificationChannel: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// The primary channel is the one whose completion the report flags.
    fn is_primary(&self) -> bool {
        false
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<DeliveryOutcome, ChannelError>;
}

/// Per-channel result inside a `DispatchReport`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "result")]
pub enum ChannelResult {
    Delivered { outcome: DeliveryOutcome },
    Failed { error: String },
    Panicked,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelReport {
    pub channel: &'static str,
    pub primary: bool,
    pub result: ChannelResult,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub channels: Vec<ChannelReport>,
    /// True when a primary channel sent or queued the event.
    pub primary_delivered: bool,
}

impl DispatchReport {
    pub fn result_for(&self, channel: &str) -> Option<&ChannelResult> {
        self.channels
            .iter()
            .find(|c| c.channel == channel)
            .map(|c| &c.result)
    }

    pub fn failures(&self) -> usize {
        self.channels
            .iter()
            .filter(|c| !matches!(c.result, ChannelResult::Delivered { .. }))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct Dispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver `event` on every channel concurrently. Always returns a report.
    pub async fn dispatch(&self, event: NotificationEvent) -> DispatchReport {
        let event = Arc::new(event);
        let mut tasks = JoinSet::new();

        for channel in &self.channels {
            let channel = channel.clone();
            let event = event.clone();
            tasks.spawn(async move {
                let name = channel.name();
                let primary = channel.is_primary();
                // Inner task so a panicking channel still yields its name.
                let delivery = tokio::spawn(async move { channel.deliver(&event).await }).await;
                let result = match delivery {
                    Ok(Ok(outcome)) => ChannelResult::Delivered { outcome },
                    Ok(Err(e)) => {
                        log::warn!("Notification channel {} failed: {}", name, e);
                        ChannelResult::Failed {
                            error: e.to_string(),
                        }
                    }
                    Err(e) => {
                        log::error!("Notification channel {} panicked: {}", name, e);
                        ChannelResult::Panicked
                    }
                };
                ChannelReport {
                    channel: name,
                    primary,
                    result,
                }
            });
        }

        let mut report = DispatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(channel_report) => report.channels.push(channel_report),
                Err(e) => log::error!("Notification task failed to join: {}", e),
            }
        }

        report.primary_delivered = report.channels.iter().any(|c| {
            c.primary
                && matches!(
                    c.result,
                    ChannelResult::Delivered {
                        outcome: DeliveryOutcome::Sent | DeliveryOutcome::Queued
                    }
                )
        });
        log::info!(
            "Dispatched {} for {} on {} channels ({} failed)",
            event.kind(),
            event.record().id,
            report.channels.len(),
            report.failures()
        );
        report
    }
}

/// Text field of a booking with fallbacks, empty when none is present.
pub(crate) fn booking_field(record: &Record, fields: &[&str]) -> String {
    fields
        .iter()
        .find_map(|f| record.get_str(f).filter(|s| !s.trim().is_empty()))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        primary: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for Counting {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_primary(&self) -> bool {
            self.primary
        }
        async fn deliver(&self, _: &NotificationEvent) -> Result<DeliveryOutcome, ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryOutcome::Sent)
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationChannel for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn deliver(&self, _: &NotificationEvent) -> Result<DeliveryOutcome, ChannelError> {
            Err(ChannelError::Transport("connection reset".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl NotificationChannel for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }
        async fn deliver(&self, _: &NotificationEvent) -> Result<DeliveryOutcome, ChannelError> {
            panic!("channel blew up");
        }
    }

    fn booking() -> NotificationEvent {
        let mut record = Record::new("pending").with("service", "Gel Manicure");
        record.id = "apt_1".to_string();
        NotificationEvent::BookingCreated(record)
    }

    #[tokio::test]
    async fn test_partial_failure_still_delivers_primary() {
        let primary = Arc::new(Counting {
            name: "email",
            primary: true,
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new()
            .with_channel(primary.clone())
            .with_channel(Arc::new(Failing));

        let report = dispatcher.dispatch(booking()).await;

        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert!(report.primary_delivered);
        assert_eq!(report.channels.len(), 2);
        assert_eq!(
            report.result_for("email"),
            Some(&ChannelResult::Delivered {
                outcome: DeliveryOutcome::Sent
            })
        );
        assert!(matches!(
            report.result_for("failing"),
            Some(ChannelResult::Failed { .. })
        ));
        assert_eq!(report.failures(), 1);
    }

    #[tokio::test]
    async fn test_panicking_channel_is_contained() {
        let other = Arc::new(Counting {
            name: "sms",
            primary: false,
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new()
            .with_channel(Arc::new(Panicking))
            .with_channel(other.clone());

        let report = dispatcher.dispatch(booking()).await;

        assert_eq!(other.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.result_for("panicking"), Some(&ChannelResult::Panicked));
        assert!(!report.primary_delivered);
    }

    #[tokio::test]
    async fn test_no_channels() {
        let report = Dispatcher::new().dispatch(booking()).await;
        assert!(report.channels.is_empty());
        assert!(!report.primary_delivered);
    }

    #[test]
    fn test_booking_field_fallbacks() {
        let record = Record::new("pending")
            .with("name", "")
            .with("firstName", "Sau")
            .with("date", "2025-03-12");
        assert_eq!(booking_field(&record, &["name", "firstName"]), "Sau");
        assert_eq!(booking_field(&record, &["appointmentDate", "date"]), "2025-03-12");
        assert_eq!(booking_field(&record, &["phone"]), "");
    }
}
