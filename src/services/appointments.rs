// Appointment service: booking, rescheduling, cancellation and lookups.
// Bookings notify best-effort in the background after the record is saved.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use crate::auth::{authorize, Identity, Role};
use crate::error::SalonError;
use crate::notification::{DispatchReport, Dispatcher, NotificationEvent};
use crate::record::{Appointment, AppointmentStatus, LifecycleStatus, Record};
use crate::repository::Repository;
use crate::stats::count_by_status;

/// One bookable service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOffering {
    pub slug: String,
    pub name: String,
    pub price: f64,
    pub duration_minutes: u32,
}

const CATALOG: &[(&str, &str, f64, u32)] = &[
    ("classic-manicure", "Classic Manicure", 35.0, 60),
    ("gel-manicure", "Gel Manicure", 45.0, 75),
    ("french-manicure", "French Manicure", 40.0, 70),
    ("nail-art", "Nail Art Design", 50.0, 90),
    ("nail-extensions", "Nail Extensions", 80.0, 120),
    ("3d-nail-art", "3D Nail Art", 75.0, 120),
];

pub fn catalog() -> Vec<ServiceOffering> {
    CATALOG
        .iter()
        .map(|(slug, name, price, minutes)| ServiceOffering {
            slug: slug.to_string(),
            name: name.to_string(),
            price: *price,
            duration_minutes: *minutes,
        })
        .collect()
}

pub fn catalog_size() -> usize {
    CATALOG.len()
}

/// Catalog entry for `slug`. Unknown slugs book at price 0 for 60 minutes
/// under the slug itself.
pub fn resolve_service(slug: &str) -> ServiceOffering {
    catalog()
        .into_iter()
        .find(|s| s.slug == slug)
        .unwrap_or_else(|| ServiceOffering {
            slug: slug.to_string(),
            name: slug.to_string(),
            price: 0.0,
            duration_minutes: 60,
        })
}

/// Booking form input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingRequest {
    pub service: String,
    pub appointment_date: String,
    pub appointment_time: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub client_address: Option<String>,
}

#[derive(Debug)]
pub struct BookingOutcome {
    pub appointment: Record,
    /// Background dispatch of the confirmation. `None` when no dispatcher
    /// is configured. Dropping the handle does not cancel delivery.
    pub notifications: Option<JoinHandle<DispatchReport>>,
}

pub struct AppointmentService {
    repo: Arc<Repository<Appointment>>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl AppointmentService {
    pub fn new(repo: Arc<Repository<Appointment>>, dispatcher: Option<Arc<Dispatcher>>) -> Self {
        Self { repo, dispatcher }
    }

    pub fn repository(&self) -> &Arc<Repository<Appointment>> {
        &self.repo
    }

    /// Save a new pending appointment, then start notifying without waiting.
    ///
    /// A signed-in customer's uid and email are attached to the booking,
    /// overriding the email typed into the form.
    pub async fn book(
        &self,
        request: BookingRequest,
        session: Option<&Identity>,
    ) -> Result<BookingOutcome, SalonError> {
        let offering = resolve_service(&request.service);
        let mut record = Record::new(AppointmentStatus::Pending.as_str())
            .with("service", offering.name.as_str())
            .with("serviceSlug", offering.slug.as_str())
            .with("price", offering.price)
            .with("duration", offering.duration_minutes)
            .with("appointmentDate", request.appointment_date.trim())
            .with("appointmentTime", request.appointment_time.trim())
            .with("firstName", request.first_name.trim())
            .with("lastName", request.last_name.trim())
            .with("email", request.email.trim());
        for (field, value) in [
            ("phone", &request.phone),
            ("notes", &request.notes),
            ("clientAddress", &request.client_address),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                record.set(field, value.trim());
            }
        }
        if let Some(identity) = session {
            record.set("customerUid", identity.uid.as_str());
            record.set("email", identity.email.as_str());
        }

        let id = self.repo.save(record.clone()).await?;
        record.id = id;

        let notifications = self.dispatcher.clone().map(|dispatcher| {
            let event = NotificationEvent::BookingCreated(record.clone());
            tokio::spawn(async move { dispatcher.dispatch(event).await })
        });

        Ok(BookingOutcome {
            appointment: record,
            notifications,
        })
    }

    /// Move an appointment to a new slot. The id must be in the loaded snapshot.
    pub async fn reschedule(
        &self,
        id: &str,
        date: &str,
        time: &str,
        reason: &str,
    ) -> Result<(), SalonError> {
        if self.repo.get(id).is_none() {
            return Err(SalonError::not_found(self.repo.kind(), id));
        }
        let partial = fields(json!({
            "appointmentDate": date,
            "appointmentTime": time,
            "rescheduleReason": reason,
            "rescheduledAt": Utc::now().to_rfc3339(),
            "status": AppointmentStatus::Rescheduled.as_str(),
        }));
        self.repo.update(id, partial).await?;
        log::info!("Rescheduled appointment {} to {} {}", id, date, time);
        Ok(())
    }

    pub async fn cancel(&self, id: &str) -> Result<(), SalonError> {
        let partial = fields(json!({ "status": AppointmentStatus::Cancelled.as_str() }));
        self.repo.update(id, partial).await
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: AppointmentStatus,
        session: Option<&Identity>,
    ) -> Result<(), SalonError> {
        authorize(session, Role::Admin)?;
        let partial = fields(json!({ "status": status.as_str() }));
        self.repo.update(id, partial).await
    }

    /// Reload, then return the appointments booked under `email`.
    pub async fn for_customer(&self, email: &str) -> Vec<Record> {
        self.repo.load().await;
        self.repo.find(|r| {
            r.get_str("email")
                .map(|e| e.eq_ignore_ascii_case(email.trim()))
                .unwrap_or(false)
        })
    }

    pub fn stats(&self) -> BTreeMap<String, usize> {
        count_by_status::<AppointmentStatus>(&self.repo.records())
    }
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
