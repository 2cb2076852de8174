// Customer service: profiles, search and per-customer history.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::auth::{authorize, AuthError, Identity, Role};
use crate::error::SalonError;
use crate::record::{Customer, CustomerStatus, LifecycleStatus, Record};
use crate::repository::Repository;
use crate::stats::{count_by_status, count_by_time_bucket, TimeBucket};

/// Optional details collected at registration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerProfile {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
    pub date_of_birth: String,
    pub allergies: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub new_this_month: usize,
}

pub struct CustomerService {
    repo: Arc<Repository<Customer>>,
}

impl CustomerService {
    pub fn new(repo: Arc<Repository<Customer>>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<Repository<Customer>> {
        &self.repo
    }

    /// Create an active customer keyed by the auth uid, with empty history.
    pub async fn create_profile(
        &self,
        uid: &str,
        email: &str,
        profile: CustomerProfile,
    ) -> Result<Record, SalonError> {
        let mut record = Record::new(CustomerStatus::Active.as_str())
            .with("email", email.trim())
            .with("firstName", profile.first_name)
            .with("lastName", profile.last_name)
            .with("phone", profile.phone)
            .with("address", profile.address)
            .with("dateOfBirth", profile.date_of_birth)
            .with(
                "preferences",
                json!({
                    "preferredServices": [],
                    "allergies": profile.allergies,
                    "notes": profile.notes,
                }),
            )
            .with("totalAppointments", 0)
            .with("totalSpent", 0.0)
            .with("loyaltyPoints", 0);
        record.id = uid.to_string();

        let id = self.repo.save(record.clone()).await?;
        record.id = id;
        Ok(record)
    }

    /// Partial update by the customer themself or an admin.
    pub async fn update_profile(
        &self,
        id: &str,
        fields: Map<String, Value>,
        session: Option<&Identity>,
    ) -> Result<(), SalonError> {
        let identity = session.ok_or(AuthError::NotSignedIn)?;
        if identity.uid != id {
            authorize(Some(identity), Role::Admin)?;
        }
        let mut fields = fields;
        // Lifecycle changes go through admins only.
        if !identity.is_admin() {
            fields.remove("status");
        }
        self.repo.update(id, fields).await
    }

    pub async fn delete(&self, id: &str, session: Option<&Identity>) -> Result<(), SalonError> {
        authorize(session, Role::Admin)?;
        self.repo.remove(id).await
    }

    /// Case-insensitive match on first name, last name or email, substring
    /// match on phone. An empty query returns every customer.
    pub fn search(&self, query: &str) -> Vec<Record> {
        let query = query.trim();
        if query.is_empty() {
            return self.repo.records();
        }
        let needle = query.to_lowercase();
        self.repo.find(|c| {
            ["firstName", "lastName", "email"].iter().any(|field| {
                c.get_str(field)
                    .map(|v| v.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            }) || c.get_str("phone").map(|p| p.contains(query)).unwrap_or(false)
        })
    }

    pub fn by_email(&self, email: &str) -> Option<Record> {
        self.repo
            .find(|c| {
                c.get_str("email")
                    .map(|e| e.eq_ignore_ascii_case(email.trim()))
                    .unwrap_or(false)
            })
            .into_iter()
            .next()
    }

    /// Appointments linked to the customer by id or by email.
    pub fn appointment_history(&self, id: &str, appointments: &[Record]) -> Vec<Record> {
        let email = self
            .repo
            .get(id)
            .and_then(|c| c.get_str("email").map(str::to_lowercase));
        appointments
            .iter()
            .filter(|apt| {
                apt.get_str("customerId") == Some(id)
                    || apt.get_str("customerUid") == Some(id)
                    || match (&email, apt.get_str("email")) {
                        (Some(mine), Some(theirs)) => mine == &theirs.to_lowercase(),
                        _ => false,
                    }
            })
            .cloned()
            .collect()
    }

    pub fn stats(&self, reference: DateTime<Utc>, tz: Tz) -> CustomerStats {
        let customers = self.repo.records();
        let new_this_month =
            count_by_time_bucket(&customers, "createdAt", &[TimeBucket::ThisMonth], reference, tz)
                .get(&TimeBucket::ThisMonth)
                .copied()
                .unwrap_or(0);
        CustomerStats {
            total: customers.len(),
            by_status: count_by_status::<CustomerStatus>(&customers),
            new_this_month,
        }
    }
}
