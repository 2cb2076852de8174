//! Record model and per-kind collection metadata.
//!
//! A `Record` is a free-form field map with four fixed fields: id, creation
//! time, last-update time and lifecycle status. What differs between
//! appointments, customers, payments and messages lives on the `RecordKind`
//! marker types.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::store::{Document, OrderBy};

/// One persisted business entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub id: String,
    /// `None` when the stored document has no readable creation time.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    /// Stored text; null or non-string values read as `""` (counted unknown).
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// New record without an id; the repository assigns one on save.
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            created_at: Some(Utc::now()),
            updated_at: None,
            status: status.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of a field, `None` when missing, null or not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Numeric value of a field. Numeric strings ("45.00") are accepted.
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Lookup that also resolves the fixed fields by their stored names.
    pub fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.clone())),
            "createdAt" => self.created_at.map(|t| Value::String(t.to_rfc3339())),
            "updatedAt" => self.updated_at.map(|t| Value::String(t.to_rfc3339())),
            "status" => Some(Value::String(self.status.clone())),
            _ => self.fields.get(field).cloned(),
        }
    }

    /// Apply a partial update. `id` and `createdAt` are immutable and skipped.
    pub fn merge(&mut self, partial: &Map<String, Value>) {
        for (key, value) in partial {
            match key.as_str() {
                "id" | "createdAt" => {}
                "status" => {
                    if let Some(s) = value.as_str() {
                        self.status = s.to_string();
                    }
                }
                "updatedAt" => {
                    self.updated_at = timestamp_from_value(value);
                }
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Build a record from a stored document. The store's id wins over any
    /// `id` field inside the document body. Documents stamped with
    /// `timestamp` instead of `createdAt` (contact messages) use it as the
    /// creation time.
    pub fn from_document(id: &str, mut doc: Document) -> Result<Self, serde_json::Error> {
        doc.insert("id".to_string(), Value::String(id.to_string()));
        if !doc.contains_key("createdAt") {
            if let Some(ts) = doc.get("timestamp").cloned() {
                doc.insert("createdAt".to_string(), ts);
            }
        }
        serde_json::from_value(Value::Object(doc))
    }
}

/// Read a stored timestamp: RFC 3339 text, epoch millis, or a server
/// timestamp object (`{seconds, nanoseconds}` or `{_seconds, _nanoseconds}`).
pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, u32::try_from(nanos).unwrap_or(0)).single()
        }
        _ => None,
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(timestamp_from_value(&value))
}

fn lenient_status<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        _ => Ok(String::new()),
    }
}

/// Closed set of lifecycle states for one record kind.
pub trait LifecycleStatus: Copy + Eq + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }
}

/// Collection metadata for one kind of record.
pub trait RecordKind: Send + Sync + 'static {
    type Status: LifecycleStatus;

    /// Remote collection name.
    const COLLECTION: &'static str;
    /// Key of the serialized snapshot in the local mirror.
    const MIRROR_KEY: &'static str;
    const ID_PREFIX: &'static str;
    /// Fields that must be present and non-empty before a remote write.
    const REQUIRED_FIELDS: &'static [&'static str];

    fn natural_order() -> OrderBy {
        OrderBy::desc("createdAt")
    }
}

macro_rules! lifecycle {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl LifecycleStatus for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

lifecycle!(AppointmentStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
    Rescheduled => "rescheduled",
});

lifecycle!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

lifecycle!(CustomerStatus {
    Active => "active",
    Inactive => "inactive",
    Suspended => "suspended",
});

lifecycle!(MessageStatus {
    Unread => "unread",
    Read => "read",
    Archived => "archived",
});

pub struct Appointment;

impl RecordKind for Appointment {
    type Status = AppointmentStatus;
    const COLLECTION: &'static str = "appointments";
    const MIRROR_KEY: &'static str = "nailsbysau_appointments";
    const ID_PREFIX: &'static str = "apt";
    const REQUIRED_FIELDS: &'static [&'static str] =
        &["service", "appointmentDate", "appointmentTime", "email"];
}

pub struct Customer;

impl RecordKind for Customer {
    type Status = CustomerStatus;
    const COLLECTION: &'static str = "customers";
    const MIRROR_KEY: &'static str = "nailsbysau_customers";
    const ID_PREFIX: &'static str = "cust";
    const REQUIRED_FIELDS: &'static [&'static str] = &["email"];
}

pub struct Payment;

impl RecordKind for Payment {
    type Status = PaymentStatus;
    const COLLECTION: &'static str = "payments";
    const MIRROR_KEY: &'static str = "nailsbysau_payments";
    const ID_PREFIX: &'static str = "pay";
    const REQUIRED_FIELDS: &'static [&'static str] = &["amount", "method", "appointmentId"];
}

pub struct Message;

impl RecordKind for Message {
    type Status = MessageStatus;
    const COLLECTION: &'static str = "messages";
    const MIRROR_KEY: &'static str = "nailsbysau_messages";
    const ID_PREFIX: &'static str = "msg";
    const REQUIRED_FIELDS: &'static [&'static str] = &["email", "message"];
}

/// Names of required fields that are missing, null or blank.
pub fn missing_fields<K: RecordKind>(record: &Record) -> Vec<&'static str> {
    K::REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| match record.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect()
}
