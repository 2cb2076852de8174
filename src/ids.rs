//! Record identifier generation.
//!
//! Format: `{prefix}_{unix_millis}_{seq}{rand8}`. The process-wide sequence
//! keeps ids distinct inside one millisecond; the UUID suffix keeps them
//! distinct across processes.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use uuid::Uuid;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub fn generate_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{:x}{}", prefix, millis, seq, &random[..8])
}
