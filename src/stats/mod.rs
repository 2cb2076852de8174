//! Stats aggregation over record snapshots.
//!
//! Every function here is pure: same records, same reference instant, same
//! timezone, same output. Nothing reads the clock or touches a repository.

pub mod dashboard;
pub mod refresh;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;

use crate::record::{LifecycleStatus, Record};

pub use dashboard::DashboardStats;
pub use refresh::StatsRefresher;

/// Bucket key for records whose status is missing or outside the closed set.
pub const UNKNOWN_STATUS: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeBucket {
    Today,
    ThisWeek,
    ThisMonth,
}

impl TimeBucket {
    pub const ALL: [TimeBucket; 3] = [TimeBucket::Today, TimeBucket::ThisWeek, TimeBucket::ThisMonth];

    /// Whether `date` falls inside this bucket relative to `reference`.
    /// Weeks always start on Monday.
    pub fn contains(&self, date: NaiveDate, reference: NaiveDate) -> bool {
        match self {
            TimeBucket::Today => date == reference,
            TimeBucket::ThisWeek => {
                let start = week_start(reference);
                date >= start && date < start + Duration::days(7)
            }
            TimeBucket::ThisMonth => {
                date.year() == reference.year() && date.month() == reference.month()
            }
        }
    }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Count records per status of `S`, with an explicit `"unknown"` bucket.
/// Every status of the closed set gets a key, even at zero.
pub fn count_by_status<S: LifecycleStatus>(records: &[Record]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = S::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    counts.insert(UNKNOWN_STATUS.to_string(), 0);

    for record in records {
        let key = match S::parse(&record.status) {
            Some(status) => status.as_str(),
            None => UNKNOWN_STATUS,
        };
        if let Some(count) = counts.get_mut(key) {
            *count += 1;
        }
    }
    counts
}

/// Calendar date of a timestamp-ish field in `tz`.
///
/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS` (taken as
/// local time) and plain `YYYY-MM-DD` dates.
pub fn local_date(record: &Record, field: &str, tz: Tz) -> Option<NaiveDate> {
    let value = record.field_value(field)?;
    let text = value.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&tz).date_naive());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.date());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

/// Count records per time bucket, judged by `field` against `reference`.
/// Buckets overlap; records without a readable date count nowhere.
pub fn count_by_time_bucket(
    records: &[Record],
    field: &str,
    buckets: &[TimeBucket],
    reference: DateTime<Utc>,
    tz: Tz,
) -> BTreeMap<TimeBucket, usize> {
    let reference_date = reference.with_timezone(&tz).date_naive();
    let mut counts: BTreeMap<TimeBucket, usize> = buckets.iter().map(|b| (*b, 0)).collect();

    for record in records {
        let Some(date) = local_date(record, field, tz) else {
            log::debug!("Record {} has no readable {}", record.id, field);
            continue;
        };
        for bucket in buckets {
            if bucket.contains(date, reference_date) {
                *counts.entry(*bucket).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Sum a numeric field. Missing or non-numeric values count as zero.
pub fn sum_field(records: &[Record], field: &str, filter: Option<&dyn Fn(&Record) -> bool>) -> f64 {
    records
        .iter()
        .filter(|r| filter.map_or(true, |f| f(r)))
        .map(|r| r.get_f64(field).filter(|v| v.is_finite()).unwrap_or(0.0))
        .sum()
}

/// Sum of `field` over records whose `date_field` falls in `bucket`.
pub fn sum_in_bucket(
    records: &[Record],
    field: &str,
    date_field: &str,
    bucket: TimeBucket,
    reference: DateTime<Utc>,
    tz: Tz,
) -> f64 {
    let reference_date = reference.with_timezone(&tz).date_naive();
    let in_bucket: &dyn Fn(&Record) -> bool = &|r| {
        local_date(r, date_field, tz)
            .map(|d| bucket.contains(d, reference_date))
            .unwrap_or(false)
    };
    sum_field(records, field, Some(in_bucket))
}

pub fn average(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Most frequent values of `field`, descending by count. Ties keep the order
/// in which each value first appeared. Records without the field are skipped.
pub fn top_n(records: &[Record], field: &str, n: usize) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = match record.field_value(field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|key| {
            let count = counts.get(&key).copied().unwrap_or(0);
            (key, count)
        })
        .collect();
    // sort_by is stable, so equal counts keep first-seen order
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AppointmentStatus;

    fn with_status(status: &str) -> Record {
        Record::new(status)
    }

    fn dated(field: &str, value: &str) -> Record {
        Record::new("pending").with(field, value)
    }

    fn at(ts: &str) -> DateTime<Utc> {
        ts.parse().expect("timestamp")
    }

    #[test]
    fn test_count_by_status_exact_counts() {
        let mut records = Vec::new();
        records.extend((0..3).map(|_| with_status("pending")));
        records.extend((0..4).map(|_| with_status("confirmed")));
        records.extend((0..2).map(|_| with_status("completed")));
        records.push(with_status("cancelled"));

        let counts = count_by_status::<AppointmentStatus>(&records);
        let nonzero: BTreeMap<&str, usize> = counts
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(k, c)| (k.as_str(), *c))
            .collect();

        let expected: BTreeMap<&str, usize> =
            [("pending", 3), ("confirmed", 4), ("completed", 2), ("cancelled", 1)]
                .into_iter()
                .collect();
        assert_eq!(nonzero, expected);
        assert_eq!(counts.get("rescheduled"), Some(&0));
    }

    #[test]
    fn test_count_by_status_keeps_unknown() {
        let records = vec![with_status("pending"), with_status("no-show"), with_status("")];
        let counts = count_by_status::<AppointmentStatus>(&records);
        assert_eq!(counts.get(UNKNOWN_STATUS), Some(&2));
        assert_eq!(counts.values().sum::<usize>(), 3);
    }

    #[test]
    fn test_division_by_zero_is_zero() {
        assert_eq!(average(0.0, 0), 0.0);
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(average(90.0, 2), 45.0);
        assert_eq!(percentage(1.0, 4.0), 25.0);
    }

    #[test]
    fn test_week_bucket_starts_monday() {
        // 2025-03-12 is a Wednesday
        let reference = at("2025-03-12T15:00:00Z");
        let records = vec![
            dated("bookedAt", "2025-03-10T00:00:00Z"),
            dated("bookedAt", "2025-03-09T23:59:00Z"),
        ];
        let counts = count_by_time_bucket(
            &records,
            "bookedAt",
            &[TimeBucket::ThisWeek],
            reference,
            chrono_tz::UTC,
        );
        assert_eq!(counts.get(&TimeBucket::ThisWeek), Some(&1));

        let sunday_only = count_by_time_bucket(
            &records[1..],
            "bookedAt",
            &[TimeBucket::ThisWeek],
            reference,
            chrono_tz::UTC,
        );
        assert_eq!(sunday_only.get(&TimeBucket::ThisWeek), Some(&0));
    }

    #[test]
    fn test_week_bucket_when_reference_is_sunday() {
        let reference = at("2025-03-16T12:00:00Z");
        assert_eq!(
            week_start(reference.date_naive()),
            NaiveDate::from_ymd_opt(2025, 3, 10).expect("date")
        );
    }

    #[test]
    fn test_buckets_overlap_and_use_salon_timezone() {
        let reference = at("2025-03-12T15:00:00Z");
        let records = vec![
            dated("appointmentDate", "2025-03-12"),
            dated("appointmentDate", "2025-03-02"),
            dated("appointmentDate", "2025-02-28"),
            // 03:00 UTC on the 13th is still the 12th in Toronto
            dated("appointmentDate", "2025-03-13T03:00:00Z"),
            dated("appointmentDate", "not a date"),
        ];
        let counts = count_by_time_bucket(
            &records,
            "appointmentDate",
            &TimeBucket::ALL,
            reference,
            chrono_tz::America::Toronto,
        );
        assert_eq!(counts.get(&TimeBucket::Today), Some(&2));
        assert_eq!(counts.get(&TimeBucket::ThisWeek), Some(&2));
        assert_eq!(counts.get(&TimeBucket::ThisMonth), Some(&3));
    }

    #[test]
    fn test_sum_field_treats_bad_values_as_zero() {
        let records = vec![
            Record::new("completed").with("amount", 40),
            Record::new("completed").with("amount", "12.5"),
            Record::new("completed").with("amount", "free"),
            Record::new("refunded").with("amount", 100),
            Record::new("completed"),
        ];
        assert_eq!(sum_field(&records, "amount", None), 152.5);

        let completed: &dyn Fn(&Record) -> bool = &|r| r.status == "completed";
        assert_eq!(sum_field(&records, "amount", Some(completed)), 52.5);
    }

    #[test]
    fn test_top_n_stable_ties() {
        let records: Vec<Record> = ["A", "B", "A", "C", "B", "A"]
            .iter()
            .map(|g| Record::new("pending").with("service", *g))
            .collect();
        assert_eq!(
            top_n(&records, "service", 2),
            vec![("A".to_string(), 3), ("B".to_string(), 2)]
        );

        let tied: Vec<Record> = ["C", "B", "A", "B", "C", "A"]
            .iter()
            .map(|g| Record::new("pending").with("service", *g))
            .collect();
        assert_eq!(
            top_n(&tied, "service", 3),
            vec![("C".to_string(), 2), ("B".to_string(), 2), ("A".to_string(), 2)]
        );
    }

    #[test]
    fn test_top_n_skips_missing_values() {
        let records = vec![
            Record::new("pending").with("service", "A"),
            Record::new("pending"),
            Record::new("pending").with("service", ""),
        ];
        assert_eq!(top_n(&records, "service", 10), vec![("A".to_string(), 1)]);
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let reference = at("2025-03-12T15:00:00Z");
        let records: Vec<Record> = (0..20)
            .map(|i| {
                Record::new(if i % 3 == 0 { "completed" } else { "pending" })
                    .with("appointmentDate", format!("2025-03-{:02}", (i % 28) + 1))
                    .with("service", format!("S{}", i % 4))
            })
            .collect();

        let run = || {
            (
                count_by_status::<AppointmentStatus>(&records),
                count_by_time_bucket(
                    &records,
                    "appointmentDate",
                    &TimeBucket::ALL,
                    reference,
                    chrono_tz::UTC,
                ),
                top_n(&records, "service", 4),
            )
        };
        assert_eq!(run(), run());
    }
}
