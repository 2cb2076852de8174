//! Admin dashboard snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::{
    average, count_by_status, count_by_time_bucket, percentage, sum_field, sum_in_bucket, top_n,
    TimeBucket,
};
use crate::record::{AppointmentStatus, CustomerStatus, LifecycleStatus, PaymentStatus, Record};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSummary {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
    pub this_month: usize,
    pub by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub total: usize,
    pub active: usize,
    pub new_this_month: usize,
    pub returning: usize,
    pub by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total: f64,
    pub today: f64,
    pub this_week: f64,
    pub this_month: f64,
    pub average_per_appointment: f64,
    pub payments_by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStat {
    pub service: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub most_popular: Option<String>,
    pub total_services: usize,
    pub service_stats: Vec<ServiceStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub appointments: AppointmentSummary,
    pub customers: CustomerSummary,
    pub revenue: RevenueSummary,
    pub services: ServiceSummary,
    pub generated_at: DateTime<Utc>,
}

impl DashboardStats {
    /// Build the dashboard from already-loaded collections.
    ///
    /// Appointments bucket on `appointmentDate`, revenue on the payment's
    /// `createdAt`, new customers on the customer's `createdAt`. Revenue only
    /// counts completed payments.
    pub fn compute(
        appointments: &[Record],
        customers: &[Record],
        payments: &[Record],
        catalog_size: usize,
        reference: DateTime<Utc>,
        tz: Tz,
    ) -> Self {
        let appointment_buckets =
            count_by_time_bucket(appointments, "appointmentDate", &TimeBucket::ALL, reference, tz);
        let bucket = |counts: &BTreeMap<TimeBucket, usize>, b: TimeBucket| {
            counts.get(&b).copied().unwrap_or(0)
        };

        let customer_status = count_by_status::<CustomerStatus>(customers);
        let new_customers =
            count_by_time_bucket(customers, "createdAt", &[TimeBucket::ThisMonth], reference, tz);
        let returning = customers
            .iter()
            .filter(|c| c.get_f64("totalAppointments").unwrap_or(0.0) > 1.0)
            .count();

        let completed: Vec<Record> = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed.as_str())
            .cloned()
            .collect();
        let total_revenue = sum_field(&completed, "amount", None);
        let revenue_in =
            |b: TimeBucket| sum_in_bucket(&completed, "amount", "createdAt", b, reference, tz);

        let ranked = top_n(appointments, "service", usize::MAX);
        let service_stats: Vec<ServiceStat> = ranked
            .iter()
            .map(|(service, count)| ServiceStat {
                service: service.clone(),
                count: *count,
                percentage: percentage(*count as f64, appointments.len() as f64),
            })
            .collect();

        DashboardStats {
            appointments: AppointmentSummary {
                total: appointments.len(),
                today: bucket(&appointment_buckets, TimeBucket::Today),
                this_week: bucket(&appointment_buckets, TimeBucket::ThisWeek),
                this_month: bucket(&appointment_buckets, TimeBucket::ThisMonth),
                by_status: count_by_status::<AppointmentStatus>(appointments),
            },
            customers: CustomerSummary {
                total: customers.len(),
                active: customer_status
                    .get(CustomerStatus::Active.as_str())
                    .copied()
                    .unwrap_or(0),
                new_this_month: bucket(&new_customers, TimeBucket::ThisMonth),
                returning,
                by_status: customer_status,
            },
            revenue: RevenueSummary {
                total: total_revenue,
                today: revenue_in(TimeBucket::Today),
                this_week: revenue_in(TimeBucket::ThisWeek),
                this_month: revenue_in(TimeBucket::ThisMonth),
                average_per_appointment: average(total_revenue, appointments.len()),
                payments_by_status: count_by_status::<PaymentStatus>(payments),
            },
            services: ServiceSummary {
                most_popular: ranked.first().map(|(service, _)| service.clone()),
                total_services: catalog_size,
                service_stats,
            },
            generated_at: reference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(service: &str, date: &str, status: &str) -> Record {
        Record::new(status)
            .with("service", service)
            .with("appointmentDate", date)
    }

    fn payment(amount: f64, created: &str, status: &str) -> Record {
        let mut record = Record::new(status).with("amount", amount);
        record.created_at = Some(created.parse().expect("timestamp"));
        record
    }

    fn customer(status: &str, created: &str, visits: u32) -> Record {
        let mut record = Record::new(status).with("totalAppointments", visits);
        record.created_at = Some(created.parse().expect("timestamp"));
        record
    }

    #[test]
    fn test_dashboard_compute() {
        let reference: DateTime<Utc> = "2025-03-12T15:00:00Z".parse().expect("ts");
        let appointments = vec![
            appointment("Gel Manicure", "2025-03-12", "confirmed"),
            appointment("Nail Art Design", "2025-03-11", "pending"),
            appointment("Gel Manicure", "2025-03-02", "completed"),
            appointment("Classic Manicure", "2025-02-20", "completed"),
        ];
        let customers = vec![
            customer("active", "2025-03-01T10:00:00Z", 3),
            customer("active", "2025-01-05T10:00:00Z", 1),
            customer("suspended", "2025-03-10T10:00:00Z", 0),
        ];
        let payments = vec![
            payment(50.85, "2025-03-12T14:00:00Z", "completed"),
            payment(39.55, "2025-03-03T14:00:00Z", "completed"),
            payment(100.0, "2025-03-12T14:00:00Z", "refunded"),
        ];

        let stats = DashboardStats::compute(
            &appointments,
            &customers,
            &payments,
            6,
            reference,
            chrono_tz::UTC,
        );

        assert_eq!(stats.appointments.total, 4);
        assert_eq!(stats.appointments.today, 1);
        assert_eq!(stats.appointments.this_week, 2);
        assert_eq!(stats.appointments.this_month, 3);
        assert_eq!(stats.appointments.by_status.get("completed"), Some(&2));

        assert_eq!(stats.customers.total, 3);
        assert_eq!(stats.customers.active, 2);
        assert_eq!(stats.customers.new_this_month, 2);
        assert_eq!(stats.customers.returning, 1);

        assert!((stats.revenue.total - 90.40).abs() < 1e-9);
        assert!((stats.revenue.today - 50.85).abs() < 1e-9);
        assert!((stats.revenue.this_week - 50.85).abs() < 1e-9);
        assert!((stats.revenue.this_month - 90.40).abs() < 1e-9);
        assert!((stats.revenue.average_per_appointment - 22.60).abs() < 1e-9);
        assert_eq!(stats.revenue.payments_by_status.get("refunded"), Some(&1));

        assert_eq!(stats.services.most_popular.as_deref(), Some("Gel Manicure"));
        assert_eq!(stats.services.total_services, 6);
        assert_eq!(stats.services.service_stats[0].count, 2);
        assert_eq!(stats.services.service_stats[0].percentage, 50.0);
    }

    #[test]
    fn test_dashboard_empty_collections() {
        let reference: DateTime<Utc> = "2025-03-12T15:00:00Z".parse().expect("ts");
        let stats = DashboardStats::compute(&[], &[], &[], 0, reference, chrono_tz::UTC);
        assert_eq!(stats.appointments.total, 0);
        assert_eq!(stats.revenue.average_per_appointment, 0.0);
        assert!(stats.services.most_popular.is_none());
        assert!(stats.services.service_stats.is_empty());
    }
}
