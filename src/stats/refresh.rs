//! Background dashboard refresher.
//!
//! Reloads appointments, customers and payments on a fixed interval and
//! publishes the recomputed `DashboardStats` through a watch channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::{watch, Notify};

use super::DashboardStats;
use crate::record::{Appointment, Customer, Payment};
use crate::repository::Repository;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

pub struct StatsRefresher {
    appointments: Arc<Repository<Appointment>>,
    customers: Arc<Repository<Customer>>,
    payments: Arc<Repository<Payment>>,
    catalog_size: usize,
    tz: Tz,
    interval: Duration,
    latest: watch::Sender<Option<DashboardStats>>,
    wake: Notify,
}

impl StatsRefresher {
    pub fn new(
        appointments: Arc<Repository<Appointment>>,
        customers: Arc<Repository<Customer>>,
        payments: Arc<Repository<Payment>>,
        catalog_size: usize,
        tz: Tz,
        interval: Duration,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            appointments,
            customers,
            payments,
            catalog_size,
            tz,
            interval,
            latest,
            wake: Notify::new(),
        }
    }

    /// Receiver for published snapshots. `run` exits once every receiver
    /// has been dropped, so subscribe before spawning it.
    pub fn subscribe(&self) -> watch::Receiver<Option<DashboardStats>> {
        self.latest.subscribe()
    }

    /// Most recently published snapshot, if any.
    pub fn latest(&self) -> Option<DashboardStats> {
        self.latest.borrow().clone()
    }

    /// Reload all three collections, recompute and publish once.
    pub async fn refresh_now(&self) -> DashboardStats {
        let (appointments, customers, payments) = tokio::join!(
            self.appointments.load(),
            self.customers.load(),
            self.payments.load()
        );

        let stats = DashboardStats::compute(
            &appointments.records,
            &customers.records,
            &payments.records,
            self.catalog_size,
            Utc::now(),
            self.tz,
        );
        log::debug!(
            "Stats refreshed: {} appointments ({:?}), {} customers ({:?}), {} payments ({:?})",
            appointments.len(),
            appointments.source,
            customers.len(),
            customers.source,
            payments.len(),
            payments.source
        );
        self.latest.send_replace(Some(stats.clone()));
        stats
    }

    /// Cut the current sleep short and refresh immediately.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub async fn run(self: Arc<Self>) {
        log::info!("Stats refresher: every {}s", self.interval.as_secs());
        loop {
            if self.latest.is_closed() {
                break;
            }
            self.refresh_now().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = self.wake.notified() => {
                    log::info!("Stats refresher: woken for manual refresh");
                },
                _ = self.latest.closed() => break,
            }
        }
        log::info!("Stats refresher: no subscribers left, stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryMirror;
    use crate::record::Record;
    use crate::store::MemoryStore;

    fn refresher(store: Arc<MemoryStore>) -> (StatsRefresher, Arc<Repository<Appointment>>) {
        let mirror = Arc::new(MemoryMirror::new());
        let appointments = Arc::new(Repository::<Appointment>::new(store.clone(), mirror.clone()));
        let customers = Arc::new(Repository::<Customer>::new(store.clone(), mirror.clone()));
        let payments = Arc::new(Repository::<Payment>::new(store, mirror));
        let refresher = StatsRefresher::new(
            appointments.clone(),
            customers,
            payments,
            6,
            chrono_tz::America::Toronto,
            Duration::from_secs(30),
        );
        (refresher, appointments)
    }

    fn booking() -> Record {
        Record::new("pending")
            .with("service", "Gel Manicure")
            .with("appointmentDate", "2025-03-12")
            .with("appointmentTime", "10:00")
            .with("email", "a@b.com")
    }

    #[tokio::test]
    async fn test_refresh_now_publishes() {
        let store = Arc::new(MemoryStore::new());
        let (refresher, appointments) = refresher(store);
        appointments.save(booking()).await.expect("save");

        let rx = refresher.subscribe();
        let stats = refresher.refresh_now().await;
        assert_eq!(stats.appointments.total, 1);
        assert_eq!(stats.services.total_services, 6);
        assert_eq!(rx.borrow().as_ref().map(|s| s.appointments.total), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_refreshes_on_interval_and_stops_without_subscribers() {
        let store = Arc::new(MemoryStore::new());
        let (refresher, appointments) = refresher(store);
        let refresher = Arc::new(refresher);
        let mut rx = refresher.subscribe();

        let handle = tokio::spawn(refresher.clone().run());

        rx.changed().await.expect("first publish");
        assert_eq!(rx.borrow_and_update().as_ref().map(|s| s.appointments.total), Some(0));

        appointments.save(booking()).await.expect("save");
        tokio::time::advance(Duration::from_secs(31)).await;
        rx.changed().await.expect("second publish");
        assert_eq!(rx.borrow_and_update().as_ref().map(|s| s.appointments.total), Some(1));

        drop(rx);
        handle.await.expect("refresher task");
    }
}
