//! Composition root.
//!
//! `AppState` wires one repository per record kind, the notification
//! dispatcher, the optional payment provider and the domain services from a
//! `Config` and the collaborators the host supplies.

use std::sync::Arc;

use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::{authorize, AuthProvider, Identity, Role};
use crate::config::Config;
use crate::error::SalonError;
use crate::mirror::LocalMirror;
use crate::notification::{Dispatcher, EmailChannel, OutboundQueue, SmsChannel};
use crate::payments::{PaymentProvider, StripeProvider};
use crate::record::{Appointment, Customer, Message, Payment};
use crate::repository::Repository;
use crate::services::appointments::catalog_size;
use crate::services::{AppointmentService, CustomerService, MessageService, PaymentService};
use crate::stats::{DashboardStats, StatsRefresher};
use crate::store::RemoteStore;

pub struct AppState {
    pub config: Config,
    pub tz: Tz,
    pub auth: Arc<dyn AuthProvider>,
    pub dispatcher: Arc<Dispatcher>,
    pub appointments: AppointmentService,
    pub customers: CustomerService,
    pub payments: PaymentService,
    pub messages: MessageService,
    pub stats: Arc<StatsRefresher>,
}

impl AppState {
    /// Build every component from `config`. A Stripe provider is created
    /// only when a secret key is configured.
    pub fn new(
        config: Config,
        store: Arc<dyn RemoteStore>,
        mirror: Arc<dyn LocalMirror>,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, SalonError> {
        let provider: Option<Arc<dyn PaymentProvider>> = config
            .payments
            .secret_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(|key| {
                Arc::new(StripeProvider::with_api_base(key, &config.payments.api_base))
                    as Arc<dyn PaymentProvider>
            });
        Self::with_payment_provider(config, store, mirror, auth, provider)
    }

    pub fn with_payment_provider(
        config: Config,
        store: Arc<dyn RemoteStore>,
        mirror: Arc<dyn LocalMirror>,
        auth: Arc<dyn AuthProvider>,
        provider: Option<Arc<dyn PaymentProvider>>,
    ) -> Result<Self, SalonError> {
        let tz = config.business.tz()?;

        let appointments = Arc::new(Repository::<Appointment>::new(store.clone(), mirror.clone()));
        let customers = Arc::new(Repository::<Customer>::new(store.clone(), mirror.clone()));
        let payments = Arc::new(Repository::<Payment>::new(store.clone(), mirror.clone()));
        let messages = Arc::new(Repository::<Message>::new(store.clone(), mirror));

        let queue = OutboundQueue::new(store);
        let dispatcher = Arc::new(
            Dispatcher::new()
                .with_channel(Arc::new(EmailChannel::new(config.email.clone(), queue.clone())))
                .with_channel(Arc::new(SmsChannel::new(config.business.name.clone(), queue))),
        );

        let stats = Arc::new(StatsRefresher::new(
            appointments.clone(),
            customers.clone(),
            payments.clone(),
            catalog_size(),
            tz,
            config.stats.refresh_interval(),
        ));

        log::info!(
            "Salon state ready for {} ({}), payments {}",
            config.business.name,
            tz,
            if provider.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            tz,
            auth,
            messages: MessageService::new(messages),
            appointments: AppointmentService::new(appointments, Some(dispatcher.clone())),
            customers: CustomerService::new(customers),
            payments: PaymentService::new(
                payments,
                provider,
                &config.business.currency,
                config.business.tax_rate,
            ),
            dispatcher,
            stats,
            config,
        })
    }

    pub fn session(&self) -> Option<Identity> {
        self.auth.current()
    }

    /// Reload the three stats collections and return a fresh dashboard.
    /// Admin only.
    pub async fn dashboard(&self) -> Result<DashboardStats, SalonError> {
        let session = self.session();
        authorize(session.as_ref(), Role::Admin)?;
        Ok(self.stats.refresh_now().await)
    }

    /// Subscribe to dashboard updates and start the refresh loop.
    pub fn spawn_stats_refresher(
        &self,
    ) -> (watch::Receiver<Option<DashboardStats>>, JoinHandle<()>) {
        let rx = self.stats.subscribe();
        let handle = tokio::spawn(self.stats.clone().run());
        (rx, handle)
    }
}
