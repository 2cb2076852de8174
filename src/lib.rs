//! Salon booking core: cached collection repositories over a hosted
//! document store, dashboard statistics, and best-effort booking
//! notifications.

pub mod auth;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod mirror;
pub mod notification;
pub mod payments;
pub mod record;
pub mod repository;
pub mod services;
pub mod state;
pub mod stats;
pub mod store;

pub use error::{ErrorNotice, SalonError};
pub use record::Record;
pub use repository::{Collection, LoadSource, Repository};
pub use state::AppState;
