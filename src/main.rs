//! salon-stats: print the admin dashboard computed from the local mirror.
//!
//! Reads `~/.salondesk/config.json` for the mirror directory and the salon
//! timezone. Useful when the hosted store is unreachable.

use chrono::Utc;

use salon_desk::config::load_config;
use salon_desk::mirror::{FileMirror, LocalMirror};
use salon_desk::record::{Appointment, Customer, Payment, RecordKind};
use salon_desk::services::appointments::catalog_size;
use salon_desk::stats::DashboardStats;

fn main() -> anyhow::Result<()> {
    salon_desk::logging::init();

    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;
    let tz = config.business.tz()?;
    let dir = config.storage.mirror_dir()?;
    let mirror = FileMirror::new(&dir);
    log::info!("Reading mirror from {}", mirror.dir().display());

    let appointments = mirror.read(Appointment::MIRROR_KEY)?;
    let customers = mirror.read(Customer::MIRROR_KEY)?;
    let payments = mirror.read(Payment::MIRROR_KEY)?;

    let stats = DashboardStats::compute(
        &appointments,
        &customers,
        &payments,
        catalog_size(),
        Utc::now(),
        tz,
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
