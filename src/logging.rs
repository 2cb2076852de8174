//! Logger setup for binaries and hosts that do not install their own.

/// Install `env_logger` at `info`, overridable through `RUST_LOG`.
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialized");
    }
}
