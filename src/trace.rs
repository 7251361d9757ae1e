//! Logging setup shared by the binaries.

/// Install a stderr fmt subscriber with local timestamps.
///
/// Filter comes from `RUST_LOG`, defaulting to `info` so the status lines
/// show up without stealing stdout from the sample output.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_timer(fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string())),
        )
        .with(filter)
        .init();
}
