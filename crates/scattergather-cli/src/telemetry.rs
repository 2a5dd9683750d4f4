//! Log output for the `scattergather` binary.
//!
//! Events from the library (pool start and stop, worker lifecycle, chunk
//! scheduling) and from the binary itself are printed to stderr by a
//! `tracing_subscriber::fmt` layer, leaving stdout to the merged records.
//!
//! The level is taken from `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=scattergather=trace scattergather --num-workers 4 < ids.txt
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_file(true),
        )
        .try_init()?;

    Ok(())
}
