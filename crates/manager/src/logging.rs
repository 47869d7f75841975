use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize process-wide structured logging.
///
/// - Reads filter from `RUST_LOG` (default `info`).
/// - Formats logs with target and thread id, no file/line.
///
/// Every component receives this already-initialized global subscriber
/// rather than constructing its own logger (§Ambient Stack — Logging).
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(Into::into)
}
