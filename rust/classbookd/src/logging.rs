//! Tracing setup for the sidecar.
//!
//! stdout carries the IPC protocol, so every log line goes to stderr.
//! `CLASSBOOKD_LOG` takes an `EnvFilter` directive (for example
//! `classbookd=debug`) and defaults to `info`.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

pub const LOG_ENV: &str = "CLASSBOOKD_LOG";

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter);

    // A second init (tests embedding the library) is harmless.
    let _ = Registry::default().with(stderr_layer).try_init();
}
