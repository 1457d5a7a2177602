//! Diagnostic logging setup
//!
//! Every event goes to the console through `tracing-subscriber`. With the
//! `syslog-backend` feature events are also forwarded to the local syslog
//! daemon, and with `journald` to the systemd journal.

#[cfg(feature = "syslog-backend")]
pub mod syslog_layer;

use crate::config::{LogFormat, LoggingSettings};
use crate::{PacketLogError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

#[cfg(feature = "syslog-backend")]
pub use syslog_layer::SyslogLayer;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `settings.level`; `verbose` forces
/// debug output for this crate.
pub fn init(settings: &LoggingSettings, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("packetlog=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
    };

    let console = match settings.format {
        LogFormat::Pretty => fmt::layer().pretty().with_target(false).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    #[cfg(feature = "syslog-backend")]
    let syslog = if settings.syslog.enabled {
        // No syslog daemon (e.g. in a container) is not fatal
        match SyslogLayer::connect(&settings.syslog) {
            Ok(layer) => Some(layer),
            Err(e) => {
                eprintln!("Syslog unavailable, logging to console only: {}", e);
                None
            }
        }
    } else {
        None
    };
    #[cfg(not(feature = "syslog-backend"))]
    let syslog: Option<tracing_subscriber::layer::Identity> = None;

    #[cfg(feature = "journald")]
    let journald = if settings.journald {
        Some(tracing_journald::layer().map_err(|e| {
            PacketLogError::Config(format!("Failed to connect to journald: {}", e))
        })?)
    } else {
        None
    };
    #[cfg(not(feature = "journald"))]
    let journald: Option<tracing_subscriber::layer::Identity> = None;

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(syslog)
        .with(journald)
        .try_init()
        .map_err(|e| PacketLogError::Config(format!("Failed to set tracing subscriber: {}", e)))
}
