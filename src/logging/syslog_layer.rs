//! Forwarding tracing events to the local syslog daemon

use crate::config::SyslogSettings;
use crate::{PacketLogError, Result};
use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use syslog::{Facility, Formatter3164, Logger, LoggerBackend};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// `tracing` layer writing one RFC 3164 syslog message per event
pub struct SyslogLayer {
    logger: Mutex<Logger<LoggerBackend, Formatter3164>>,
}

impl SyslogLayer {
    /// Connect to the local syslog socket
    pub fn connect(settings: &SyslogSettings) -> Result<Self> {
        let facility = Facility::from_str(&settings.facility).map_err(|_| {
            PacketLogError::Config(format!("Unknown syslog facility '{}'", settings.facility))
        })?;

        let formatter = Formatter3164 {
            facility,
            hostname: Some(gethostname::gethostname().to_string_lossy().to_string()),
            process: settings.identifier.clone(),
            pid: std::process::id(),
        };

        let logger = syslog::unix(formatter)
            .map_err(|e| PacketLogError::Config(format!("Failed to connect to syslog: {}", e)))?;

        Ok(Self {
            logger: Mutex::new(logger),
        })
    }
}

impl<S: Subscriber> Layer<S> for SyslogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = visitor.finish();

        // Nowhere to report a failing log sink; drop the message.
        let mut logger = self.logger.lock();
        let _ = match *event.metadata().level() {
            Level::ERROR => logger.err(line),
            Level::WARN => logger.warning(line),
            Level::INFO => logger.info(line),
            Level::DEBUG | Level::TRACE => logger.debug(line),
        };
    }
}

/// Flattens an event into `message key=value ...`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={:?}", field.name(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_facility_is_rejected() {
        let settings = SyslogSettings {
            facility: "nonsense".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            SyslogLayer::connect(&settings),
            Err(PacketLogError::Config(_))
        ));
    }

    #[test]
    fn test_message_precedes_fields() {
        let visitor = MessageVisitor {
            message: "Received data".to_string(),
            fields: "bytes=42".to_string(),
        };
        assert_eq!(visitor.finish(), "Received data bytes=42");

        let bare = MessageVisitor {
            message: "Server shutting down".to_string(),
            fields: String::new(),
        };
        assert_eq!(bare.finish(), "Server shutting down");
    }
}
