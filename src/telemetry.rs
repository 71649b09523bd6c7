//! Telemetry utilities: operation timing, spans, and audit events.

use std::time::Instant;

/// Guard for timing an operation from Start to Off.
pub struct OperationTimer {
    start: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Emit a server audit event.
///
/// Audit events go to the `audit` target so they can be routed separately:
///
/// ```ignore
/// audit!("accountLogin", account_id = id, login = %token);
/// ```
macro_rules! audit {
    ($event:literal $(, $($fields:tt)*)?) => {
        ::tracing::info!(target: "audit", event = $event $(, $($fields)*)?, "audit")
    };
}

pub(crate) use audit;

/// Standardized span constructors.
pub mod spans {
    use crate::ids::Channel;
    use tracing::{Span, info_span};

    /// Span wrapping one operation from Start to Off.
    pub fn operation(kind: &str, actor: &str) -> Span {
        info_span!("operation", kind = %kind, actor = %actor)
    }

    /// Span for one inbound client request.
    pub fn request(name: &str, sender: Channel) -> Span {
        info_span!("request", name = %name, sender = %sender)
    }
}
