//! Metrics and observability infrastructure.
//!
//! This module groups the observability components:
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

pub use server::init;

/// Emit an internal event as a metric.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use medallion::metrics::events::RowsRead;
///
/// emit!(RowsRead { rows: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
