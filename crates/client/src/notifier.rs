//! User-facing progress reporting

use crate::error::Error;

/// Receives progress and failures of client operations
///
/// The client never prints; a front end decides how these are shown.
pub trait Notifier: Send + Sync {
    /// An intermediate step of a longer operation
    fn partial(&self, message: &str);
    /// Successful end of an operation
    fn finish(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, error: &Error);
}

/// Forwards notifications to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn partial(&self, message: &str) {
        tracing::info!("{}...", message);
    }

    fn finish(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, error: &Error) {
        tracing::error!("{}", error);
    }
}
