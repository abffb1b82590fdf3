//! One-way diagnostic sink for run progress.

use tokio::sync::mpsc::UnboundedSender;

/// Receives human-readable diagnostics. Never used for control flow.
pub trait ProgressSink: Send + Sync {
    /// Deliver one message.
    fn report(&self, message: String);
}

impl ProgressSink for UnboundedSender<String> {
    fn report(&self, message: String) {
        // A dropped receiver only means nobody is listening.
        let _ = self.send(message);
    }
}

/// Forwards messages to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, message: String) {
        tracing::info!("{message}");
    }
}

/// Adapts a closure into a [`ProgressSink`].
#[derive(Debug, Clone, Copy)]
pub struct FnProgress<F>(pub F);

impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(String) + Send + Sync,
{
    fn report(&self, message: String) {
        (self.0)(message);
    }
}
