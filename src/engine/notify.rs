use log::info;

/// Receives state changes meant for a remote display.
pub trait NotificationSink: Send + Sync {
    /// Called whenever the in-progress number changes. An empty string means the number was cleared.
    fn on_digits_changed(&self, digits: &str);
}

/// Sink that writes display updates to the log.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn on_digits_changed(&self, digits: &str) {
        info!("Display: '{}'", digits);
    }
}
