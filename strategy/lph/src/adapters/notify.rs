use clients_telegrambot::TelegramBot;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::provider::Notifier;
use crate::types::HedgeEvent;

/// Queues events for a background Telegram sender; `notify` never waits on the network.
pub struct TelegramNotifier {
    tx: mpsc::Sender<(String, String)>,
    base_symbol: String,
}

impl TelegramNotifier {
    /// Starts the sender task. Must be called inside a tokio runtime.
    pub fn spawn(bot: TelegramBot, base_symbol: String, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<(String, String)>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some((key, text)) = rx.recv().await {
                match bot.push_keyed(&key, &text).await {
                    Ok(true) => debug!(key = %key, "notification sent"),
                    Ok(false) => debug!(key = %key, "notification debounced"),
                    Err(err) => warn!(key = %key, error = %format!("{:#}", err), "notification failed"),
                }
            }
        });
        (Self { tx, base_symbol }, handle)
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, event: &HedgeEvent) {
        let item = (event.key(), event.to_message(&self.base_symbol));
        if let Err(err) = self.tx.try_send(item) {
            warn!(key = %event.key(), error = %err, "notification dropped");
        }
    }
}

/// Writes events to the log as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &HedgeEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!(target: "lph::events", event = %json),
            Err(err) => warn!(error = %err, "event not serializable"),
        }
    }
}

/// Fans one event out to several notifiers.
pub struct FanoutNotifier(pub Vec<Box<dyn Notifier>>);

impl Notifier for FanoutNotifier {
    fn notify(&self, event: &HedgeEvent) {
        for notifier in &self.0 {
            notifier.notify(event);
        }
    }
}
