//! Invalidation signals for caches owned by the application layer.

use gym_types::Notifier;
use tokio::sync::broadcast;

/// Cache keys touched by a lifecycle change of one member.
pub fn invalidation_keys(member_id: &str) -> [String; 3] {
    [
        format!("member:{}", member_id),
        format!("assignments:{}", member_id),
        format!("audit:{}", member_id),
    ]
}

/// Discards every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn invalidate(&self, _key: &str) {}
}

/// Fans invalidation keys out to any number of subscribers.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<String>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn invalidate(&self, key: &str) {
        // No subscribers is not an error.
        let _ = self.tx.send(key.to_string());
    }
}
