use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for schedule change notifications. One schedule, one channel.
pub struct ChangeHub {
    sender: broadcast::Sender<Event>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to committed schedule events. Only events committed after
    /// the subscription are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Broadcast a committed event. Dropped silently when nobody listens.
    pub fn send(&self, event: &Event) {
        let _ = self.sender.send(event.clone());
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}
