//! User-visible warning and error aggregation
//!
//! Non-fatal problems (a node that could not be verified, a skipped CSV row)
//! are reported here instead of being raised. The handle is passed to every
//! component that needs it; nothing in the crate keeps a global instance.

use std::sync::Mutex;

use tracing::{error, warn};

/// Notification levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Warn,
    Error,
}

/// A single queued notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
}

/// Sink for user-visible notifications. Fire-and-forget.
pub trait MessagesAggregator: Send + Sync {
    fn add_warning(&self, message: String);

    fn add_error(&self, message: String);
}

/// In-memory queue of notifications, drained by the caller
#[derive(Debug, Default)]
pub struct MessageQueue {
    queue: Mutex<Vec<Notification>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return all queued warnings, oldest first
    pub fn consume_warnings(&self) -> Vec<String> {
        self.consume(NotifyLevel::Warn)
    }

    /// Remove and return all queued errors, oldest first
    pub fn consume_errors(&self) -> Vec<String> {
        self.consume(NotifyLevel::Error)
    }

    /// Remove and return everything, in arrival order
    pub fn drain(&self) -> Vec<Notification> {
        let mut queue = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *queue)
    }

    fn consume(&self, level: NotifyLevel) -> Vec<String> {
        let mut queue = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        let (taken, kept): (Vec<_>, Vec<_>) =
            queue.drain(..).partition(|item| item.level == level);
        *queue = kept;
        taken.into_iter().map(|item| item.message).collect()
    }

    fn push(&self, level: NotifyLevel, message: String) {
        let mut queue = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        queue.push(Notification { level, message });
    }
}

impl MessagesAggregator for MessageQueue {
    fn add_warning(&self, message: String) {
        warn!(target: "ethgate::messages", "{}", message);
        self.push(NotifyLevel::Warn, message);
    }

    fn add_error(&self, message: String) {
        error!(target: "ethgate::messages", "{}", message);
        self.push(NotifyLevel::Error, message);
    }
}
