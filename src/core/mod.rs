pub mod messages;

pub use messages::{MessageQueue, MessagesAggregator, Notification, NotifyLevel};
