use crate::models::Notification;
use tokio::sync::mpsc;

// Implementations must not block the scan.
pub trait NotificationSink: Send + Sync {
    fn announce(&self, notification: &Notification);
}

#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn announce(&self, notification: &Notification) {
        tracing::info!(
            task_id = notification.task_id,
            due_date = %notification.due_date,
            skipped = notification.skipped_occurrences,
            "{}",
            notification.message
        );
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn announce(&self, notification: &Notification) {
        if self.sender.send(notification.clone()).is_err() {
            tracing::warn!(task_id = notification.task_id, "notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Repetition, Task};
    use chrono::Utc;

    #[test]
    fn channel_sink_delivers_message_text() {
        let (sink, mut receiver) = ChannelSink::new();
        let task = Task {
            id: 4,
            title: "Pay rent".to_string(),
            status: false,
            due_date: Utc::now(),
            repetition: Repetition::Monthly,
            last_notified_at: None,
        };
        sink.announce(&Notification::for_task(&task, Utc::now()));

        let received = receiver.try_recv().expect("notification delivered");
        assert_eq!(received.task_id, 4);
        assert_eq!(received.message, "Task \"Pay rent\" is due!");
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        let task = Task {
            id: 1,
            title: "Orphan".to_string(),
            status: false,
            due_date: Utc::now(),
            repetition: Repetition::None,
            last_notified_at: None,
        };
        sink.announce(&Notification::for_task(&task, Utc::now()));
    }
}
