//! Where notifications end up.

use super::{FollowUp, Notification, Variant};

pub trait NotificationSink {
    fn notify(&mut self, notification: Notification);
}

impl NotificationSink for Vec<Notification> {
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}

/// Prints one line per notification and logs follow-up actions once
/// their delay has elapsed. Requires a tokio runtime.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl NotificationSink for TerminalSink {
    fn notify(&mut self, notification: Notification) {
        println!("{}", render(&notification));

        if let Some(follow_up) = notification.follow_up {
            tokio::spawn(async move {
                match follow_up {
                    FollowUp::NavigateToResource { resource_id, after } => {
                        tokio::time::sleep(after).await;
                        tracing::info!(resource_id, "Open resource detail");
                    }
                    FollowUp::RefreshView { after } => {
                        tokio::time::sleep(after).await;
                        tracing::info!("Refresh job list");
                    }
                }
            });
        }
    }
}

pub fn render(notification: &Notification) -> String {
    let tag = match notification.variant {
        Variant::Destructive => "ERROR",
        Variant::Success => "DONE",
        Variant::Primary => "INFO",
        Variant::Neutral => "....",
    };
    match &notification.description {
        Some(description) => format!("[{tag}] {}: {description}", notification.title),
        None => format!("[{tag}] {}", notification.title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_title_and_description() {
        let n = Notification::new(Variant::Destructive, "Summarizing content failed")
            .with_description("Rate limited");
        assert_eq!(render(&n), "[ERROR] Summarizing content failed: Rate limited");

        let n = Notification::new(Variant::Success, "Fetching metadata done");
        assert_eq!(render(&n), "[DONE] Fetching metadata done");
    }
}
