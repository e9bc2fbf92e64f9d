use async_trait::async_trait;

use crate::reminder::Reminder;

#[async_trait]
pub trait ReminderDeliveryChannel: Send + Sync + 'static {
    async fn send_reminder_notification(&self, reminder: &Reminder) -> anyhow::Result<()>;
}

/// Prints fired reminders to the process output.
pub struct LogDeliveryChannel;

#[async_trait]
impl ReminderDeliveryChannel for LogDeliveryChannel {
    async fn send_reminder_notification(&self, reminder: &Reminder) -> anyhow::Result<()> {
        println!("🔔 REMINDER: {}", reminder.message);
        log::info!(
            "[DELIVERY] Reminder delivered to output. [reminder_id = {}]",
            reminder.id
        );

        Ok(())
    }
}
