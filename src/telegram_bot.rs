use async_trait::async_trait;
use teloxide::prelude::*;

use crate::{reminder::Reminder, scheduling::ReminderDeliveryChannel};

/// Delivers fired reminders to a single Telegram chat.
pub struct TelegramDeliveryChannel {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramDeliveryChannel {
    pub fn create(token: String, chat_id: i64) -> Self {
        let bot = Bot::new(token);

        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl ReminderDeliveryChannel for TelegramDeliveryChannel {
    async fn send_reminder_notification(&self, reminder: &Reminder) -> anyhow::Result<()> {
        self.bot
            .send_message(self.chat_id, message_text(reminder))
            .await?;

        log::info!(
            "[DELIVERY] Reminder sent to Telegram. [reminder_id = {}, chat_id = {}]",
            reminder.id,
            self.chat_id.0
        );
        Ok(())
    }
}

fn message_text(reminder: &Reminder) -> String {
    format!("🔔 {}", reminder.message)
}
