use chrono::{DateTime, Utc};

use crate::reminder::ReminderInterval;

pub struct NewReminder {
    pub message: String,
    pub interval: ReminderInterval,
    pub next_trigger_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
