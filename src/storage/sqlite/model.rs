use chrono::{DateTime, Utc};

use crate::{
    reminder::{Reminder, ReminderInterval},
    storage::StorageError,
};

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ReminderStorageModel {
    pub id: i64,
    pub message: String,
    pub interval_minutes: i64,
    pub next_trigger_time: i64,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Reminder> for ReminderStorageModel {
    fn from(value: Reminder) -> Self {
        Self {
            id: value.id,
            message: value.message,
            interval_minutes: value.interval.minutes(),
            next_trigger_time: to_millis(value.next_trigger_time),
            active: value.active,
            created_at: to_millis(value.created_at),
            updated_at: to_millis(value.updated_at),
        }
    }
}

impl TryFrom<ReminderStorageModel> for Reminder {
    type Error = StorageError;

    fn try_from(value: ReminderStorageModel) -> Result<Self, Self::Error> {
        let id = value.id;
        let corrupted = |reason: String| StorageError::Corrupted { id, reason };

        let interval = ReminderInterval::new(value.interval_minutes)
            .map_err(|error| corrupted(error.to_string()))?;
        let timestamp = |millis: i64, column: &str| {
            from_millis(millis).ok_or_else(|| corrupted(format!("{column} = {millis} is out of range")))
        };

        Ok(Self {
            id,
            message: value.message,
            interval,
            next_trigger_time: timestamp(value.next_trigger_time, "next_trigger_time")?,
            active: value.active,
            created_at: timestamp(value.created_at, "created_at")?,
            updated_at: timestamp(value.updated_at, "updated_at")?,
        })
    }
}

pub fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
