use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    reminder::{Reminder, ReminderId, ReminderInterval, ValidationError},
    storage::{NewReminder, ReminderStorage, StorageError},
};

/// Request to create a recurring reminder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateReminder {
    pub message: String,
    #[serde(alias = "intervalMinutes")]
    pub interval_minutes: i64,
}

impl CreateReminder {
    pub fn new(message: impl Into<String>, interval_minutes: i64) -> Self {
        Self {
            message: message.into(),
            interval_minutes,
        }
    }

    pub fn validate(&self) -> Result<ReminderInterval, ValidationError> {
        if self.message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }

        ReminderInterval::new(self.interval_minutes)
    }
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Reminder does not exist [reminder_id = {0}]")]
    NotFound(ReminderId),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ReminderError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(id) => ReminderError::NotFound(id),
            other => ReminderError::Storage(other),
        }
    }
}

/// Entry point for creating and managing reminders. Talks to the store only, so it
/// never waits on a running scan.
#[derive(Clone)]
pub struct ReminderService {
    storage: Arc<dyn ReminderStorage>,
}

impl ReminderService {
    pub fn new(storage: Arc<dyn ReminderStorage>) -> Self {
        Self { storage }
    }

    pub async fn create_reminder(&self, request: CreateReminder) -> Result<Reminder, ReminderError> {
        self.create_reminder_at(request, Utc::now()).await
    }

    /// Creates a reminder whose first firing is one full interval after `now`.
    pub async fn create_reminder_at(
        &self,
        request: CreateReminder,
        now: DateTime<Utc>,
    ) -> Result<Reminder, ReminderError> {
        let interval = request.validate()?;
        let next_trigger_time = interval
            .after(now)
            .ok_or(ValidationError::ScheduleOutOfRange)?;

        let reminder = self
            .storage
            .insert(NewReminder {
                message: request.message,
                interval,
                next_trigger_time,
                created_at: now,
            })
            .await?;

        log::info!(
            "Created reminder. [reminder_id = {}, interval = {}, next_trigger_time = {}]",
            reminder.id,
            reminder.interval,
            reminder.next_trigger_time
        );
        Ok(reminder)
    }

    /// Returns the active reminder with the same message and interval, creating it when
    /// there is none.
    pub async fn ensure_reminder(&self, request: CreateReminder) -> Result<Reminder, ReminderError> {
        let interval = request.validate()?;
        let existing = self.storage.get_all().await?.into_iter().find(|reminder| {
            reminder.active && reminder.interval == interval && reminder.message == request.message
        });

        match existing {
            Some(reminder) => {
                log::debug!("Reminder already exists [reminder_id = {}]", reminder.id);
                Ok(reminder)
            }
            None => self.create_reminder(request).await,
        }
    }

    /// Permanently removes the reminder from future scans.
    pub async fn deactivate_reminder(&self, id: ReminderId) -> Result<Reminder, ReminderError> {
        let mut reminder = self
            .storage
            .get(id)
            .await?
            .ok_or(ReminderError::NotFound(id))?;

        if !reminder.active {
            return Ok(reminder);
        }

        reminder.active = false;
        let reminder = self.storage.save(reminder).await?;

        log::info!("Deactivated reminder. [reminder_id = {}]", id);
        Ok(reminder)
    }

    pub async fn get_reminder(&self, id: ReminderId) -> Result<Option<Reminder>, ReminderError> {
        Ok(self.storage.get(id).await?)
    }

    pub async fn list_reminders(&self) -> Result<Vec<Reminder>, ReminderError> {
        Ok(self.storage.get_all().await?)
    }
}
