use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::reminder::{Reminder, ReminderId};

use super::NewReminder;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Reminder does not exist [reminder_id = {0}]")]
    NotFound(ReminderId),

    #[error("Stored reminder is corrupted [reminder_id = {id}]: {reason}")]
    Corrupted { id: ReminderId, reason: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait ReminderStorage: Send + Sync {
    /// Active reminders with `next_trigger_time <= as_of`, in no particular order.
    async fn find_due_active(&self, as_of: DateTime<Utc>) -> Result<Vec<Reminder>, StorageError>;

    /// Persists the full state of an existing reminder and refreshes `updated_at`.
    /// An inactive reminder stays inactive.
    async fn save(&self, reminder: Reminder) -> Result<Reminder, StorageError>;

    /// Moves the next occurrence of an active reminder from `expected` to
    /// `next_trigger_time`. Returns `None` without writing when the reminder is missing,
    /// inactive, or no longer at `expected`.
    async fn reschedule(
        &self,
        id: ReminderId,
        expected: DateTime<Utc>,
        next_trigger_time: DateTime<Utc>,
    ) -> Result<Option<Reminder>, StorageError>;

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, StorageError>;
    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError>;
    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError>;
}

struct InMemoryReminderStore {
    last_id: ReminderId,
    storage: HashMap<ReminderId, Reminder>,
}

pub struct InMemoryReminderStorage {
    store: RwLock<InMemoryReminderStore>,
}

impl InMemoryReminderStorage {
    pub fn new() -> Self {
        InMemoryReminderStorage {
            store: RwLock::new(InMemoryReminderStore {
                last_id: 0,
                storage: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryReminderStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReminderStorage for InMemoryReminderStorage {
    async fn find_due_active(&self, as_of: DateTime<Utc>) -> Result<Vec<Reminder>, StorageError> {
        let store = self.store.read().await;
        Ok(store
            .storage
            .values()
            .filter(|reminder| reminder.active && reminder.next_trigger_time <= as_of)
            .cloned()
            .collect())
    }

    async fn save(&self, mut reminder: Reminder) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        match store.storage.get_mut(&reminder.id) {
            Some(stored) => {
                reminder.created_at = stored.created_at;
                reminder.active &= stored.active;
                reminder.updated_at = Utc::now();
                *stored = reminder.clone();
                Ok(reminder)
            }
            None => Err(StorageError::NotFound(reminder.id)),
        }
    }

    async fn reschedule(
        &self,
        id: ReminderId,
        expected: DateTime<Utc>,
        next_trigger_time: DateTime<Utc>,
    ) -> Result<Option<Reminder>, StorageError> {
        let mut store = self.store.write().await;
        match store.storage.get_mut(&id) {
            Some(stored) if stored.active && stored.next_trigger_time == expected => {
                stored.next_trigger_time = next_trigger_time;
                stored.updated_at = Utc::now();
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        store.last_id += 1;
        let id = store.last_id;
        let NewReminder {
            message,
            interval,
            next_trigger_time,
            created_at,
        } = reminder;
        let reminder = Reminder {
            id,
            message,
            interval,
            next_trigger_time,
            active: true,
            created_at,
            updated_at: created_at,
        };

        store.storage.insert(id, reminder.clone());

        log::debug!("Inserted reminder into memory store [reminder_id = {}]", id);
        Ok(reminder)
    }

    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        let store = self.store.read().await;
        Ok(store.storage.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError> {
        let store = self.store.read().await;
        let mut reminders: Vec<Reminder> = store.storage.values().cloned().collect();
        reminders.sort_by_key(|reminder| reminder.id);
        Ok(reminders)
    }
}
