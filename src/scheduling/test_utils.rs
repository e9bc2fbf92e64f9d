use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    reminder::{Reminder, ReminderId},
    storage::{InMemoryReminderStorage, NewReminder, ReminderStorage, StorageError},
};

use super::delivery::ReminderDeliveryChannel;

pub type ReceivedReminders = Arc<Mutex<Vec<ReminderId>>>;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0).unwrap()
}

/// Records every reminder it is asked to deliver, optionally failing or panicking for
/// chosen ids and sleeping before each delivery.
#[derive(Clone, Default)]
pub struct TestDeliveryChannel {
    pub attempted: ReceivedReminders,
    pub delivered: ReceivedReminders,
    pub failing: Arc<Mutex<HashSet<ReminderId>>>,
    pub panicking: Arc<Mutex<HashSet<ReminderId>>>,
    pub delay: Option<Duration>,
}

impl TestDeliveryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_for(&self, id: ReminderId) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn panic_for(&self, id: ReminderId) {
        self.panicking.lock().unwrap().insert(id);
    }

    pub fn delivered(&self) -> Vec<ReminderId> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempted(&self) -> Vec<ReminderId> {
        self.attempted.lock().unwrap().clone()
    }

    pub fn delivered_count(&self, id: ReminderId) -> usize {
        self.delivered().iter().filter(|i| **i == id).count()
    }
}

#[async_trait]
impl ReminderDeliveryChannel for TestDeliveryChannel {
    async fn send_reminder_notification(&self, reminder: &Reminder) -> anyhow::Result<()> {
        self.attempted.lock().unwrap().push(reminder.id);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panicking.lock().unwrap().contains(&reminder.id) {
            panic!("delivery exploded for reminder {}", reminder.id);
        }
        if self.failing.lock().unwrap().contains(&reminder.id) {
            anyhow::bail!("delivery refused for reminder {}", reminder.id);
        }

        self.delivered.lock().unwrap().push(reminder.id);
        Ok(())
    }
}

/// In-memory store that can be told to fail writes for chosen ids or the due query.
#[derive(Default)]
pub struct FlakyReminderStorage {
    inner: InMemoryReminderStorage,
    failing_saves: Mutex<HashSet<ReminderId>>,
    failing_query: AtomicBool,
}

impl FlakyReminderStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves_for(&self, id: ReminderId) {
        self.failing_saves.lock().unwrap().insert(id);
    }

    pub fn heal_saves_for(&self, id: ReminderId) {
        self.failing_saves.lock().unwrap().remove(&id);
    }

    pub fn fail_queries(&self, failing: bool) {
        self.failing_query.store(failing, Ordering::Relaxed);
    }
}

fn unavailable() -> StorageError {
    StorageError::Sqlx(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl ReminderStorage for FlakyReminderStorage {
    async fn find_due_active(&self, as_of: DateTime<Utc>) -> Result<Vec<Reminder>, StorageError> {
        if self.failing_query.load(Ordering::Relaxed) {
            return Err(unavailable());
        }
        self.inner.find_due_active(as_of).await
    }

    async fn save(&self, reminder: Reminder) -> Result<Reminder, StorageError> {
        if self.failing_saves.lock().unwrap().contains(&reminder.id) {
            return Err(unavailable());
        }
        self.inner.save(reminder).await
    }

    async fn reschedule(
        &self,
        id: ReminderId,
        expected: DateTime<Utc>,
        next_trigger_time: DateTime<Utc>,
    ) -> Result<Option<Reminder>, StorageError> {
        if self.failing_saves.lock().unwrap().contains(&id) {
            return Err(unavailable());
        }
        self.inner.reschedule(id, expected, next_trigger_time).await
    }

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, StorageError> {
        self.inner.insert(reminder).await
    }

    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        self.inner.get(id).await
    }

    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError> {
        self.inner.get_all().await
    }
}
