mod model;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{ReminderStorageModel, to_millis};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::reminder::{Reminder, ReminderId};

use super::{NewReminder, ReminderStorage, StorageError};

const CREATE_REMINDERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS reminders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message TEXT NOT NULL,
    interval_minutes INTEGER NOT NULL,
    next_trigger_time INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)";

const CREATE_DUE_INDEX: &str = "
CREATE INDEX IF NOT EXISTS reminders_due_idx ON reminders (active, next_trigger_time)";

pub struct SqliteReminderStorage {
    pool: SqlitePool,
}

impl SqliteReminderStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new().connect(database_url).await?;
        let storage = Self::new(pool);
        storage.init().await?;

        Ok(storage)
    }

    /// Creates the reminders table when it is missing.
    pub async fn init(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_REMINDERS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_DUE_INDEX).execute(&self.pool).await?;

        Ok(())
    }
}

fn into_reminders(rows: Vec<ReminderStorageModel>) -> Result<Vec<Reminder>, StorageError> {
    rows.into_iter().map(Reminder::try_from).collect()
}

#[async_trait]
impl ReminderStorage for SqliteReminderStorage {
    async fn find_due_active(&self, as_of: DateTime<Utc>) -> Result<Vec<Reminder>, StorageError> {
        let reminders = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE active = 1 AND next_trigger_time <= ?",
        )
        .bind(to_millis(as_of))
        .fetch_all(&self.pool)
        .await?;

        into_reminders(reminders)
    }

    async fn save(&self, reminder: Reminder) -> Result<Reminder, StorageError> {
        let id = reminder.id;
        let ReminderStorageModel {
            id: _,
            message,
            interval_minutes,
            next_trigger_time,
            active,
            created_at: _,
            updated_at: _,
        } = reminder.into();
        let updated_at = to_millis(Utc::now());

        let updated_reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "
UPDATE reminders
SET message = ?,
    interval_minutes = ?,
    next_trigger_time = ?,
    active = ? AND active,
    updated_at = ?
WHERE id = ?
RETURNING *
",
        )
        .bind(message)
        .bind(interval_minutes)
        .bind(next_trigger_time)
        .bind(active)
        .bind(updated_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound(id))?;

        updated_reminder.try_into()
    }

    async fn reschedule(
        &self,
        id: ReminderId,
        expected: DateTime<Utc>,
        next_trigger_time: DateTime<Utc>,
    ) -> Result<Option<Reminder>, StorageError> {
        let rescheduled_reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "
UPDATE reminders
SET next_trigger_time = ?,
    updated_at = ?
WHERE id = ? AND active = 1 AND next_trigger_time = ?
RETURNING *
",
        )
        .bind(to_millis(next_trigger_time))
        .bind(to_millis(Utc::now()))
        .bind(id)
        .bind(to_millis(expected))
        .fetch_optional(&self.pool)
        .await?;

        rescheduled_reminder.map(Reminder::try_from).transpose()
    }

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, StorageError> {
        let NewReminder {
            message,
            interval,
            next_trigger_time,
            created_at,
        } = reminder;
        let created_at = to_millis(created_at);

        let created_reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "INSERT INTO reminders (message, interval_minutes, next_trigger_time, active, created_at, updated_at)
VALUES (?, ?, ?, 1, ?, ?) RETURNING *",
        )
        .bind(message)
        .bind(interval.minutes())
        .bind(to_millis(next_trigger_time))
        .bind(created_at)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        log::debug!(
            "Inserted reminder into sqlite store [reminder_id = {}]",
            created_reminder.id
        );
        created_reminder.try_into()
    }

    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        let reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        reminder.map(Reminder::try_from).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError> {
        let reminders =
            sqlx::query_as::<_, ReminderStorageModel>("SELECT * FROM reminders ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        into_reminders(reminders)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::reminder::ReminderInterval;

    async fn storage() -> SqliteReminderStorage {
        // Every connection to `sqlite::memory:` opens its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = SqliteReminderStorage::new(pool);
        storage.init().await.unwrap();
        storage
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0).unwrap()
    }

    fn new_reminder(message: &str, next_trigger_time: DateTime<Utc>) -> NewReminder {
        NewReminder {
            message: message.to_owned(),
            interval: ReminderInterval::new(5).unwrap(),
            next_trigger_time,
            created_at: t0(),
        }
    }

    #[tokio::test]
    pub async fn inserted_reminder_can_be_read_back() {
        let storage = storage().await;

        let inserted = storage
            .insert(new_reminder("Stretch", t0() + TimeDelta::minutes(5)))
            .await
            .unwrap();

        assert!(inserted.active);
        assert_eq!(inserted.message, "Stretch");
        assert_eq!(inserted.interval.minutes(), 5);
        assert_eq!(inserted.next_trigger_time, t0() + TimeDelta::minutes(5));
        assert_eq!(inserted.created_at, t0());
        assert_eq!(inserted.updated_at, t0());
        assert_eq!(storage.get(inserted.id).await.unwrap(), Some(inserted));
    }

    #[tokio::test]
    pub async fn due_query_selects_only_active_reminders_at_or_before_time() {
        let storage = storage().await;
        let past = storage
            .insert(new_reminder("past", t0() - TimeDelta::minutes(1)))
            .await
            .unwrap();
        let exact = storage.insert(new_reminder("exact", t0())).await.unwrap();
        storage
            .insert(new_reminder("future", t0() + TimeDelta::milliseconds(1)))
            .await
            .unwrap();
        let mut inactive = storage
            .insert(new_reminder("inactive", t0() - TimeDelta::days(1)))
            .await
            .unwrap();
        inactive.active = false;
        storage.save(inactive).await.unwrap();

        let mut due: Vec<ReminderId> = storage
            .find_due_active(t0())
            .await
            .unwrap()
            .into_iter()
            .map(|reminder| reminder.id)
            .collect();
        due.sort();

        assert_eq!(due, vec![past.id, exact.id]);
    }

    #[tokio::test]
    pub async fn save_persists_schedule_and_refreshes_updated_at() {
        let storage = storage().await;
        let inserted = storage.insert(new_reminder("text", t0())).await.unwrap();

        let saved = storage.save(inserted.clone().rescheduled().unwrap()).await.unwrap();

        assert_eq!(saved.next_trigger_time, t0() + TimeDelta::minutes(5));
        assert_eq!(saved.created_at, inserted.created_at);
        assert!(saved.updated_at > inserted.updated_at);
        assert_eq!(storage.get_all().await.unwrap(), vec![saved]);
    }

    #[tokio::test]
    pub async fn save_does_not_reactivate_inactive_reminder() {
        let storage = storage().await;
        let stale = storage.insert(new_reminder("text", t0())).await.unwrap();
        let mut deactivated = stale.clone();
        deactivated.active = false;
        storage.save(deactivated).await.unwrap();

        let saved = storage.save(stale).await.unwrap();

        assert!(!saved.active);
        assert_eq!(storage.find_due_active(t0()).await.unwrap(), vec![]);
    }

    #[tokio::test]
    pub async fn reschedule_moves_only_current_active_reminders() {
        let storage = storage().await;
        let current = storage.insert(new_reminder("current", t0())).await.unwrap();
        let moved = storage.insert(new_reminder("moved", t0())).await.unwrap();
        let mut inactive = storage
            .insert(new_reminder("inactive", t0()))
            .await
            .unwrap();
        inactive.active = false;
        storage.save(inactive.clone()).await.unwrap();
        let next = t0() + TimeDelta::minutes(5);

        let rescheduled = storage.reschedule(current.id, t0(), next).await.unwrap();
        let stale = storage
            .reschedule(moved.id, t0() - TimeDelta::minutes(5), t0())
            .await
            .unwrap();
        let skipped = storage.reschedule(inactive.id, t0(), next).await.unwrap();

        let rescheduled = rescheduled.unwrap();
        assert_eq!(rescheduled.id, current.id);
        assert_eq!(rescheduled.next_trigger_time, next);
        assert!(rescheduled.active);
        assert_eq!(stale, None);
        assert_eq!(skipped, None);
        assert_eq!(
            storage.get(moved.id).await.unwrap().unwrap().next_trigger_time,
            t0()
        );
        let stored_inactive = storage.get(inactive.id).await.unwrap().unwrap();
        assert!(!stored_inactive.active);
        assert_eq!(stored_inactive.next_trigger_time, t0());
    }

    #[tokio::test]
    pub async fn save_of_unknown_reminder_fails() {
        let storage = storage().await;
        let mut reminder = storage.insert(new_reminder("text", t0())).await.unwrap();
        reminder.id += 100;

        let result = storage.save(reminder).await;

        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
