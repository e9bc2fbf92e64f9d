use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    sync::{Mutex, MutexGuard, Semaphore},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    reminder::{Reminder, ReminderId, ScheduleError},
    storage::{ReminderStorage, StorageError},
};

use super::delivery::ReminderDeliveryChannel;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// What to do with a reminder whose notification could not be delivered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFailurePolicy {
    /// Move on to the next occurrence anyway. The missed occurrence is lost.
    #[default]
    Reschedule,
    /// Keep the reminder due so the next scan fires it again.
    Retry,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub scan_interval: Duration,
    pub max_concurrent_firings: usize,
    pub notification_failure_policy: NotificationFailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            max_concurrent_firings: 1,
            notification_failure_policy: NotificationFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FiringError {
    #[error("Notification was not delivered: {0:#}")]
    Notification(anyhow::Error),

    #[error(transparent)]
    Reschedule(#[from] ScheduleError),

    #[error(transparent)]
    Store(#[from] StorageError),

    #[error("Firing task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug)]
pub struct FiringFailure {
    pub reminder_id: ReminderId,
    pub error: FiringError,
}

/// Summary of a single scan cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub due: usize,
    pub fired: usize,
    pub rescheduled: usize,
    /// Firings whose reminder was deactivated or moved while the notification was sent.
    pub superseded: usize,
    pub failures: Vec<FiringFailure>,
}

impl CycleReport {
    fn record(&mut self, outcome: FiringOutcome) {
        let reminder_id = outcome.reminder_id;
        match outcome.notification {
            Ok(()) => self.fired += 1,
            Err(error) => self.failures.push(FiringFailure {
                reminder_id,
                error: FiringError::Notification(error),
            }),
        }

        match outcome.reschedule {
            RescheduleOutcome::Rescheduled => self.rescheduled += 1,
            RescheduleOutcome::Superseded => self.superseded += 1,
            RescheduleOutcome::Failed(error) => {
                self.failures.push(FiringFailure { reminder_id, error })
            }
            RescheduleOutcome::Skipped => {}
        }
    }

    pub fn failed_ids(&self) -> Vec<ReminderId> {
        let mut ids: Vec<ReminderId> = self.failures.iter().map(|f| f.reminder_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

struct FiringOutcome {
    reminder_id: ReminderId,
    notification: anyhow::Result<()>,
    reschedule: RescheduleOutcome,
}

enum RescheduleOutcome {
    /// Left due by the notification failure policy.
    Skipped,
    Rescheduled,
    /// The stored reminder no longer matches the fired snapshot, nothing was written.
    Superseded,
    Failed(FiringError),
}

/// Periodically fires due reminders and moves them to their next occurrence.
///
/// The engine keeps no reminder state between cycles, the store is the only source of
/// truth. Cycles never overlap.
pub struct ReminderEngine {
    storage: Arc<dyn ReminderStorage>,
    delivery_channel: Arc<dyn ReminderDeliveryChannel>,
    config: EngineConfig,
    scan_lock: Mutex<()>,
    firing_permits: Arc<Semaphore>,
}

impl ReminderEngine {
    pub fn new(
        storage: Arc<dyn ReminderStorage>,
        delivery_channel: Arc<dyn ReminderDeliveryChannel>,
        config: EngineConfig,
    ) -> Self {
        let firing_permits = Arc::new(Semaphore::new(config.max_concurrent_firings.max(1)));

        Self {
            storage,
            delivery_channel,
            config,
            scan_lock: Mutex::new(()),
            firing_permits,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one scan cycle as of `now`, waiting for a cycle already in progress to finish.
    ///
    /// Fails only when the due reminders cannot be queried. Per-reminder failures are
    /// collected in the report.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, StorageError> {
        let guard = self.scan_lock.lock().await;
        self.scan(&guard, now).await
    }

    pub fn start(self) -> EngineHandle {
        let engine = Arc::new(self);
        let cancellation_token = CancellationToken::new();
        let task_cancellation_token = cancellation_token.child_token();

        let task = tokio::spawn(Arc::clone(&engine).run(task_cancellation_token));

        EngineHandle {
            engine,
            task,
            shutdown: cancellation_token.drop_guard(),
        }
    }

    async fn run(self: Arc<Self>, cancellation_token: CancellationToken) {
        log::info!(
            "[ENGINE] Started. [scan_interval = {:?}, max_concurrent_firings = {}, notification_failure_policy = {:?}]",
            self.config.scan_interval,
            self.config.max_concurrent_firings,
            self.config.notification_failure_policy
        );

        let mut ticker = time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // A running cycle is never interrupted, cancellation is observed between ticks.
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    log::info!("[ENGINE] Shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }

    async fn tick(&self, now: DateTime<Utc>) {
        let Ok(guard) = self.scan_lock.try_lock() else {
            log::warn!("[SCAN] Previous cycle is still running, skipping tick. [now = {}]", now);
            return;
        };

        match self.scan(&guard, now).await {
            Ok(report) if report.due == 0 => {
                log::debug!("[SCAN] No due reminders. [now = {}]", now);
            }
            Ok(report) => {
                log::info!(
                    "[SCAN] Processed due reminders. [due = {}, fired = {}, rescheduled = {}, superseded = {}, failed = {:?}]",
                    report.due,
                    report.fired,
                    report.rescheduled,
                    report.superseded,
                    report.failed_ids()
                );
            }
            Err(error) => {
                log::error!(
                    "[SCAN] Could not query due reminders, retrying on next tick. error = {}",
                    error
                );
            }
        }
    }

    async fn scan(
        &self,
        _guard: &MutexGuard<'_, ()>,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, StorageError> {
        let due_reminders = self.storage.find_due_active(now).await?;
        let mut report = CycleReport {
            due: due_reminders.len(),
            ..Default::default()
        };

        let firings: Vec<(ReminderId, JoinHandle<FiringOutcome>)> = due_reminders
            .into_iter()
            .map(|reminder| (reminder.id, self.spawn_firing(reminder)))
            .collect();

        for (reminder_id, firing) in firings {
            match firing.await {
                Ok(outcome) => report.record(outcome),
                Err(error) => {
                    log::error!(
                        "Firing task failed. [reminder_id = {}, error = {}]",
                        reminder_id,
                        error
                    );
                    report.failures.push(FiringFailure {
                        reminder_id,
                        error: FiringError::Aborted(error.to_string()),
                    });
                }
            }
        }

        Ok(report)
    }

    fn spawn_firing(&self, reminder: Reminder) -> JoinHandle<FiringOutcome> {
        let storage = Arc::clone(&self.storage);
        let delivery_channel = Arc::clone(&self.delivery_channel);
        let permits = Arc::clone(&self.firing_permits);
        let policy = self.config.notification_failure_policy;

        tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            fire_reminder(reminder, storage.as_ref(), delivery_channel.as_ref(), policy).await
        })
    }
}

async fn fire_reminder(
    reminder: Reminder,
    storage: &dyn ReminderStorage,
    delivery_channel: &dyn ReminderDeliveryChannel,
    policy: NotificationFailurePolicy,
) -> FiringOutcome {
    let reminder_id = reminder.id;
    log::info!(
        "[FIRE] Firing reminder. [reminder_id = {}, next_trigger_time = {}]",
        reminder_id,
        reminder.next_trigger_time
    );

    let notification = delivery_channel.send_reminder_notification(&reminder).await;
    if let Err(error) = &notification {
        log::warn!(
            "[FIRE] Could not deliver notification. [reminder_id = {}, policy = {:?}, error = {:#}]",
            reminder_id,
            policy,
            error
        );
        if policy == NotificationFailurePolicy::Retry {
            return FiringOutcome {
                reminder_id,
                notification,
                reschedule: RescheduleOutcome::Skipped,
            };
        }
    }

    let reschedule = match reschedule_reminder(reminder, storage).await {
        Ok(Some(saved)) => {
            log::debug!(
                "[RESCHEDULE] Reminder rescheduled. [reminder_id = {}, next_trigger_time = {}]",
                reminder_id,
                saved.next_trigger_time
            );
            RescheduleOutcome::Rescheduled
        }
        Ok(None) => {
            log::info!(
                "[RESCHEDULE] Reminder changed while firing, leaving it as stored. [reminder_id = {}]",
                reminder_id
            );
            RescheduleOutcome::Superseded
        }
        Err(error) => {
            log::warn!(
                "[RESCHEDULE] Could not reschedule reminder, it stays due. [reminder_id = {}, error = {}]",
                reminder_id,
                error
            );
            RescheduleOutcome::Failed(error)
        }
    };

    FiringOutcome {
        reminder_id,
        notification,
        reschedule,
    }
}

async fn reschedule_reminder(
    reminder: Reminder,
    storage: &dyn ReminderStorage,
) -> Result<Option<Reminder>, FiringError> {
    let expected = reminder.next_trigger_time;
    let rescheduled = reminder.rescheduled()?;
    let saved = storage
        .reschedule(rescheduled.id, expected, rescheduled.next_trigger_time)
        .await?;

    Ok(saved)
}

/// Owns the running scan loop. Dropping the handle cancels the loop.
pub struct EngineHandle {
    engine: Arc<ReminderEngine>,
    task: JoinHandle<()>,
    shutdown: DropGuard,
}

impl EngineHandle {
    pub fn engine(&self) -> &Arc<ReminderEngine> {
        &self.engine
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the scan loop, letting an in-flight cycle finish its saves.
    pub async fn stop(self, timeout: Duration) {
        let EngineHandle { task, shutdown, .. } = self;
        drop(shutdown);

        match time::timeout(timeout, task).await {
            Ok(Ok(())) => log::info!("[ENGINE] Stopped"),
            Ok(Err(error)) => log::error!("[ENGINE] Scan task failed. error = {}", error),
            Err(_) => log::warn!(
                "[ENGINE] Scan task did not stop within {:?}, leaving it to finish",
                timeout
            ),
        }
    }
}
