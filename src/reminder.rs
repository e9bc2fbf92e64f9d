use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

pub type ReminderId = i64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Reminder message must not be empty")]
    EmptyMessage,

    #[error("Reminder interval must be positive, got {0} minutes")]
    NonPositiveInterval(i64),

    #[error("Reminder interval is too large, got {0} minutes")]
    IntervalTooLarge(i64),

    #[error("First trigger time is out of the representable range")]
    ScheduleOutOfRange,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Next trigger time is out of the representable range [reminder_id = {id}]")]
    OutOfRange { id: ReminderId },
}

/// Period between two firings of a reminder, in whole minutes. Always positive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReminderInterval(u32);

impl ReminderInterval {
    pub const MAX_MINUTES: i64 = i32::MAX as i64;

    pub fn new(minutes: i64) -> Result<Self, ValidationError> {
        if minutes <= 0 {
            return Err(ValidationError::NonPositiveInterval(minutes));
        }
        if minutes > Self::MAX_MINUTES {
            return Err(ValidationError::IntervalTooLarge(minutes));
        }

        Ok(Self(minutes as u32))
    }

    pub fn minutes(&self) -> i64 {
        self.0 as i64
    }

    pub fn as_delta(&self) -> TimeDelta {
        TimeDelta::minutes(self.minutes())
    }

    /// Moment one interval after `from`, `None` if it cannot be represented.
    pub fn after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        from.checked_add_signed(self.as_delta())
    }
}

impl std::fmt::Display for ReminderInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReminderStatus {
    Pending,
    Due,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: ReminderId,
    pub message: String,
    pub interval: ReminderInterval,
    pub next_trigger_time: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    pub fn status(&self, now: DateTime<Utc>) -> ReminderStatus {
        if !self.active {
            ReminderStatus::Inactive
        } else if self.next_trigger_time <= now {
            ReminderStatus::Due
        } else {
            ReminderStatus::Pending
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == ReminderStatus::Due
    }

    /// Advances the next trigger time by exactly one interval.
    ///
    /// A reminder that missed several intervals stays due after this and catches up
    /// one interval per scan.
    pub fn rescheduled(mut self) -> Result<Self, ScheduleError> {
        self.next_trigger_time = self
            .interval
            .after(self.next_trigger_time)
            .ok_or(ScheduleError::OutOfRange { id: self.id })?;

        Ok(self)
    }
}
