mod delivery;
mod engine;
mod service;
#[cfg(test)]
pub(crate) mod test_utils;

pub use delivery::{LogDeliveryChannel, ReminderDeliveryChannel};
pub use engine::{
    CycleReport, DEFAULT_SCAN_INTERVAL, EngineConfig, EngineHandle, FiringError, FiringFailure,
    NotificationFailurePolicy, ReminderEngine,
};
pub use service::{CreateReminder, ReminderError, ReminderService};
