use std::time::Duration;

use config::{
    Config, ConfigError, Environment, File,
    builder::{ConfigBuilder, DefaultState},
};
use serde::Deserialize;

use crate::scheduling::{CreateReminder, EngineConfig, NotificationFailurePolicy};

#[derive(Deserialize, Debug, Clone)]
pub struct SchedulerSettings {
    pub scan_interval_secs: u64,
    pub max_concurrent_firings: usize,
    pub notification_failure_policy: NotificationFailurePolicy,
    pub shutdown_timeout_secs: u64,
}

impl SchedulerSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            max_concurrent_firings: self.max_concurrent_firings,
            notification_failure_policy: self.notification_failure_policy,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Sqlite,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageSettings {
    pub kind: StorageKind,
    pub database_url: String,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    Log,
    Telegram,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TelegramSettings {
    pub token: String,
    pub chat_id: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DeliverySettings {
    pub kind: DeliveryKind,
    pub telegram: Option<TelegramSettings>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    pub scheduler: SchedulerSettings,
    pub storage: StorageSettings,
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub reminders: Vec<CreateReminder>,
}

impl AppSettings {
    /// Defaults, then `appsettings.*`, then `appsettings.local.*`, then `APP_*` variables
    /// (`APP_SCHEDULER__SCAN_INTERVAL_SECS=30`).
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name("appsettings").required(false))
            .add_source(File::with_name("appsettings.local").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::build(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("scheduler.scan_interval_secs", 60)?
            .set_default("scheduler.max_concurrent_firings", 1)?
            .set_default("scheduler.notification_failure_policy", "reschedule")?
            .set_default("scheduler.shutdown_timeout_secs", 10)?
            .set_default("storage.kind", "sqlite")?
            .set_default("storage.database_url", "sqlite://povtor.db?mode=rwc")?
            .set_default("delivery.kind", "log")
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.scan_interval_secs == 0 {
            return Err(ConfigError::Message(
                "scheduler.scan_interval_secs must be positive".to_owned(),
            ));
        }
        if self.scheduler.max_concurrent_firings == 0 {
            return Err(ConfigError::Message(
                "scheduler.max_concurrent_firings must be positive".to_owned(),
            ));
        }
        if self.delivery.kind == DeliveryKind::Telegram && self.delivery.telegram.is_none() {
            return Err(ConfigError::Message(
                "delivery.telegram section is required for telegram delivery".to_owned(),
            ));
        }

        Ok(())
    }
}
