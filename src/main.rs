use std::sync::Arc;

use anyhow::Context;
use povtor::{
    appsettings::{AppSettings, DeliveryKind, DeliverySettings, StorageKind, StorageSettings},
    scheduling::{LogDeliveryChannel, ReminderDeliveryChannel, ReminderEngine, ReminderService},
    storage::{InMemoryReminderStorage, ReminderStorage, SqliteReminderStorage},
    telegram_bot::TelegramDeliveryChannel,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = AppSettings::load().context("Could not load settings")?;
    log::info!("Starting reminder service");

    let storage = create_storage(&settings.storage).await?;
    let delivery_channel = create_delivery_channel(&settings.delivery)?;

    let service = ReminderService::new(Arc::clone(&storage));
    for request in &settings.reminders {
        match service.ensure_reminder(request.clone()).await {
            Ok(reminder) => log::info!(
                "Configured reminder is active. [reminder_id = {}, next_trigger_time = {}]",
                reminder.id,
                reminder.next_trigger_time
            ),
            Err(error) => log::error!(
                "Skipping configured reminder. [message = {:?}, error = {}]",
                request.message,
                error
            ),
        }
    }

    let engine = ReminderEngine::new(
        storage,
        delivery_channel,
        settings.scheduler.engine_config(),
    );
    let handle = engine.start();

    tokio::signal::ctrl_c()
        .await
        .context("Could not listen for shutdown signal")?;
    log::info!("Shutdown requested");

    handle.stop(settings.scheduler.shutdown_timeout()).await;
    Ok(())
}

async fn create_storage(settings: &StorageSettings) -> anyhow::Result<Arc<dyn ReminderStorage>> {
    match settings.kind {
        StorageKind::Memory => {
            log::warn!("Using in-memory storage, reminders are lost on shutdown");
            Ok(Arc::new(InMemoryReminderStorage::new()))
        }
        StorageKind::Sqlite => {
            let storage = SqliteReminderStorage::connect(&settings.database_url)
                .await
                .with_context(|| format!("Could not open database {}", settings.database_url))?;
            Ok(Arc::new(storage))
        }
    }
}

fn create_delivery_channel(
    settings: &DeliverySettings,
) -> anyhow::Result<Arc<dyn ReminderDeliveryChannel>> {
    match settings.kind {
        DeliveryKind::Log => Ok(Arc::new(LogDeliveryChannel)),
        DeliveryKind::Telegram => {
            let telegram = settings
                .telegram
                .clone()
                .context("Telegram delivery requires the delivery.telegram section")?;
            Ok(Arc::new(TelegramDeliveryChannel::create(
                telegram.token,
                telegram.chat_id,
            )))
        }
    }
}
