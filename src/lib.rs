pub mod appsettings;
pub mod reminder;
pub mod scheduling;
pub mod storage;
pub mod telegram_bot;
