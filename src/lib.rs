pub mod config;
pub mod context;
pub mod handlers;
pub mod messages;
pub mod messenger;
pub mod model;
pub mod reminders;
pub mod scheduler;
pub mod sheets;
pub mod store;
