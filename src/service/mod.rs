pub mod calendar_source;
pub mod meeting_format;
pub mod notification_sink;
pub mod settings_store;
