pub mod meeting_loop;
pub mod notification_state;
pub mod task_runner;
