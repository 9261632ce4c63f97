pub mod jobs;
pub mod messages;
pub mod schedules;
