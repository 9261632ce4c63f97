pub mod models;
pub mod queries;

mod store;

pub use store::{PgJobQueue, PgScheduleStore};
