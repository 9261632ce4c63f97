pub mod config;
pub mod error;
pub mod ports;
pub mod retry;
pub mod types;
