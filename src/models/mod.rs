pub mod config;
pub mod error;
pub mod rule;
pub mod server;
