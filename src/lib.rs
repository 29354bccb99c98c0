pub mod config;
pub mod error;
pub mod executor;
pub mod json_repair;
pub mod message;
pub mod observability;
pub mod protocol;
pub mod stream;
pub mod util;
