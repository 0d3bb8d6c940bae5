pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod progress;
