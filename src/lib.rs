// Library exports for integration tests and host shells

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod upload_queue;
pub mod url_tracker;
