pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod notify;
pub mod registry;
pub mod source;
pub mod state;
pub mod watcher;
