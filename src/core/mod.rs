pub mod config;
pub mod correlate;
pub mod error;
pub mod github;
pub mod store;
pub mod terminal;
pub mod users;
pub mod workflows;
