pub mod auth;
pub mod binder;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fake_api;
pub mod http_client;
pub mod logging;
pub mod models;
pub mod persist;
pub mod provider;
pub mod state;
pub mod store;
pub mod transport;
pub mod upload;
