pub mod agent;
pub mod config;
pub mod persistence;
pub mod services;
pub mod tools;
pub mod types;

#[cfg(feature = "api")]
pub mod api;
