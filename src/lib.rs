//! Air quality aggregation and alerting over per-location sensor readings

pub mod cli;
pub mod config;
pub mod services;
pub mod sources;
pub mod types;
