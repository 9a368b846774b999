//! HTTP surface and scrape scheduler for the apiary aggregator.

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod telemetry;
