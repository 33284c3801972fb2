//! Competitor hotel price acquisition: resilient fetching, price extraction,
//! per-platform adapters, season sweeps and scheduled checks.

pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod price_tracker;
pub mod scheduler;
pub mod scrapers;
pub mod traits;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use database::{Database, ObservationSink};
pub use price_tracker::PriceTracker;
pub use scheduler::Scheduler;
