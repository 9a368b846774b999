//! Scrape pipeline: fan out over configured services, pull their versioned
//! OpenAPI documents, and hand unseen revisions to storage.

pub mod metrics;
mod scraper;

pub use metrics::Metrics;
pub use scraper::{RunError, ScrapeError, Scraper, Service};
