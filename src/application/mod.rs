//! Application layer - event hub and reporting

pub mod feed_hub;
pub mod report;

pub use feed_hub::{FeedHub, FeedState, HubCounters};
pub use report::FeedReport;
