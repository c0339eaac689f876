pub mod apify;
pub mod common;
pub mod config;
pub mod fetcher;
pub mod hunter_api;
pub mod identity;
pub mod logging;
pub mod merge;
pub mod params;
pub mod pipeline;
pub mod progress;
pub mod recorder;
pub mod scoring;
pub mod sources;
pub mod storage;

pub use common::error::{HarvestError, Result};
