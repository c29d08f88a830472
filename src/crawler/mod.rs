//! Crawler module for feed paging, downloading and run orchestration
//!
//! This module contains the core crawling logic, including:
//! - Feed pagination and candidate extraction
//! - Streamed image downloads with retry and cancellation
//! - Keyboard control of the run stage
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod keyboard;
mod pagination;

pub use coordinator::{run_crawl, Coordinator, CrawlContext, RunSummary};
pub use fetcher::{build_http_client, fetch_and_store, DownloadOutcome};
pub use keyboard::{handle_key, spawn_listener, ListenerHandle};
pub use pagination::{fetch_page, Candidate};
