//! # Webcam Harvester
//!
//! Periodic snapshot harvester for public webcams. One run reads the camera
//! index page, fetches the current frame of every selected camera
//! concurrently, verifies it is a well-formed image and keeps it only when it
//! differs from the newest frame already stored for that camera.
//!
//! Stored frames can later be turned into a timelapse.
//!
//! ## Pipeline
//!
//! | Stage | Module | Failure |
//! |-------|--------|---------|
//! | Index fetch and parse | `index_parser`, `harvest_service` | fatal |
//! | Selection | `selection` | never (unknown names are warned) |
//! | Fetch | `fetcher` | per camera |
//! | Verification | `integrity` | per camera |
//! | Deduplication and storage | `store` | per camera |
//!
//! A failing camera never affects the others; every camera ends in exactly
//! one of Downloaded, Skipped or Failed.
//!
//! ## Storage layout
//!
//! ```text
//! {output}/
//!   .harvest.lock
//!   000.North Pier/
//!     20240101120000.jpg
//!     20240101121000.jpg
//!   001.South Pier/
//!     ...
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webcam_harvester::{Config, FetchCoordinator, HarvestService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let pool_size = config.pool_size;
//!     let service = Arc::new(HarvestService::new(config, "frames")?);
//!
//!     let catalog = service.fetch_catalog().await?;
//!     let tasks = service.plan_tasks(&catalog);
//!     let summary = FetchCoordinator::new(service, pool_size).run(tasks).await;
//!     println!("{} new frames", summary.downloaded);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! webcam-harvester harvest --output frames/ --only "North Pier" 4
//! webcam-harvester timelapse --frames "frames/000.North Pier" --manifest pier.txt
//! ffmpeg -f concat -safe 0 -i pier.txt pier.mp4
//! ```

/// Configuration and settings for a harvest run
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Camera catalog and fetch tasks
pub mod catalog;

/// Index page parsing
pub mod index_parser;

/// Include/exclude camera selection
pub mod selection;

/// HTTP frame fetching
pub mod fetcher;

/// Image verification
pub mod integrity;

/// Per-camera storage with duplicate suppression
pub mod store;

/// Main harvest service orchestrating the per-camera pipeline
pub mod harvest_service;

/// Worker pool for concurrent camera tasks
pub mod worker;

/// Single-instance lock over an output directory
pub mod instance_lock;

/// Timelapse manifests from stored frames
pub mod timelapse;

/// Command-line interface implementation
pub mod cli;

/// Prometheus metrics
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use catalog::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use fetcher::*;
pub use harvest_service::*;
pub use index_parser::*;
pub use instance_lock::*;
pub use integrity::*;
pub use self::metrics::*;
pub use selection::*;
pub use store::*;
pub use timelapse::*;
pub use utils::*;
pub use worker::*;
