//! Gallerycast - republish an image-gallery feed to a social account
//!
//! Polls a gallery feed, skips items already published, queues the rest and
//! posts them one batch at a time under the posting platform's rate limit.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod gallery;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod queue;
pub mod quota;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{GallerycastError, Result};
pub use format::StatusFormatter;
pub use service::GallerycastService;
pub use types::{GalleryItem, QueuedTask, QuotaState};
