//! Shared types and utilities for medsignal crates.
//!
//! This crate provides common functionality used across all medsignal crates:
//! - Upload-id generation and parsing
//! - Object-key path helpers
//! - Host-facing file probes
//! - Shared constants

pub mod constants;
pub mod fsutil;
pub mod ids;
pub mod keys;

// Re-export commonly used items at crate root
pub use constants::*;
pub use fsutil::{file_exists, file_size};
pub use ids::{group_prefix, make_upload_id, new_upload_id, next_upload_timestamp, split_upload_id};
pub use keys::{extract_file_name, extract_upload_data_name, parent_directory_key};
