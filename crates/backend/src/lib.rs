//! JSON-over-HTTPS client for the medsignal backend API.
//!
//! The backend authenticates with a short-lived bearer token obtained from
//! `POST /user/login`. Every request goes through a retry wrapper that
//! re-logs in on HTTP 401 (token expiry) and applies exponential backoff to
//! transient failures. Responses carrying a `data` field are unwrapped to
//! that field.
//!
//! # Example
//!
//! ```ignore
//! use medsignal_backend::{ApiClient, BackendConfig};
//!
//! let client = ApiClient::new(BackendConfig::new(
//!     "https://api.example.com",
//!     "operator@example.com",
//!     "secret",
//! ))?;
//! let credentials = client.get_s3_credentials("patient-17").await?;
//! ```

mod client;
mod config;
mod error;

pub use client::ApiClient;
pub use config::BackendConfig;
pub use error::BackendError;
