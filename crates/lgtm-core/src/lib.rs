//! Core types, configuration, and error handling for lgtm.
//!
//! This crate provides the shared foundation used by the review crate and the CLI:
//! - [`LgtmError`]: unified error type using `thiserror`
//! - [`LgtmConfig`]: configuration loaded from `.lgtm.toml`
//! - Shared types: [`ReviewDecision`], [`FileComment`], [`ReviewResponse`],
//!   [`PrReference`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{ConfigStatus, GitHubConfig, LgtmConfig, LlmConfig, ReviewConfig};
pub use error::{FetchError, LgtmError, LlmError};
pub use types::{FileComment, OutputFormat, PrReference, ReviewDecision, ReviewResponse};

/// A convenience `Result` type for lgtm operations.
pub type Result<T> = std::result::Result<T, LgtmError>;
