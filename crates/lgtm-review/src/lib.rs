//! Pull request review orchestration for lgtm.
//!
//! Provides the review pipeline: GitHub diff fetching, diff truncation,
//! prompt construction, the LLM client, and normalization of model output
//! into a validated [`lgtm_core::ReviewResponse`].

pub mod github;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod truncate;
