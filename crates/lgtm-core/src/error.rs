/// Errors that can occur while reviewing a pull request.
///
/// Each variant wraps a specific failure domain. Library crates return this
/// type directly; the binary renders it through `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use lgtm_core::LgtmError;
///
/// let err = LgtmError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LgtmError {
    /// The input is not a pull request URL.
    #[error("invalid pull request URL '{0}'")]
    #[diagnostic(
        code(lgtm::invalid_url),
        help("expected a URL like https://github.com/owner/repo/pull/123")
    )]
    InvalidUrl(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(lgtm::config))]
    Config(String),

    /// Fetching the diff from GitHub failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    /// The LLM provider call failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    /// No usable review could be recovered from the model output.
    #[error("malformed LLM response: {message}")]
    #[diagnostic(
        code(lgtm::malformed_response),
        help("the model did not return the requested JSON; try again or pick another model")
    )]
    MalformedResponse {
        /// What went wrong while recovering the structure.
        message: String,
        /// The JSON parse error from the first (strict) parse attempt.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(lgtm::io))]
    Io(#[from] std::io::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(lgtm::config::toml))]
    Toml(#[from] toml::de::Error),
}

impl LgtmError {
    /// Build a [`LgtmError::MalformedResponse`].
    pub fn malformed(message: impl Into<String>, source: Option<serde_json::Error>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
            source,
        }
    }
}

/// Failures of the GitHub diff fetch.
///
/// # Examples
///
/// ```
/// use lgtm_core::{FetchError, LgtmError};
///
/// let err: LgtmError = FetchError::NotFound("octo/repo#7".into()).into();
/// assert!(err.to_string().contains("octo/repo#7"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FetchError {
    /// The pull request does not exist or is not visible.
    #[error("pull request {0} not found")]
    #[diagnostic(
        code(lgtm::fetch::not_found),
        help("if this is a private repository, set GITHUB_TOKEN")
    )]
    NotFound(String),

    /// GitHub rejected the credentials (401/403).
    #[error("GitHub authentication failed: {0}")]
    #[diagnostic(
        code(lgtm::fetch::auth),
        help("check that GITHUB_TOKEN is valid and can read the repository")
    )]
    Auth(String),

    /// GitHub API rate limit exhausted.
    #[error("GitHub rate limit exceeded: {0}")]
    #[diagnostic(
        code(lgtm::fetch::rate_limit),
        help("unauthenticated requests have a low limit; set GITHUB_TOKEN")
    )]
    RateLimit(String),

    /// Any other network or HTTP failure.
    #[error("GitHub request failed: {0}")]
    #[diagnostic(code(lgtm::fetch::transport))]
    Transport(String),

    /// The request exceeded its deadline.
    #[error("GitHub request timed out after {0}s")]
    #[diagnostic(code(lgtm::fetch::timeout))]
    Timeout(u64),
}

/// Failures of the LLM completion call.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LlmError {
    /// No credential configured, or the provider rejected it.
    #[error("LLM authentication failed: {0}")]
    #[diagnostic(
        code(lgtm::llm::auth),
        help("set OPENROUTER_API_KEY or api_key under [llm] in .lgtm.toml")
    )]
    Auth(String),

    /// Non-2xx status, unreadable body, or unexpected payload.
    #[error("LLM request failed: {0}")]
    #[diagnostic(code(lgtm::llm::transport))]
    Transport(String),

    /// The request exceeded its deadline.
    #[error("LLM request timed out after {0}s")]
    #[diagnostic(code(lgtm::llm::timeout))]
    Timeout(u64),
}
