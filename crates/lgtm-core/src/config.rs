use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LgtmError;

/// Top-level configuration loaded from `.lgtm.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use lgtm_core::LgtmConfig;
///
/// let config = LgtmConfig::default();
/// assert_eq!(config.review.max_diff_chars, 10_000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LgtmConfig {
    /// GitHub API settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
}

impl LgtmConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LgtmError::Io`] if the file cannot be read, or
    /// [`LgtmError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lgtm_core::LgtmConfig;
    /// use std::path::Path;
    ///
    /// let config = LgtmConfig::from_file(Path::new(".lgtm.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, LgtmError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Blank credentials (`token = ""`) are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`LgtmError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use lgtm_core::LgtmConfig;
    ///
    /// let toml = r#"
    /// [llm]
    /// model = "openai/gpt-4o-mini"
    /// "#;
    /// let config = LgtmConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.llm.model, "openai/gpt-4o-mini");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, LgtmError> {
        let mut config: Self = toml::from_str(content)?;
        drop_blank(&mut config.github.token);
        drop_blank(&mut config.llm.api_key);
        Ok(config)
    }

    /// Overlay credentials and model from environment variables.
    ///
    /// Reads `GITHUB_TOKEN` (falling back to `GH_TOKEN`), `OPENROUTER_API_KEY`,
    /// and `LLM_MODEL` through `lookup`. Empty values are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use lgtm_core::LgtmConfig;
    ///
    /// let mut config = LgtmConfig::default();
    /// config.apply_env(|key| (key == "LLM_MODEL").then(|| "meta/llama".to_string()));
    /// assert_eq!(config.llm.model, "meta/llama");
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("GITHUB_TOKEN").or_else(|| get("GH_TOKEN")) {
            tracing::debug!("GitHub token taken from environment");
            self.github.token = Some(token);
        }
        if let Some(key) = get("OPENROUTER_API_KEY") {
            tracing::debug!("LLM API key taken from environment");
            self.llm.api_key = Some(key);
        }
        if let Some(model) = get("LLM_MODEL") {
            tracing::debug!(model = %model, "LLM model taken from environment");
            self.llm.model = model;
        }
    }

    /// Reject values that would make a review impossible.
    ///
    /// # Errors
    ///
    /// Returns [`LgtmError::Config`] naming the offending key.
    pub fn validate(&self) -> Result<(), LgtmError> {
        if self.review.max_diff_chars == 0 {
            return Err(LgtmError::Config(
                "review.max_diff_chars must be greater than zero".into(),
            ));
        }
        if self.github.timeout_secs == 0 {
            return Err(LgtmError::Config(
                "github.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(LgtmError::Config(
                "llm.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(LgtmError::Config("llm.model must not be empty".into()));
        }
        Ok(())
    }

    /// Summarize which credentials are present, without exposing them.
    ///
    /// # Examples
    ///
    /// ```
    /// use lgtm_core::LgtmConfig;
    ///
    /// let status = LgtmConfig::default().status();
    /// assert!(!status.github_configured);
    /// assert_eq!(status.llm_model, "anthropic/claude-3-haiku");
    /// ```
    pub fn status(&self) -> ConfigStatus {
        ConfigStatus {
            github_configured: self.github.token.is_some(),
            llm_configured: self.llm.api_key.is_some(),
            llm_model: self.llm.model.clone(),
        }
    }
}

/// A credential that is empty or whitespace counts as unset.
fn drop_blank(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

/// Credential presence report, as returned by `lgtm status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigStatus {
    /// A GitHub token is set.
    pub github_configured: bool,
    /// An LLM API key is set.
    pub llm_configured: bool,
    /// The model reviews will use.
    pub llm_model: String,
}

/// GitHub API configuration.
///
/// # Examples
///
/// ```
/// use lgtm_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert_eq!(config.api_base, "https://api.github.com");
/// assert_eq!(config.timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token. Optional: unauthenticated requests work for
    /// public repositories under a lower rate limit.
    pub token: Option<String>,
    /// REST API root, override for GitHub Enterprise.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Request timeout for the diff fetch (default: 30).
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}

fn default_github_timeout() -> u64 {
    30
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            timeout_secs: default_github_timeout(),
        }
    }
}

/// LLM provider configuration.
///
/// Any OpenAI-compatible chat completions endpoint works; the defaults target
/// OpenRouter.
///
/// # Examples
///
/// ```
/// use lgtm_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "anthropic/claude-3-haiku");
/// assert_eq!(config.timeout_secs, 90);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Base URL; `/v1/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout for the completion call (default: 90).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Sampling temperature (default: 0.2).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens in the completion (default: 2000).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sent as `HTTP-Referer` for provider attribution.
    #[serde(default = "default_referer")]
    pub referer: String,
    /// Sent as `X-Title` for provider attribution.
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_model() -> String {
    "anthropic/claude-3-haiku".into()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api".into()
}

fn default_llm_timeout() -> u64 {
    90
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_referer() -> String {
    "https://github.com/lgtm-review/lgtm".into()
}

fn default_title() -> String {
    "lgtm".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: default_base_url(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            referer: default_referer(),
            title: default_title(),
        }
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use lgtm_core::ReviewConfig;
///
/// assert_eq!(ReviewConfig::default().max_diff_chars, 10_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Diffs longer than this many characters are truncated before the LLM
    /// call (default: 10000).
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,
}

fn default_max_diff_chars() -> usize {
    10_000
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_diff_chars: default_max_diff_chars(),
        }
    }
}
