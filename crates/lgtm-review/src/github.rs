use std::time::Duration;

use async_trait::async_trait;
use lgtm_core::{FetchError, GitHubConfig, LgtmError, PrReference};
use tracing::{debug, error, info};

/// Somewhere a pull request's unified diff can be read from.
///
/// [`GitHubClient`] is the production implementation; tests substitute fakes.
#[async_trait]
pub trait DiffSource: Send + Sync {
    /// Fetch the raw unified diff of `pr`.
    async fn fetch_diff(&self, pr: &PrReference) -> Result<String, LgtmError>;
}

/// GitHub REST client for fetching pull request diffs and posting comments.
///
/// A token is optional: without one, public repositories still work under the
/// unauthenticated rate limit.
///
/// # Examples
///
/// ```
/// use lgtm_core::GitHubConfig;
/// use lgtm_review::github::GitHubClient;
///
/// let client = GitHubClient::new(&GitHubConfig::default()).unwrap();
/// assert!(!client.is_authenticated());
/// ```
pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self, LgtmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("lgtm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Whether requests carry a token.
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// The configured token, ignoring a blank one.
    fn token(&self) -> Option<&str> {
        self.config.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Fetch the unified diff for a pull request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] for a missing or invisible PR,
    /// [`FetchError::Auth`] / [`FetchError::RateLimit`] when GitHub refuses,
    /// [`FetchError::Timeout`] when the deadline passes, and
    /// [`FetchError::Transport`] otherwise.
    pub async fn get_pr_diff(&self, pr: &PrReference) -> Result<String, LgtmError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.config.api_base.trim_end_matches('/'),
            pr.owner(),
            pr.repo(),
            pr.number()
        );
        let timeout = self.config.timeout_secs;

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github.v3.diff")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = self.token() {
            info!("using authenticated GitHub request");
            request = request.header("Authorization", format!("Bearer {token}"));
        } else {
            info!("using unauthenticated GitHub request (rate limits may apply)");
        }

        debug!(url = %url, "fetching diff");
        let response = request.send().await.map_err(|e| request_error(&e, timeout))?;

        let status = response.status();
        debug!(status = status.as_u16(), "GitHub API response");
        if !status.is_success() {
            let rate_limited = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0");
            let body = response.text().await.unwrap_or_default();
            error!(pr = %pr, status = status.as_u16(), "GitHub API error");
            return Err(classify_status(pr, status.as_u16(), rate_limited, &body).into());
        }

        let diff = response
            .text()
            .await
            .map_err(|e| request_error(&e, timeout))?;
        info!(pr = %pr, chars = diff.chars().count(), "fetched diff");
        Ok(diff)
    }

    /// Post `body` as a conversation comment on the pull request.
    ///
    /// Returns the comment's `html_url` (empty if GitHub omits it).
    ///
    /// # Errors
    ///
    /// Returns [`LgtmError::Config`] without a token, or
    /// [`FetchError::Transport`] on API errors.
    pub async fn post_comment(&self, pr: &PrReference, body: &str) -> Result<String, LgtmError> {
        let Some(token) = self.token() else {
            return Err(LgtmError::Config(
                "posting to GitHub requires GITHUB_TOKEN".into(),
            ));
        };

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(self.config.api_base.as_str())
            .map_err(|e| FetchError::Transport(format!("invalid GitHub API base: {e}")))?
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create GitHub client: {e}")))?;

        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            pr.owner(),
            pr.repo(),
            pr.number()
        );
        let payload = serde_json::json!({ "body": body });

        let response: serde_json::Value = octocrab
            .post(route, Some(&payload))
            .await
            .map_err(|e| FetchError::Transport(format!("failed to post comment: {e}")))?;

        let url = response
            .get("html_url")
            .and_then(|u| u.as_str())
            .unwrap_or_default()
            .to_string();
        info!(pr = %pr, url = %url, "posted review comment");
        Ok(url)
    }
}

#[async_trait]
impl DiffSource for GitHubClient {
    async fn fetch_diff(&self, pr: &PrReference) -> Result<String, LgtmError> {
        self.get_pr_diff(pr).await
    }
}

/// Parse a pull request URL of the form `http(s)://<host>/<owner>/<repo>/pull/<number>`.
///
/// Trailing path segments (`/files`), query strings, and fragments are
/// ignored. Nothing is extracted from a URL that does not match.
///
/// # Errors
///
/// Returns [`LgtmError::InvalidUrl`] if the URL does not match the pattern.
///
/// # Examples
///
/// ```
/// use lgtm_review::github::parse_pr_url;
///
/// let pr = parse_pr_url("https://github.com/octocat/hello-world/pull/42").unwrap();
/// assert_eq!(pr.owner(), "octocat");
/// assert_eq!(pr.repo(), "hello-world");
/// assert_eq!(pr.number(), 42);
///
/// assert!(parse_pr_url("https://github.com/octocat/hello-world").is_err());
/// ```
pub fn parse_pr_url(url: &str) -> Result<PrReference, LgtmError> {
    let trimmed = url.trim();
    let invalid = || LgtmError::InvalidUrl(trimmed.to_string());

    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(invalid)?;
    let path = rest.find(['?', '#']).map_or(rest, |end| &rest[..end]);

    let mut segments = path.split('/');
    let host = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let repo = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    if segments.next() != Some("pull") {
        return Err(invalid());
    }
    let number: u64 = segments
        .next()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)?;

    let pr = PrReference::new(owner, repo, number).map_err(|_| invalid())?;
    debug!(host, pr = %pr, "parsed pull request URL");
    Ok(pr)
}

fn request_error(e: &reqwest::Error, timeout_secs: u64) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout_secs)
    } else {
        FetchError::Transport(format!("failed to fetch PR diff: {e}"))
    }
}

fn classify_status(pr: &PrReference, status: u16, rate_limited: bool, body: &str) -> FetchError {
    match status {
        404 => FetchError::NotFound(pr.to_string()),
        429 => FetchError::RateLimit(format!("GitHub returned {status}")),
        403 if rate_limited => FetchError::RateLimit(format!("GitHub returned {status}")),
        401 | 403 => FetchError::Auth(format!("GitHub returned {status}: {body}")),
        _ => FetchError::Transport(format!("GitHub API error {status}: {body}")),
    }
}
