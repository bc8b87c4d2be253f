use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LgtmError;

/// Final verdict of a review.
///
/// Serializes as `"APPROVE"` / `"REQUEST_CHANGES"`. [`FromStr`] is the strict
/// path (case-insensitive, rejects anything else); [`ReviewDecision::parse_or_default`]
/// is the lenient path used on model output and never approves on ambiguity.
///
/// # Examples
///
/// ```
/// use lgtm_core::ReviewDecision;
///
/// let d: ReviewDecision = "approve".parse().unwrap();
/// assert_eq!(d, ReviewDecision::Approve);
/// assert_eq!(ReviewDecision::parse_or_default("LGTM"), ReviewDecision::RequestChanges);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    /// The change can be merged.
    Approve,
    /// The change needs more work.
    RequestChanges,
}

impl ReviewDecision {
    /// Parse a decision, falling back to [`ReviewDecision::RequestChanges`] on
    /// anything unrecognized.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|_| {
            tracing::warn!(decision = raw, "invalid decision, defaulting to REQUEST_CHANGES");
            ReviewDecision::RequestChanges
        })
    }

    /// The wire spelling of the decision.
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewDecision::Approve => "APPROVE",
            ReviewDecision::RequestChanges => "REQUEST_CHANGES",
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "APPROVE" => Ok(ReviewDecision::Approve),
            "REQUEST_CHANGES" => Ok(ReviewDecision::RequestChanges),
            other => Err(format!("unknown review decision: {other}")),
        }
    }
}

/// A single file-level finding.
///
/// The constructor enforces the invariants: `file` is never empty (falls back
/// to `"unknown"`) and `line` is clamped to at least 1.
///
/// # Examples
///
/// ```
/// use lgtm_core::FileComment;
///
/// let c = FileComment::new("src/lib.rs", -5, "off by one", "use <=");
/// assert_eq!(c.line(), 1);
/// assert_eq!(c.file(), "src/lib.rs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileComment {
    file: String,
    line: u32,
    issue: String,
    suggestion: String,
}

impl FileComment {
    /// Placeholder path used when the model omits the file.
    pub const UNKNOWN_FILE: &'static str = "unknown";

    /// Create a comment, normalizing `file` and `line`.
    pub fn new(
        file: impl Into<String>,
        line: i64,
        issue: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        let file = file.into();
        let file = if file.trim().is_empty() {
            Self::UNKNOWN_FILE.to_string()
        } else {
            file
        };
        let line = u32::try_from(line.max(1)).unwrap_or(u32::MAX);
        Self {
            file,
            line,
            issue: issue.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Path of the file being commented on.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// 1-based line number.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Description of the problem.
    pub fn issue(&self) -> &str {
        &self.issue
    }

    /// Suggested fix.
    pub fn suggestion(&self) -> &str {
        &self.suggestion
    }
}

/// A complete, validated review.
///
/// Comments keep the order the model produced them in, duplicates included.
///
/// # Examples
///
/// ```
/// use lgtm_core::{ReviewDecision, ReviewResponse};
///
/// let review = ReviewResponse::new("looks fine", vec![], ReviewDecision::Approve);
/// let json = serde_json::to_value(&review).unwrap();
/// assert_eq!(json["decision"], "APPROVE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewResponse {
    summary: String,
    comments: Vec<FileComment>,
    decision: ReviewDecision,
}

impl ReviewResponse {
    /// Summary used when a pull request has nothing to review.
    pub const NO_CHANGES_SUMMARY: &'static str =
        "This PR appears to have no changes or an empty diff.";

    /// Assemble a review from already-validated parts.
    pub fn new(
        summary: impl Into<String>,
        comments: Vec<FileComment>,
        decision: ReviewDecision,
    ) -> Self {
        Self {
            summary: summary.into(),
            comments,
            decision,
        }
    }

    /// The canned approval for an empty diff.
    ///
    /// ```
    /// use lgtm_core::{ReviewDecision, ReviewResponse};
    ///
    /// let r = ReviewResponse::no_changes();
    /// assert!(r.summary().contains("no changes"));
    /// assert_eq!(r.decision(), ReviewDecision::Approve);
    /// ```
    pub fn no_changes() -> Self {
        Self::new(Self::NO_CHANGES_SUMMARY, Vec::new(), ReviewDecision::Approve)
    }

    /// High-level summary of the review.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// File-level comments in model output order.
    pub fn comments(&self) -> &[FileComment] {
        &self.comments
    }

    /// The verdict.
    pub fn decision(&self) -> ReviewDecision {
        self.decision
    }
}

/// A pull request identified by owner, repository, and number.
///
/// # Examples
///
/// ```
/// use lgtm_core::PrReference;
///
/// let pr = PrReference::new("octocat", "hello-world", 42).unwrap();
/// assert_eq!(pr.to_string(), "octocat/hello-world#42");
/// assert!(PrReference::new("octocat", "hello-world", 0).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrReference {
    owner: String,
    repo: String,
    number: u64,
}

impl PrReference {
    /// Create a reference; owner and repo must be non-empty and the number positive.
    ///
    /// # Errors
    ///
    /// Returns [`LgtmError::InvalidUrl`] when a component is missing.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        number: u64,
    ) -> Result<Self, LgtmError> {
        let owner = owner.into();
        let repo = repo.into();
        if owner.is_empty() || repo.is_empty() || number == 0 {
            return Err(LgtmError::InvalidUrl(format!("{owner}/{repo}#{number}")));
        }
        Ok(Self {
            owner,
            repo,
            number,
        })
    }

    /// Repository owner (user or organization).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Pull request number.
    pub fn number(&self) -> u64 {
        self.number
    }
}

impl fmt::Display for PrReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use lgtm_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown, suitable for a PR comment.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
