use std::fmt;

use chrono::{DateTime, Utc};
use lgtm_core::{LgtmError, PrReference, ReviewDecision, ReviewResponse};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::github::{self, DiffSource};
use crate::llm::CompletionModel;
use crate::normalize;
use crate::prompt;
use crate::truncate::{self, DEFAULT_MAX_DIFF_CHARS};

/// A step of the review pipeline.
///
/// Steps run strictly in declaration order; an empty diff jumps from
/// `CheckingEmpty` straight to `Done`, and any error ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStage {
    /// Extracting owner, repo, and number from the URL.
    ParsingUrl,
    /// Downloading the unified diff.
    FetchingDiff,
    /// Deciding whether there is anything to review.
    CheckingEmpty,
    /// Bounding the diff size.
    Truncating,
    /// Waiting on the LLM.
    CallingModel,
    /// Turning the model text into a review.
    Normalizing,
    /// Finished with a review.
    Done,
    /// Finished with an error.
    Failed,
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReviewStage::ParsingUrl => "parsing URL",
            ReviewStage::FetchingDiff => "fetching diff",
            ReviewStage::CheckingEmpty => "checking diff",
            ReviewStage::Truncating => "truncating diff",
            ReviewStage::CallingModel => "waiting for model",
            ReviewStage::Normalizing => "parsing review",
            ReviewStage::Done => "done",
            ReviewStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Result of a completed review, with the context it was produced in.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    /// The pull request that was reviewed.
    pub pr: PrReference,
    /// The validated review.
    #[serde(flatten)]
    pub review: ReviewResponse,
    /// Statistics about the review run.
    pub stats: ReviewStats,
    /// When the review finished.
    pub reviewed_at: DateTime<Utc>,
    /// Whether the review was posted back to the PR.
    pub github_comment_posted: bool,
    /// URL of the posted comment, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_comment_url: Option<String>,
}

/// Statistics about a review run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewStats {
    /// Characters in the diff as fetched.
    pub diff_chars: usize,
    /// Whether the diff was cut before the model saw it.
    pub diff_truncated: bool,
    /// Model that produced the review; `None` when no call was needed.
    pub model_used: Option<String>,
}

type StageObserver = Box<dyn Fn(ReviewStage) + Send + Sync>;

/// Review orchestrator: URL → diff → truncation → model → normalized review.
///
/// Holds no per-request state, so one pipeline can serve concurrent reviews.
pub struct ReviewPipeline<D, M> {
    diffs: D,
    model: M,
    max_diff_chars: usize,
    observer: Option<StageObserver>,
}

impl<D: DiffSource, M: CompletionModel> ReviewPipeline<D, M> {
    /// Create a pipeline from its two collaborators, with the default diff limit.
    pub fn new(diffs: D, model: M) -> Self {
        Self {
            diffs,
            model,
            max_diff_chars: DEFAULT_MAX_DIFF_CHARS,
            observer: None,
        }
    }

    /// Override the diff character limit.
    pub fn with_max_diff_chars(mut self, limit: usize) -> Self {
        self.max_diff_chars = limit;
        self
    }

    /// Register a callback invoked on every stage transition.
    pub fn with_observer(mut self, observer: impl Fn(ReviewStage) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// The diff source collaborator.
    pub fn diff_source(&self) -> &D {
        &self.diffs
    }

    /// Review the pull request at `pr_url`.
    ///
    /// # Errors
    ///
    /// Returns [`LgtmError::InvalidUrl`], [`LgtmError::Fetch`],
    /// [`LgtmError::Llm`], or [`LgtmError::MalformedResponse`] from the step
    /// that failed, unchanged.
    pub async fn review(&self, pr_url: &str) -> Result<ReviewResponse, LgtmError> {
        self.review_report(pr_url).await.map(|report| report.review)
    }

    /// Run the same pipeline as [`ReviewPipeline::review`], returning the
    /// review together with its PR reference and run statistics.
    ///
    /// # Errors
    ///
    /// See [`ReviewPipeline::review`].
    pub async fn review_report(&self, pr_url: &str) -> Result<ReviewReport, LgtmError> {
        info!(url = pr_url, "starting review");
        let mut stage = ReviewStage::ParsingUrl;
        match self.run(pr_url, &mut stage).await {
            Ok(report) => {
                self.enter(ReviewStage::Done);
                info!(
                    pr = %report.pr,
                    decision = %report.review.decision(),
                    comments = report.review.comments().len(),
                    "review completed"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "review failed");
                self.enter(ReviewStage::Failed);
                Err(e)
            }
        }
    }

    async fn run(&self, pr_url: &str, stage: &mut ReviewStage) -> Result<ReviewReport, LgtmError> {
        self.advance(stage, ReviewStage::ParsingUrl);
        let pr = github::parse_pr_url(pr_url)?;

        self.advance(stage, ReviewStage::FetchingDiff);
        let diff = self.diffs.fetch_diff(&pr).await?;
        let diff_chars = diff.chars().count();

        self.advance(stage, ReviewStage::CheckingEmpty);
        if diff.trim().is_empty() {
            warn!(pr = %pr, "fetched diff is empty");
            return Ok(ReviewReport::new(
                pr,
                ReviewResponse::no_changes(),
                ReviewStats {
                    diff_chars,
                    diff_truncated: false,
                    model_used: None,
                },
            ));
        }

        self.advance(stage, ReviewStage::Truncating);
        let bounded = truncate::truncate_diff(&diff, self.max_diff_chars);
        let diff_truncated = bounded != diff;

        self.advance(stage, ReviewStage::CallingModel);
        let system = prompt::build_system_prompt();
        let user = prompt::build_review_prompt(&bounded);
        let raw = self.model.complete(&system, &user).await?;

        self.advance(stage, ReviewStage::Normalizing);
        let review = normalize::normalize_response(&raw)?;

        Ok(ReviewReport::new(
            pr,
            review,
            ReviewStats {
                diff_chars,
                diff_truncated,
                model_used: Some(self.model.model().to_string()),
            },
        ))
    }

    fn advance(&self, stage: &mut ReviewStage, next: ReviewStage) {
        *stage = next;
        self.enter(next);
    }

    fn enter(&self, stage: ReviewStage) {
        debug!(stage = %stage, "review stage");
        if let Some(observer) = &self.observer {
            observer(stage);
        }
    }
}

impl ReviewReport {
    fn new(pr: PrReference, review: ReviewResponse, stats: ReviewStats) -> Self {
        Self {
            pr,
            review,
            stats,
            reviewed_at: Utc::now(),
            github_comment_posted: false,
            github_comment_url: None,
        }
    }

    /// Record a successful post of this review to the PR.
    pub fn mark_posted(&mut self, url: String) {
        self.github_comment_posted = true;
        self.github_comment_url = (!url.is_empty()).then_some(url);
    }
}

fn decision_badge(decision: ReviewDecision) -> &'static str {
    match decision {
        ReviewDecision::Approve => "\u{2705} APPROVE",
        ReviewDecision::RequestChanges => "\u{274c} REQUEST CHANGES",
    }
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Review of {}", self.pr)?;
        writeln!(f, "==============")?;
        let model = self.stats.model_used.as_deref().unwrap_or("none");
        let truncated = if self.stats.diff_truncated {
            " (truncated)"
        } else {
            ""
        };
        writeln!(
            f,
            "Model: {model} | Diff: {} chars{truncated} | Comments: {}\n",
            self.stats.diff_chars,
            self.review.comments().len(),
        )?;

        writeln!(f, "Decision: {}\n", decision_badge(self.review.decision()))?;
        writeln!(f, "{}\n", self.review.summary())?;

        if self.review.comments().is_empty() {
            writeln!(f, "No issues found.")?;
        } else {
            for (i, c) in self.review.comments().iter().enumerate() {
                writeln!(f, "{}. {}:{}", i + 1, c.file(), c.line())?;
                writeln!(f, "  Issue: {}", c.issue())?;
                if !c.suggestion().is_empty() {
                    writeln!(f, "  Suggestion: {}", c.suggestion())?;
                }
                writeln!(f)?;
            }
        }

        if let Some(url) = &self.github_comment_url {
            writeln!(f, "Posted to GitHub: {url}")?;
        }

        Ok(())
    }
}

impl ReviewReport {
    /// Render the review as markdown, the body used for the PR comment.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## AI Code Review\n\n");
        out.push_str(&format!(
            "**Decision:** {}\n\n",
            decision_badge(self.review.decision())
        ));
        out.push_str(&format!("### Summary\n\n{}\n\n", self.review.summary()));

        if self.review.comments().is_empty() {
            out.push_str("No file-level comments.\n");
        } else {
            out.push_str(&format!(
                "### Comments ({})\n\n",
                self.review.comments().len()
            ));
            for c in self.review.comments() {
                out.push_str(&format!("#### `{}:{}`\n\n", c.file(), c.line()));
                out.push_str(&format!("**Issue:** {}\n\n", c.issue()));
                if !c.suggestion().is_empty() {
                    out.push_str(&format!("> **Suggestion:** {}\n\n", c.suggestion()));
                }
            }
        }

        if let Some(model) = &self.stats.model_used {
            out.push_str(&format!("\n---\n_Reviewed by `{model}`_\n"));
        }
        out
    }
}
