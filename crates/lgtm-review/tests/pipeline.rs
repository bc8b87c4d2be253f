use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lgtm_core::{FetchError, LgtmError, LlmError, PrReference, ReviewDecision};
use lgtm_review::github::DiffSource;
use lgtm_review::llm::CompletionModel;
use lgtm_review::pipeline::{ReviewPipeline, ReviewStage};
use lgtm_review::truncate::TRUNCATION_MARKER;

const URL: &str = "https://github.com/o/r/pull/12";

#[derive(Clone, Default)]
struct FakeDiffs {
    diff: String,
    fail: bool,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl FakeDiffs {
    fn returning(diff: &str) -> Self {
        Self {
            diff: diff.to_string(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl DiffSource for FakeDiffs {
    async fn fetch_diff(&self, pr: &PrReference) -> Result<String, LgtmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(pr.to_string());
        if self.fail {
            return Err(FetchError::NotFound(pr.to_string()).into());
        }
        Ok(self.diff.clone())
    }
}

#[derive(Clone, Default)]
struct FakeModel {
    reply: String,
    fail: bool,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeModel {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl CompletionModel for FakeModel {
    fn model(&self) -> &str {
        "fake/model"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String, LgtmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(user.to_string());
        if self.fail {
            return Err(LlmError::Timeout(90).into());
        }
        Ok(self.reply.clone())
    }
}

const APPROVING: &str = r#"{"summary":"Fine.","comments":[],"decision":"APPROVE"}"#;

#[tokio::test]
async fn reviews_a_small_diff_end_to_end() {
    let diffs = FakeDiffs::returning("diff --git a/x b/x\n+fn main() {}\n");
    let model = FakeModel::replying(
        "```json\n{\"summary\":\"One issue.\",\"comments\":[{\"file\":\"x\",\"line\":\"3\",\"issue\":\"i\",\"suggestion\":\"s\"}],\"decision\":\"request_changes\"}\n```",
    );
    let pipeline = ReviewPipeline::new(diffs.clone(), model.clone());

    let report = pipeline.review_report(URL).await.unwrap();

    assert_eq!(report.pr.to_string(), "o/r#12");
    assert_eq!(report.review.summary(), "One issue.");
    assert_eq!(report.review.decision(), ReviewDecision::RequestChanges);
    assert_eq!(report.review.comments()[0].line(), 3);
    assert!(!report.stats.diff_truncated);
    assert_eq!(report.stats.model_used.as_deref(), Some("fake/model"));
    assert!(!report.github_comment_posted);

    assert_eq!(diffs.seen.lock().unwrap().as_slice(), ["o/r#12"]);
    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[0].contains("+fn main() {}"));
}

#[tokio::test]
async fn empty_diff_short_circuits_without_calling_the_model() {
    for diff in ["", "  \n\t\n"] {
        let model = FakeModel::replying(APPROVING);
        let pipeline = ReviewPipeline::new(FakeDiffs::returning(diff), model.clone());

        let review = pipeline.review(URL).await.unwrap();

        assert_eq!(review.decision(), ReviewDecision::Approve);
        assert!(review.comments().is_empty());
        assert!(review.summary().contains("no changes"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn empty_diff_report_has_no_model() {
    let pipeline = ReviewPipeline::new(FakeDiffs::returning(""), FakeModel::default());
    let report = pipeline.review_report(URL).await.unwrap();
    assert_eq!(report.stats.diff_chars, 0);
    assert!(report.stats.model_used.is_none());
}

#[tokio::test]
async fn invalid_url_fails_before_fetching() {
    let diffs = FakeDiffs::returning("+x");
    let model = FakeModel::replying(APPROVING);
    let pipeline = ReviewPipeline::new(diffs.clone(), model.clone());

    let err = pipeline
        .review("https://github.com/o/r/issues/12")
        .await
        .unwrap_err();

    assert!(matches!(err, LgtmError::InvalidUrl(_)));
    assert_eq!(diffs.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fetch_errors_propagate_unchanged() {
    let diffs = FakeDiffs {
        fail: true,
        ..FakeDiffs::default()
    };
    let model = FakeModel::replying(APPROVING);
    let pipeline = ReviewPipeline::new(diffs, model.clone());

    let err = pipeline.review(URL).await.unwrap_err();

    assert!(matches!(err, LgtmError::Fetch(FetchError::NotFound(ref pr)) if pr == "o/r#12"));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn llm_errors_propagate_unchanged() {
    let model = FakeModel {
        fail: true,
        ..FakeModel::default()
    };
    let pipeline = ReviewPipeline::new(FakeDiffs::returning("+x"), model);

    let err = pipeline.review(URL).await.unwrap_err();

    assert!(matches!(err, LgtmError::Llm(LlmError::Timeout(90))));
}

#[tokio::test]
async fn unusable_model_output_is_malformed() {
    let pipeline = ReviewPipeline::new(
        FakeDiffs::returning("+x"),
        FakeModel::replying("I think this PR looks fine overall."),
    );

    let err = pipeline.review(URL).await.unwrap_err();

    assert!(matches!(err, LgtmError::MalformedResponse { .. }));
}

#[tokio::test]
async fn large_diff_is_truncated_before_prompting() {
    let line = "+let value = compute(42);\n";
    let diff = line.repeat(100);
    let model = FakeModel::replying(APPROVING);
    let pipeline =
        ReviewPipeline::new(FakeDiffs::returning(&diff), model.clone()).with_max_diff_chars(500);

    let report = pipeline.review_report(URL).await.unwrap();

    assert!(report.stats.diff_truncated);
    assert_eq!(report.stats.diff_chars, diff.chars().count());

    let prompts = model.prompts.lock().unwrap();
    let prompt = &prompts[0];
    assert!(prompt.contains(TRUNCATION_MARKER));
    assert!(prompt.len() < diff.len());
}

#[tokio::test]
async fn observer_sees_stages_in_order() {
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let pipeline = ReviewPipeline::new(FakeDiffs::returning("+x"), FakeModel::replying(APPROVING))
        .with_observer(move |stage| sink.lock().unwrap().push(stage));

    pipeline.review(URL).await.unwrap();

    assert_eq!(
        stages.lock().unwrap().as_slice(),
        [
            ReviewStage::ParsingUrl,
            ReviewStage::FetchingDiff,
            ReviewStage::CheckingEmpty,
            ReviewStage::Truncating,
            ReviewStage::CallingModel,
            ReviewStage::Normalizing,
            ReviewStage::Done,
        ]
    );
}

#[tokio::test]
async fn observer_sees_failure_and_empty_shortcut() {
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let pipeline = ReviewPipeline::new(FakeDiffs::returning(""), FakeModel::default())
        .with_observer(move |stage| sink.lock().unwrap().push(stage));
    pipeline.review(URL).await.unwrap();
    assert_eq!(
        stages.lock().unwrap().as_slice(),
        [
            ReviewStage::ParsingUrl,
            ReviewStage::FetchingDiff,
            ReviewStage::CheckingEmpty,
            ReviewStage::Done,
        ]
    );

    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let pipeline = ReviewPipeline::new(FakeDiffs::returning("+x"), FakeModel::default())
        .with_observer(move |stage| sink.lock().unwrap().push(stage));
    pipeline.review("not a url").await.unwrap_err();
    assert_eq!(
        stages.lock().unwrap().as_slice(),
        [ReviewStage::ParsingUrl, ReviewStage::Failed]
    );
}

#[tokio::test]
async fn concurrent_reviews_share_one_pipeline() {
    let model = FakeModel::replying(APPROVING);
    let pipeline = Arc::new(ReviewPipeline::new(
        FakeDiffs::returning("+x"),
        model.clone(),
    ));

    let handles: Vec<_> = (1..=4)
        .map(|n| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .review(&format!("https://github.com/o/r/pull/{n}"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(
            handle.await.unwrap().unwrap().decision(),
            ReviewDecision::Approve
        );
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 4);
}
