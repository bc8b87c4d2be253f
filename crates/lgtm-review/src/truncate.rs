/// Appended to a diff that was cut so the model knows content is missing.
pub const TRUNCATION_MARKER: &str = "\n\n[... DIFF TRUNCATED DUE TO SIZE LIMIT ...]";

/// Default character budget for a diff sent to the model.
pub const DEFAULT_MAX_DIFF_CHARS: usize = 10_000;

/// Bound a diff to `limit` characters before it is sent to the model.
///
/// Diffs within the limit are returned unchanged. Longer diffs are cut at
/// `limit` characters; if the last newline before the cut sits at or beyond
/// 80% of the limit the cut moves back to it, so at most 20% of the budget is
/// given up to avoid ending mid-line. [`TRUNCATION_MARKER`] is then appended.
///
/// Lengths are counted in characters, not bytes. Re-applying with the same or
/// a larger limit returns the already-truncated text unchanged.
///
/// # Examples
///
/// ```
/// use lgtm_review::truncate::{truncate_diff, TRUNCATION_MARKER};
///
/// assert_eq!(truncate_diff("+a\n+b\n", 100), "+a\n+b\n");
///
/// let cut = truncate_diff("+line one\n+line two\n", 11);
/// assert_eq!(cut, format!("+line one{TRUNCATION_MARKER}"));
/// ```
pub fn truncate_diff(diff: &str, limit: usize) -> String {
    if diff.chars().count() <= limit || is_truncated_within(diff, limit) {
        return diff.to_string();
    }

    let cut = byte_offset(diff, limit);
    let mut truncated = &diff[..cut];

    if let Some(newline) = truncated.rfind('\n') {
        let newline_chars = truncated[..newline].chars().count();
        // Integer form of `newline_chars >= 0.8 * limit`.
        if newline_chars * 5 >= limit * 4 {
            truncated = &truncated[..newline];
        }
    }

    tracing::warn!(
        original_chars = diff.chars().count(),
        kept_chars = truncated.chars().count(),
        limit,
        "diff too large, truncating"
    );

    format!("{truncated}{TRUNCATION_MARKER}")
}

/// Whether `diff` already carries the marker over a body that fits `limit`.
fn is_truncated_within(diff: &str, limit: usize) -> bool {
    diff.strip_suffix(TRUNCATION_MARKER)
        .is_some_and(|body| body.chars().count() <= limit)
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}
