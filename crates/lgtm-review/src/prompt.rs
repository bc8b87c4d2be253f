const SYSTEM_PROMPT: &str = "\
You are an expert code reviewer. Analyze the GitHub pull request diff you are \
given and produce a structured review.

You MUST respond with ONLY a JSON object matching this exact schema:
{
  \"summary\": \"Concise high-level summary of the review (1-3 sentences)\",
  \"comments\": [
    {
      \"file\": \"path/to/file.ext\",
      \"line\": 42,
      \"issue\": \"Clear description of the problem\",
      \"suggestion\": \"Specific suggestion to fix the issue\"
    }
  ],
  \"decision\": \"APPROVE\" | \"REQUEST_CHANGES\"
}

Review guidelines:
- Focus on bugs, security issues, performance problems, code quality, and best practices
- Be constructive and specific in suggestions
- Use \"APPROVE\" when the code has no major issues
- Use \"REQUEST_CHANGES\" for bugs, security issues, or significant problems
- Minor style issues still get \"APPROVE\", with helpful comments
- \"comments\" may be an empty array when nothing specific stands out
- Always include a meaningful summary
- \"line\" refers to the line number in the new version of the file

Return ONLY the JSON object: no markdown, no code fences, no extra text.";

/// Build the system prompt that fixes the response schema.
///
/// # Examples
///
/// ```
/// use lgtm_review::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt();
/// assert!(prompt.contains("REQUEST_CHANGES"));
/// assert!(prompt.contains("\"suggestion\""));
/// ```
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

/// Build the user prompt containing the diff to review.
///
/// # Examples
///
/// ```
/// use lgtm_review::prompt::build_review_prompt;
///
/// let prompt = build_review_prompt("+new line");
/// assert!(prompt.contains("```diff\n+new line\n```"));
/// ```
pub fn build_review_prompt(diff: &str) -> String {
    format!(
        "Review the following pull request diff and provide your analysis:\n\n\
         ```diff\n{diff}\n```\n\n\
         Remember to respond with ONLY valid JSON matching the required schema."
    )
}
