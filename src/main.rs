use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lgtm_core::{ConfigStatus, LgtmConfig, OutputFormat};
use lgtm_review::github::GitHubClient;
use lgtm_review::llm::LlmClient;
use lgtm_review::pipeline::{ReviewPipeline, ReviewStage};

const CONFIG_FILE: &str = ".lgtm.toml";

#[derive(Parser)]
#[command(
    name = "lgtm",
    version,
    about = "AI review for GitHub pull requests",
    long_about = "lgtm fetches a pull request diff from GitHub, asks an LLM for a review,\n\
                  and prints a structured verdict: summary, file comments, and a decision.\n\n\
                  Examples:\n  \
                    lgtm review https://github.com/owner/repo/pull/42\n  \
                    lgtm review <url> --format json          Machine-readable output\n  \
                    lgtm review <url> --post-comment         Post the review to the PR\n  \
                    lgtm status                              Check configured credentials"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .lgtm.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown (alias: md)"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Review a GitHub pull request
    #[command(long_about = "Review a GitHub pull request.\n\n\
        Fetches the PR diff, truncates it to the configured size, and asks the LLM\n\
        for a JSON review. Requires OPENROUTER_API_KEY (or [llm] api_key).\n\
        GITHUB_TOKEN is optional for public repositories.\n\n\
        Examples:\n  lgtm review https://github.com/owner/repo/pull/42\n  \
        lgtm review https://github.com/owner/repo/pull/42 --post-comment")]
    Review {
        /// Pull request URL (https://github.com/<owner>/<repo>/pull/<number>)
        url: String,
        /// Post the review as a comment on the pull request
        #[arg(
            long,
            long_help = "Post the review as a conversation comment on the pull request.\n\n\
                Requires GITHUB_TOKEN. A failed post is reported as a warning and does\n\
                not discard the review."
        )]
        post_comment: bool,
        /// Override the diff size limit in characters
        #[arg(long)]
        max_diff_chars: Option<usize>,
    },
    /// Show which credentials and model are configured
    #[command(long_about = "Show which credentials and model are configured.\n\n\
        Reports whether a GitHub token and an LLM API key are present (never their\n\
        values) and which model reviews will use. Use --format json for\n\
        machine-readable output.")]
    Status,
    /// Create a default .lgtm.toml configuration file
    #[command(long_about = "Create a default .lgtm.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .lgtm.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1m\x1b[32m\u{2713}\x1b[0m \x1b[1mlgtm\x1b[0m v{version}: AI review for GitHub pull requests\n");

        println!("Quick start:");
        println!("  \x1b[36mlgtm init\x1b[0m                 Create a .lgtm.toml config file");
        println!("  \x1b[36mlgtm status\x1b[0m               Check credentials and model");
        println!("  \x1b[36mlgtm review <PR_URL>\x1b[0m      Review a pull request\n");
    } else {
        println!("lgtm v{version}: AI review for GitHub pull requests\n");

        println!("Quick start:");
        println!("  lgtm init                 Create a .lgtm.toml config file");
        println!("  lgtm status               Check credentials and model");
        println!("  lgtm review <PR_URL>      Review a pull request\n");
    }

    println!("Run 'lgtm <command> --help' for details.");
}

struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, use_color: bool) -> &'static str {
        match (self.status, use_color) {
            ("pass", true) => "\x1b[32m\u{2713}\x1b[0m",
            ("pass", false) => "\u{2713}",
            ("fail", true) => "\x1b[31m\u{2717}\x1b[0m",
            ("fail", false) => "\u{2717}",
            (_, true) => "\x1b[33m~\x1b[0m",
            (_, false) => "~",
        }
    }
}

fn status_checks(status: &ConfigStatus, config_found: bool) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    if config_found {
        checks.push(CheckResult::pass("config_file", "configuration file loaded"));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{CONFIG_FILE} not found, using defaults"),
        ));
    }

    if status.github_configured {
        checks.push(CheckResult::pass("github_token", "GITHUB_TOKEN set"));
    } else {
        checks.push(CheckResult::fail(
            "github_token",
            "GITHUB_TOKEN not set",
            "export GITHUB_TOKEN=... (needed for private repos and --post-comment)",
        ));
    }

    if status.llm_configured {
        checks.push(CheckResult::pass("llm_api_key", "OPENROUTER_API_KEY set"));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            "OPENROUTER_API_KEY not set",
            format!("export OPENROUTER_API_KEY=... or set api_key in {CONFIG_FILE} under [llm]"),
        ));
    }

    checks.push(CheckResult::info("llm_model", status.llm_model.clone()));
    checks
}

fn run_status(
    config: &LgtmConfig,
    config_found: bool,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let status = config.status();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&status).into_diagnostic()?);
        return Ok(());
    }

    let version = env!("CARGO_PKG_VERSION");
    println!("lgtm v{version}: configuration status\n");

    let checks = status_checks(&status, config_found);
    for check in &checks {
        let label = check.name.replace('_', " ");
        println!("  {} {label:<14} {}", check.symbol(use_color), check.detail);
        if let Some(hint) = &check.hint {
            println!("    hint: {hint}");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<LgtmConfig> {
    let mut config = match path {
        Some(path) => LgtmConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                LgtmConfig::from_file(default_path)?
            } else {
                LgtmConfig::default()
            }
        }
    };
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,lgtm=debug,lgtm_core=debug,lgtm_review=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn spinner() -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
    );
    pb.set_message("Starting review...");
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

async fn run_review(
    config: &LgtmConfig,
    url: &str,
    post_comment: bool,
    format: OutputFormat,
) -> Result<()> {
    let github = GitHubClient::new(&config.github)?;
    let llm = LlmClient::new(&config.llm)?;
    let mut pipeline =
        ReviewPipeline::new(github, llm).with_max_diff_chars(config.review.max_diff_chars);

    let spinner = spinner();
    if let Some(pb) = &spinner {
        let pb = pb.clone();
        pipeline = pipeline.with_observer(move |stage| match stage {
            ReviewStage::Done => pb.finish_with_message("Done"),
            ReviewStage::Failed => pb.finish_with_message("Failed"),
            other => pb.set_message(format!("{}...", capitalize(&other.to_string()))),
        });
    }

    let mut report = pipeline.review_report(url).await?;

    if post_comment {
        let body = report.to_markdown();
        let posted = pipeline.diff_source().post_comment(&report.pr, &body).await;
        match posted {
            Ok(comment_url) => {
                eprintln!("Posted review to {}", report.pr);
                report.mark_posted(comment_url);
            }
            Err(e) => warn!(pr = %report.pr, error = %e, "failed to post review comment"),
        }
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", report.to_markdown()),
        OutputFormat::Text => print!("{report}"),
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const DEFAULT_CONFIG: &str = r#"# lgtm configuration
# Credentials are best supplied through the environment:
#   GITHUB_TOKEN (or GH_TOKEN), OPENROUTER_API_KEY, LLM_MODEL

[github]
# api_base = "https://api.github.com"
# timeout_secs = 30

[llm]
# model = "anthropic/claude-3-haiku"
# base_url = "https://openrouter.ai/api"
# timeout_secs = 90
# temperature = 0.2
# max_tokens = 2000

[review]
# max_diff_chars = 10000
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    debug!(format = %cli.format, model = %config.llm.model, "configuration loaded");

    match cli.command {
        None => print_welcome(use_color),
        Some(Command::Review {
            ref url,
            post_comment,
            max_diff_chars,
        }) => {
            if let Some(limit) = max_diff_chars {
                config.review.max_diff_chars = limit;
            }
            config.validate()?;
            run_review(&config, url, post_comment, cli.format).await?;
        }
        Some(Command::Status) => {
            let config_found = cli.config.is_some() || Path::new(CONFIG_FILE).exists();
            run_status(&config, config_found, cli.format, use_color)?;
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!(miette::miette!(
                    help = "edit the existing file or remove it first",
                    "{CONFIG_FILE} already exists"
                ));
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "lgtm", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_config_template_parses() {
        let config = LgtmConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.review.max_diff_chars, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn status_checks_flag_missing_credentials() {
        let status = ConfigStatus {
            github_configured: false,
            llm_configured: true,
            llm_model: "m".into(),
        };
        let checks = status_checks(&status, false);
        let by_name = |n: &str| checks.iter().find(|c| c.name == n).unwrap().status;
        assert_eq!(by_name("github_token"), "fail");
        assert_eq!(by_name("llm_api_key"), "pass");
        assert_eq!(by_name("llm_model"), "info");
        assert_eq!(by_name("config_file"), "info");
    }

    #[test]
    fn capitalize_first_letter() {
        assert_eq!(capitalize("fetching diff"), "Fetching diff");
        assert_eq!(capitalize(""), "");
    }
}
