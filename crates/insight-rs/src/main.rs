//! Generate wellness insights, scrub text, and inspect usage budgets.
//!
//! Reads the API key from `--api-key`, `INSIGHT_API_KEY`, or
//! `OPENAI_API_KEY`. Log verbosity follows `RUST_LOG` (default `info`).
//!
//! # Examples
//!
//! ```sh
//! # Evening reflection from a JSON snapshot of the user's records
//! insight generate evening --user u1 --snapshot snapshot.json
//!
//! # Show the prompt that would be sent, without calling the API
//! insight generate morning --user u1 --snapshot snapshot.json --dry-run
//!
//! # Persist budgets across runs
//! insight generate evening --user u1 --snapshot s.json --usage-file usage.json
//! insight usage --usage-file usage.json show --user u1
//!
//! # Scrub personal data from stdin
//! echo "Treffen mit Anna Müller in Berlin" | insight scrub
//! ```

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use insight_rs::config::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use insight_rs::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Generate wellness insights, scrub text, and inspect usage budgets.
#[derive(Parser)]
#[command(name = "insight", version)]
struct Cli {
    /// Print machine-readable JSON instead of plain text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an evening or morning insight for one user
    Generate(GenerateArgs),

    /// Replace personal data in text with reversible placeholders
    Scrub {
        /// Text to scrub; read from stdin when omitted
        text: Option<String>,
    },

    /// Inspect or reset persisted usage counters
    Usage {
        /// JSON file holding the usage ledger
        #[arg(long)]
        usage_file: PathBuf,

        #[command(subcommand)]
        action: UsageAction,
    },
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Insight kind: evening or morning
    kind: InsightKind,

    /// User whose records are aggregated
    #[arg(long)]
    user: String,

    /// JSON snapshot of the user's records (empty when omitted)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// End of the aggregation window, RFC 3339 (defaults to now)
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    // ── Prompt ─────────────────────────────────────────────────
    /// Output language: de or en
    #[arg(long, default_value = "de")]
    language: Language,

    /// Send record text without scrubbing personal data
    #[arg(long)]
    no_redact: bool,

    /// Print the composed prompt and exit without calling the API
    #[arg(long)]
    dry_run: bool,

    /// Seed the impulse and fallback selection
    #[arg(long)]
    seed: Option<u64>,

    // ── Model / API ────────────────────────────────────────────
    #[arg(long, env = "INSIGHT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// OpenAI-compatible API root
    #[arg(long, env = "INSIGHT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "INSIGHT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum tokens in the response
    #[arg(long, default_value_t = 300)]
    max_tokens: u32,

    // ── Budgets ────────────────────────────────────────────────
    /// Persist usage counters to this JSON file (in-memory when omitted)
    #[arg(long)]
    usage_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum UsageAction {
    /// Show one user's counters
    Show {
        #[arg(long)]
        user: String,
    },
    /// Zero every user's daily counters
    Reset,
}

// ── Commands ───────────────────────────────────────────────────────

async fn generate(args: &GenerateArgs, json: bool) -> Result<String, String> {
    let source = match &args.snapshot {
        Some(path) => InMemoryDataSource::from_json_file(path)
            .map_err(|e| format!("failed to load snapshot '{}': {e}", path.display()))?,
        None => InMemoryDataSource::new(),
    };
    let now = args.now.unwrap_or_else(Utc::now);

    let mut config = InsightConfig::default()
        .with_model(&args.model)
        .with_base_url(&args.base_url)
        .with_max_tokens(args.max_tokens);
    if let Some(key) = &args.api_key {
        config = config.with_api_key(key);
    }

    let usage: Arc<dyn UsageStore> = match &args.usage_file {
        Some(path) => Arc::new(open_usage_store(path, config.rate_limits.clone())?),
        None => Arc::new(InMemoryUsageStore::new(config.rate_limits.clone())),
    };

    let mut client = if args.dry_run {
        // Dry runs never reach the backend.
        BudgetedInsightClient::new(config.with_api_key("dry-run"), usage)
    } else {
        BudgetedInsightClient::new(config, usage)
    }
    .map_err(|e| e.to_string())?;
    let aggregator = match args.seed {
        Some(seed) => {
            client = client.with_rng_seed(seed);
            TimeWindowAggregator::with_seed(args.language, seed)
        }
        None => TimeWindowAggregator::new(args.language),
    };

    let prompt_config = PromptConfig::new(args.language).with_redaction(!args.no_redact);
    let pipeline = InsightPipeline::new(prompt_config, client).with_aggregator(aggregator);

    if args.dry_run {
        let prompt = pipeline
            .build_prompt_at(args.kind, &args.user, &source, now)
            .await;
        return if json {
            to_json(&prompt)
        } else {
            Ok(format!(
                "[system]\n{}\n\n[user]\n{}\n\n(~{} tokens, {} redaction(s))",
                prompt.system_prompt,
                prompt.user_prompt,
                prompt.estimated_token_count,
                prompt.redactions.len()
            ))
        };
    }

    let response = pipeline
        .generate_insight_at(args.kind, &args.user, &source, now)
        .await;
    if let Some(reason) = response.reason() {
        info!("Served fallback content ({reason})");
    }
    if json {
        to_json(&response)
    } else {
        Ok(response.content().to_string())
    }
}

fn scrub_text(text: Option<&str>, json: bool) -> Result<String, String> {
    let input = match text {
        Some(t) => t.to_string(),
        None => read_stdin_content()?,
    };
    let result = scrub(&input, &ScrubOptions::default());
    if json {
        to_json(&result)
    } else {
        Ok(result.scrubbed_text)
    }
}

async fn usage(path: &Path, action: &UsageAction, json: bool) -> Result<String, String> {
    let store = open_usage_store(path, RateLimits::default())?;
    match action {
        UsageAction::Show { user } => {
            let status = store.status(user).await;
            if json {
                return to_json(&status);
            }
            let limits = store.limits();
            Ok(format!(
                "calls today:       {}/{}\ntokens today:      {}/{}\ncalls last minute: {}/{}\nlast call:         {}\nlimited:           {}",
                status.calls_today,
                limits.max_calls_per_day,
                status.tokens_today,
                limits.max_tokens_per_day,
                status.calls_last_minute,
                limits.max_calls_per_minute,
                status
                    .last_call_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string()),
                status.is_limited
            ))
        }
        UsageAction::Reset => {
            store.reset_daily_limits().await;
            Ok(format!("Daily counters reset in {}", path.display()))
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn open_usage_store(path: &Path, limits: RateLimits) -> Result<FileUsageStore, String> {
    FileUsageStore::open(path, limits)
        .map_err(|e| format!("failed to open usage file '{}': {e}", path.display()))
}

fn read_stdin_content() -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize output: {e}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match &cli.command {
        Command::Generate(args) => generate(args, cli.json).await,
        Command::Scrub { text } => scrub_text(text.as_deref(), cli.json),
        Command::Usage { usage_file, action } => usage(usage_file, action, cli.json).await,
    };

    match result {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
