//! Verification harness CLI.
//!
//! Exit codes: 0 = all samples passed, 1 = at least one sample failed,
//! 2 = precondition failure (unsafe inbox state, unreachable services).

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use conductor_core::defaults::{SEARCH_URL, VERIFY_POLL_SECS, VERIFY_SEARCH_LIMIT, VERIFY_TIMEOUT_MIN};
use conductor_db::Database;
use conductor_jobs::{ContentStore, StorageLayout};
use conductor_verify::{
    ContentStoreProbe, Harness, HarnessConfig, HarnessOutcome, HttpSearchClient, SampleMode,
    Verifier, VerifierContext,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Base,
    Overlay,
}

impl From<Mode> for SampleMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Base => SampleMode::Base,
            Mode::Overlay => SampleMode::Overlay,
        }
    }
}

/// End-to-end ingestion verification harness.
#[derive(Debug, Parser)]
#[command(name = "conductor-verify", version, about)]
struct Cli {
    /// Sample set to run.
    #[arg(long, value_enum, default_value = "base")]
    mode: Mode,

    /// Inbox directory override.
    #[arg(long, env = "CONDUCTOR_INBOX")]
    inbox: Option<PathBuf>,

    /// Archive root override.
    #[arg(long, env = "CONDUCTOR_ARCHIVE")]
    archive_root: Option<PathBuf>,

    /// Quarantine root override.
    #[arg(long, env = "CONDUCTOR_QUARANTINE")]
    quarantine_root: Option<PathBuf>,

    /// Ledger database path.
    #[arg(long, env = "CONDUCTOR_LEDGER", default_value = "data/ledger.db")]
    ledger: PathBuf,

    /// Search API endpoint.
    #[arg(long, env = "CONDUCTOR_SEARCH_URL", default_value = SEARCH_URL)]
    search_url: String,

    /// Search result limit per query.
    #[arg(long, default_value_t = VERIFY_SEARCH_LIMIT)]
    search_limit: usize,

    /// Directory sample files are generated under.
    #[arg(long, default_value = "data/samples")]
    samples: PathBuf,

    /// Directory report artifacts are written to.
    #[arg(long, default_value = "artifacts/verify")]
    artifacts: PathBuf,

    /// Proceed even when the inbox already contains files.
    #[arg(long)]
    keep_inbox: bool,

    /// Poll interval while waiting for samples to settle (seconds).
    #[arg(long, default_value_t = VERIFY_POLL_SECS)]
    poll_sec: u64,

    /// Overall timeout per run (minutes).
    #[arg(long, default_value_t = VERIFY_TIMEOUT_MIN)]
    timeout_min: u64,

    /// Generate samples and the report skeleton without ingesting.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    // With CONDUCTOR_LOG_DIR set, logs also roll into a daily file.
    let _guard = match std::env::var("CONDUCTOR_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "conductor-verify.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
            None
        }
    };

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            error!(error = %e, "Harness aborted");
            eprintln!("Error: {e}");
            2
        }
    };
    process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<HarnessOutcome> {
    let mut layout = StorageLayout::from_env();
    if let Some(inbox) = cli.inbox {
        layout.inbox = inbox;
    }
    if let Some(archive) = cli.archive_root {
        layout.archive_root = archive;
    }
    if let Some(quarantine) = cli.quarantine_root {
        layout.quarantine_root = quarantine;
    }

    let db = Database::open(&cli.ledger).await?;

    let search = Arc::new(HttpSearchClient::new(cli.search_url.clone()));
    let probe = Arc::new(ContentStoreProbe::new(ContentStore::new(
        layout.content_store_root.clone(),
    )));
    let verifier = Verifier::new(
        search,
        probe,
        VerifierContext {
            archive_root: layout.archive_root.clone(),
            quarantine_root: layout.quarantine_root.clone(),
        },
    )
    .with_search_limit(cli.search_limit);

    let mut config = HarnessConfig::new(layout);
    config.mode = cli.mode.into();
    config.samples_root = cli.samples;
    config.artifacts_dir = cli.artifacts.clone();
    config.ledger_path = cli.ledger.display().to_string();
    config.search_url = cli.search_url;
    config.keep_inbox = cli.keep_inbox;
    config.poll_interval = Duration::from_secs(cli.poll_sec.max(1));
    config.timeout = Duration::from_secs(cli.timeout_min.max(1) * 60);
    config.dry_run = cli.dry_run;

    let harness = Harness::new(config, db, verifier);
    let (report, outcome) = harness.run().await?;

    report
        .write_json(cli.artifacts.join("verify_report.json"))
        .await?;
    report
        .write_markdown(cli.artifacts.join("verify_report.md"))
        .await?;
    println!("{}", report.render_markdown());

    Ok(outcome)
}
