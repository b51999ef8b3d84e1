//! Mailprobe CLI
//!
//! Runs one inbox verification against a disposable-mailbox web UI and
//! exits with 0 (passed), 1 (verification failed) or 2 (infrastructure error).

use anyhow::{Context, Result};
use clap::Parser;
use mailprobe_web::browser::{BrowserConfig, BrowserController, MockSession, NavigationOptions};
use mailprobe_web::flow::EvidenceOutcome;
use mailprobe_web::{FlowConfig, FlowReport, InboxFlow, RunOutcome};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Mailprobe - disposable mailbox verification
#[derive(Parser, Debug)]
#[command(name = "mailprobe")]
#[command(version)]
#[command(about = "Verify that the newest message in a disposable mailbox contains a text fragment")]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Inbox page URL
    #[arg(long)]
    url: Option<String>,

    /// Mailbox address to open
    #[arg(short, long)]
    address: Option<String>,

    /// Text the newest message must contain
    #[arg(short, long)]
    expect: Option<String>,

    /// Budget for each wait, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Interval between polls, in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Where to write the evidence screenshot
    #[arg(short, long)]
    screenshot: Option<PathBuf>,

    /// Capture the whole page instead of the viewport
    #[arg(long)]
    full_page: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Disable the Chrome sandbox (needed in some containers)
    #[arg(long)]
    no_sandbox: bool,

    /// Also capture a screenshot when the run fails
    #[arg(long)]
    capture_on_failure: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Run against an in-memory page instead of a browser
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn flow_config(&self) -> Result<FlowConfig> {
        let mut config = match self.config {
            Some(ref path) => FlowConfig::from_file(path)?,
            None => FlowConfig::default(),
        };

        if let Some(ref url) = self.url {
            config.inbox_url = url.clone();
        }
        if let Some(ref address) = self.address {
            config.address = address.clone();
        }
        if let Some(ref fragment) = self.expect {
            config.expected_fragment = fragment.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = ms;
        }
        if let Some(ms) = self.poll_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(ref path) = self.screenshot {
            config.evidence_path = path.clone();
        }
        if self.capture_on_failure {
            config.capture_on_failure = true;
        }
        if self.full_page {
            config.evidence_full_page = true;
        }

        config.validate()?;
        Ok(config)
    }

    fn browser_config(&self) -> BrowserConfig {
        let mut builder = BrowserConfig::builder()
            .headless(!self.headed)
            .sandbox(!self.no_sandbox);
        if let Some(ref path) = self.chrome_path {
            builder = builder.chrome_path(path.clone());
        }
        builder.build()
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(&args).await {
        Ok(report) => {
            print_report(&report, args.json);
            report.outcome.exit_code()
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            RunOutcome::InfrastructureError.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(args: &Args) -> Result<FlowReport> {
    let config = args.flow_config()?;

    if let Some(parent) = config.evidence_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    if args.dry_run {
        tracing::info!("Dry run: using an in-memory inbox page");
        let session =
            MockSession::inbox_builder(&config.selectors, &config.expected_fragment).build();
        return Ok(InboxFlow::new(&session, &config).run().await);
    }

    let controller = BrowserController::with_config(args.browser_config())
        .await
        .context("launching browser")?;

    let report = match controller
        .session(NavigationOptions::with_timeout(config.navigation_timeout_ms))
        .await
    {
        Ok(session) => Ok(InboxFlow::new(&session, &config).run().await),
        Err(e) => Err(anyhow::Error::from(e).context("opening page")),
    };

    if let Err(e) = controller.close().await {
        tracing::warn!("Browser did not close cleanly: {}", e);
    }

    report
}

fn print_report(report: &FlowReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{}", out),
            Err(e) => tracing::error!("Failed to serialize report: {}", e),
        }
        return;
    }

    println!("run {} for {}", report.run_id, report.address);
    for record in &report.states {
        println!("  {:<20} {:>6}ms  {:?}", record.state, record.elapsed_ms, record.status);
    }
    if let Some(ref assertion) = report.assertion {
        let mark = if assertion.passed { "PASS" } else { "FAIL" };
        println!("{}: {}", mark, assertion.message);
    }
    match report.evidence {
        EvidenceOutcome::Written { ref path, bytes } => println!("evidence: {} ({} bytes)", path, bytes),
        EvidenceOutcome::Failed { ref path, ref error } => println!("evidence: {} not written: {}", path, error),
        EvidenceOutcome::Skipped => {}
    }
    if let Some(ref failure) = report.failure {
        println!("failed at {}: {}", failure.state, failure.message);
    }
    println!("outcome: {:?}", report.outcome);
}
