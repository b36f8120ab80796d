//! Redaction workbench CLI
//!
//! Headless front end for the review workflow:
//!
//! - `pages` prints the geometry of every page of a PDF
//! - `review` runs (or loads) a detection job for a document, applies bulk
//!   decisions, prints the review summary and optionally finalizes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use redaction_core::PageGeometry;
use redaction_workbench::{logging, HttpRedactionService, Workbench, WorkbenchConfig};
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "redaction-workbench")]
#[command(version, about = "Review and finalize detected redactions")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print page sizes and rotations of a PDF as JSON
    Pages {
        /// PDF file to inspect
        file: PathBuf,
    },
    /// Detect, review and optionally finalize a document
    Review(ReviewArgs),
}

#[derive(ClapArgs, Debug)]
struct ReviewArgs {
    /// Document id known to the redaction service
    #[arg(long)]
    document: String,

    /// Load the matches of this finished job instead of starting detection
    #[arg(long)]
    job: Option<String>,

    /// Restrict detection to these pages, e.g. "1-3, 7"
    #[arg(long, conflicts_with = "job")]
    pages: Option<String>,

    /// Local copy of the PDF, used to validate page ranges and plan output
    #[arg(long)]
    pdf: Option<PathBuf>,

    /// Redaction service base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Auto-approval threshold in percent (overrides the config file)
    #[arg(long)]
    threshold: Option<f64>,

    /// Approve pending matches at or above this confidence percentage
    #[arg(long)]
    approve_above: Option<f64>,

    /// Reject whatever is still pending after the other decisions
    #[arg(long)]
    reject_rest: bool,

    /// Submit the approved set once review is done
    #[arg(long)]
    finalize: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut config = match &args.config {
        Some(path) => WorkbenchConfig::from_file(path)?,
        None => WorkbenchConfig::default(),
    };

    match args.command {
        Command::Pages { file } => {
            let pages = read_pages(&file)?;
            println!("{}", serde_json::to_string_pretty(&pages)?);
        }
        Command::Review(review) => {
            if let Some(base_url) = &review.base_url {
                config.service.base_url = base_url.clone();
            }
            if let Some(threshold) = review.threshold {
                config.review.threshold = threshold;
            }
            config.validate()?;
            run_review(&config, review).await?;
        }
    }

    Ok(())
}

fn read_pages(file: &Path) -> anyhow::Result<Vec<PageGeometry>> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    PageGeometry::all_from_bytes(&bytes)
        .with_context(|| format!("Failed to read page geometry from {}", file.display()))
}

async fn run_review(config: &WorkbenchConfig, review: ReviewArgs) -> anyhow::Result<()> {
    let service = Arc::new(HttpRedactionService::new(&config.service)?);
    let workbench = Workbench::create(review.document.as_str(), config, service)?;

    if let Some(pdf) = &review.pdf {
        let pages = read_pages(pdf)?;
        workbench.register_pages(&pages).await?;
    }

    let summary = match &review.job {
        Some(job_id) => workbench.load_matches(job_id).await?,
        None => {
            let job_id = workbench.start_detection(review.pages.as_deref()).await?;
            info!("Waiting for detection job {}", job_id);
            workbench.wait_for_detection().await?
        }
    };
    info!(
        "Loaded {} matches ({} auto-approved)",
        summary.loaded, summary.auto_approved
    );

    if let Some(pct) = review.approve_above {
        let approved = workbench.approve_high_confidence(Some(pct)).await?;
        info!("Approved {} matches at or above {}%", approved, pct);
    }
    if review.reject_rest {
        let rejected = workbench.reject_all().await?;
        info!("Rejected {} remaining matches", rejected);
    }

    let stats = workbench.stats().await;
    let plan = workbench.plan().await;
    let receipt = if review.finalize {
        Some(workbench.finalize().await?)
    } else {
        None
    };

    let report = json!({
        "document_id": workbench.document_id(),
        "stats": stats,
        "plan": plan,
        "download_url": receipt.map(|r| r.download_url),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    workbench.dispose().await;
    Ok(())
}
