//! Redaction workbench
//!
//! Async orchestration around `redaction-core`: a review session per
//! document that polls detection jobs, syncs approvals optimistically with
//! the redaction service, debounces threshold input and submits the final
//! redaction set.
//!
//! ```no_run
//! use std::sync::Arc;
//! use redaction_workbench::{HttpRedactionService, Workbench, WorkbenchConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = WorkbenchConfig::from_file("workbench.toml")?;
//! let service = Arc::new(HttpRedactionService::new(&config.service)?);
//! let workbench = Workbench::create("doc-42", &config, service)?;
//!
//! workbench.start_detection(Some("1-3")).await?;
//! workbench.wait_for_detection().await?;
//! workbench.reject_all().await?;
//! let receipt = workbench.finalize().await?;
//! println!("{}", receipt.download_url);
//!
//! workbench.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod debounce;
pub mod error;
pub mod http;
pub mod logging;
pub mod poller;
pub mod service;
pub mod workbench;

pub use config::WorkbenchConfig;
pub use error::{ServiceError, WorkbenchError};
pub use http::HttpRedactionService;
pub use poller::{JobPoller, JobWatch};
pub use service::RedactionService;
pub use workbench::{PageOverlays, ReviewStats, Workbench};
