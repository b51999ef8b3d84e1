//! Mailprobe Web - End-to-End Disposable Mailbox Verification
//!
//! This crate drives a real browser through a disposable-mailbox web UI and
//! checks that the newest message for an address contains an expected text
//! fragment, leaving a screenshot behind as evidence.
//!
//! # Features
//!
//! - **Browser Automation**: Headless or headed Chrome via ChromiumOxide (CDP)
//! - **Frame Scoping**: Element lookups bound to an explicit frame context
//! - **Condition Waits**: Polled presence, clickability and frame availability
//! - **Evidence Capture**: One screenshot per run, written to a configured path
//! - **Dry Runs**: An in-memory session that needs no browser
//!
//! # Architecture
//!
//! ```text
//! CLI / caller ──▶ InboxFlow ──▶ FrameNavigator ──▶ BrowserSession
//!                     │               │              ├── CdpSession (Chrome)
//!                     ▼               ▼              └── MockSession
//!              ConditionWaiter   RenderContext
//!                     │
//!                     ▼
//!               EvidenceCapture ──▶ screenshot on disk
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mailprobe_web::browser::{BrowserController, NavigationOptions};
//! use mailprobe_web::{FlowConfig, InboxFlow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FlowConfig::builder()
//!         .address("sibendu@yopmail.com")
//!         .expected_fragment("This is a test message")
//!         .build();
//!
//!     let controller = BrowserController::new().await?;
//!     let session = controller.session(NavigationOptions::default()).await?;
//!
//!     let report = InboxFlow::new(&session, &config).run().await;
//!     println!("{:?}", report.outcome);
//!
//!     controller.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod wait;

// Re-exports for convenience
pub use browser::{BrowserController, BrowserSession, MockSession};
pub use config::{FlowConfig, Selectors};
pub use context::{ElementLocator, FrameNavigator, RenderContext};
pub use error::{Error, FlowError, Result};
pub use flow::{FlowReport, FlowState, InboxFlow, RunOutcome};
pub use wait::{ConditionWaiter, WaitCondition};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
