//! Error types for MailProbe Web
//!
//! This module provides the error hierarchy using `thiserror`. The taxonomy
//! separates infrastructure failures (navigation, timeouts, frame contexts,
//! capture) from verification failures, which are the actual test outcome.

use crate::flow::FlowState;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for MailProbe Web operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser-related errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// A wait condition was never satisfied
    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    /// Frame context errors
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Expected content was not found in the message
    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// Capture errors (screenshot, persistence)
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    /// An action targeted an element that was not in the document
    #[error("Element not found: {0}")]
    ElementMissing(String),

    /// A page script returned something the session could not interpret
    #[error("Unexpected script result: {0}")]
    ScriptResult(String),
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),
}

/// A wait condition that was not satisfied within its budget
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "{condition} not satisfied after {waited_ms}ms{}",
    .last_error.as_ref().map(|e| format!(" (last error: {e})")).unwrap_or_default()
)]
pub struct TimeoutError {
    /// Human-readable description of the condition
    pub condition: String,
    /// How long the waiter polled before giving up
    pub waited_ms: u64,
    /// The last probe error seen while polling, if any
    pub last_error: Option<String>,
    /// Probes that completed and found the condition unmet
    pub observed: u32,
}

/// Frame context errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// A nested frame was switched to without existing in the active document
    #[error("Frame '{name}' not found in context '{parent}'")]
    NotFound {
        /// Frame name or id
        name: String,
        /// Display form of the context that was searched
        parent: String,
    },

    /// An element resolved in an earlier context was used after a switch
    #[error("Stale element {locator}: resolved in generation {resolved_in}, active is {active}")]
    StaleElement {
        /// Display form of the element's locator
        locator: String,
        /// Generation of the context the element was resolved in
        resolved_in: u64,
        /// Generation of the context now active
        active: u64,
    },

    /// The frame chain of the active context no longer resolves in the page
    #[error("Context '{0}' is detached from the page")]
    Detached(String),
}

/// Verification failures: the substantive test outcome
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// No element containing the fragment appeared within the budget
    #[error("No element containing '{fragment}' appeared within {waited_ms}ms")]
    NotFound {
        /// Expected text fragment
        fragment: String,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// An element containing the fragment exists but is not visible
    #[error("Element containing '{fragment}' is present but not visible")]
    NotVisible {
        /// Expected text fragment
        fragment: String,
    },
}

/// Capture errors (screenshots and their persistence)
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Screenshot failed
    #[error("Screenshot capture failed: {0}")]
    ScreenshotFailed(String),

    /// The browser returned an empty image
    #[error("Screenshot capture returned no data")]
    Empty,

    /// Writing the artifact failed
    #[error("Failed to write {}: {source}", .path.display())]
    PersistFailed {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A config value is out of range or malformed
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type alias for MailProbe Web operations
pub type Result<T> = std::result::Result<T, Error>;

/// The two failure classes a run can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected content was absent after correct navigation
    Verification,
    /// Anything else: the run could not get far enough to decide
    Infrastructure,
}

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Classify this error as a verification or infrastructure failure
    pub fn classify(&self) -> FailureClass {
        match self {
            Error::Verification(_) => FailureClass::Verification,
            _ => FailureClass::Infrastructure,
        }
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

/// A failure at a specific state of the inbox flow
#[derive(Error, Debug)]
#[error("{state} failed: {source}")]
pub struct FlowError {
    /// The state that failed
    pub state: FlowState,
    /// What went wrong
    #[source]
    pub source: Error,
}

impl FlowError {
    /// Attach a state to an error
    pub fn new(state: FlowState, source: impl Into<Error>) -> Self {
        Self {
            state,
            source: source.into(),
        }
    }

    /// Classify the underlying error
    pub fn class(&self) -> FailureClass {
        self.source.classify()
    }
}
