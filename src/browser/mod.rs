//! Browser automation module
//!
//! This module provides browser control through ChromiumOxide: lifecycle
//! management, page navigation, frame-scoped element operations and
//! evidence capture. Flow code only sees the [`BrowserSession`] trait, so it
//! runs unchanged against a real browser or the in-memory [`MockSession`].

pub mod capture;
pub mod controller;
pub mod mock;
pub mod navigation;
pub mod session;

pub use capture::{
    CaptureFormat, CaptureOptions, EvidenceArtifact, EvidenceCapture, PersistedEvidence,
};
pub use controller::{BrowserConfig, BrowserController, PageHandle};
pub use mock::{MockAction, MockDocument, MockElement, MockSession, MockSessionBuilder, Reveal};
pub use navigation::{NavigationOptions, PageNavigator, UrlValidator};
pub use session::{BrowserSession, CdpSession};
