//! Run configuration
//!
//! A [`FlowConfig`] names the inbox endpoint, the mailbox under test, the
//! fragment the message must contain, the wait budgets and the selectors
//! for each page element. Defaults target the public disposable-mailbox
//! web UI; every value can come from a JSON file and be overridden on the
//! command line.

use crate::browser::capture::CaptureOptions;
use crate::browser::navigation::UrlValidator;
use crate::context::ElementLocator;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default inbox page
pub const DEFAULT_INBOX_URL: &str = "https://yopmail.com/wm";
/// Default mailbox under test
pub const DEFAULT_ADDRESS: &str = "sibendu@yopmail.com";
/// Default fragment the message must contain
pub const DEFAULT_FRAGMENT: &str = "This is a test message";
/// Default evidence destination
pub const DEFAULT_EVIDENCE_PATH: &str = "test-result-screenshots/email-screenshot.png";
/// Default per-condition wait budget (20 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;
/// Default polling interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
/// Default navigation budget (30 seconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
/// Default JPEG/WebP evidence quality
pub const DEFAULT_EVIDENCE_QUALITY: u8 = 85;

/// Locators for each element and frame the flow touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Mailbox name input on the top page
    pub address_input: ElementLocator,
    /// Button that loads the inbox for the typed address
    pub refresh_trigger: ElementLocator,
    /// Name of the frame listing messages
    pub inbox_frame: String,
    /// First row of the message list, inside the inbox frame
    pub first_message: ElementLocator,
    /// Name of the frame showing the open message
    pub message_frame: String,
    /// Message body container awaited after entering the message frame
    pub message_body: Option<ElementLocator>,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            address_input: ElementLocator::id("login"),
            refresh_trigger: ElementLocator::css(".material-icons-outlined.f36"),
            inbox_frame: "ifinbox".to_string(),
            first_message: ElementLocator::css(".m"),
            message_frame: "ifmail".to_string(),
            message_body: Some(ElementLocator::id("mail")),
        }
    }
}

/// Everything one verification run needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Inbox page URL
    pub inbox_url: String,
    /// Mailbox under test
    pub address: String,
    /// Text the opened message must contain
    pub expected_fragment: String,
    /// Budget for each wait condition, in milliseconds
    pub timeout_ms: u64,
    /// Interval between polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Budget for loading the inbox page, in milliseconds
    pub navigation_timeout_ms: u64,
    /// Where the evidence image is written
    pub evidence_path: PathBuf,
    /// Also capture evidence when the run fails
    pub capture_on_failure: bool,
    /// Capture the whole page instead of the viewport
    pub evidence_full_page: bool,
    /// Quality for JPEG/WebP evidence (1-100); ignored for PNG
    pub evidence_quality: u8,
    /// Page element locators
    pub selectors: Selectors,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            inbox_url: DEFAULT_INBOX_URL.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            expected_fragment: DEFAULT_FRAGMENT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            evidence_path: PathBuf::from(DEFAULT_EVIDENCE_PATH),
            capture_on_failure: false,
            evidence_full_page: false,
            evidence_quality: DEFAULT_EVIDENCE_QUALITY,
            selectors: Selectors::default(),
        }
    }
}

impl FlowConfig {
    /// Create a new config builder
    pub fn builder() -> FlowConfigBuilder {
        FlowConfigBuilder::default()
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: FlowConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values the flow cannot run with
    pub fn validate(&self) -> Result<()> {
        let url = UrlValidator::validate(&self.inbox_url).map_err(|reason| invalid("inbox_url", reason))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("inbox_url", "must be http or https"));
        }

        let address = self.address.trim();
        if address.is_empty() {
            return Err(invalid("address", "cannot be empty"));
        }
        if !address.contains('@') || address.starts_with('@') {
            return Err(invalid("address", format!("'{}' is not a mailbox address", address)));
        }

        if self.expected_fragment.trim().is_empty() {
            return Err(invalid("expected_fragment", "cannot be empty"));
        }

        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms", "must be greater than zero"));
        }
        if self.navigation_timeout_ms == 0 {
            return Err(invalid("navigation_timeout_ms", "must be greater than zero"));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > self.timeout_ms {
            return Err(invalid(
                "poll_interval_ms",
                format!("must be between 1 and timeout_ms ({})", self.timeout_ms),
            ));
        }

        if self.evidence_path.file_name().is_none() {
            return Err(invalid("evidence_path", "must name a file"));
        }
        if !(1..=100).contains(&self.evidence_quality) {
            return Err(invalid("evidence_quality", "must be between 1 and 100"));
        }

        for (field, name) in [
            ("selectors.inbox_frame", &self.selectors.inbox_frame),
            ("selectors.message_frame", &self.selectors.message_frame),
        ] {
            if name.trim().is_empty() {
                return Err(invalid(field, "frame name cannot be empty"));
            }
        }

        Ok(())
    }

    /// Per-condition wait budget
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval between polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Capture settings for the evidence image; the format follows the
    /// evidence path's extension
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions::for_path(&self.evidence_path)
            .with_quality(self.evidence_quality)
            .with_full_page(self.evidence_full_page)
    }

    /// Sibling of the evidence path used for failure captures:
    /// `shots/mail.png` becomes `shots/mail-failure.png`
    pub fn failure_evidence_path(&self) -> PathBuf {
        let stem = self
            .evidence_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "evidence".to_string());
        let name = match self.evidence_path.extension() {
            Some(ext) => format!("{}-failure.{}", stem, ext.to_string_lossy()),
            None => format!("{}-failure", stem),
        };
        self.evidence_path.with_file_name(name)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> crate::error::Error {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
    .into()
}

/// Builder for FlowConfig
#[derive(Default)]
pub struct FlowConfigBuilder {
    config: FlowConfig,
}

impl FlowConfigBuilder {
    /// Set the inbox page URL
    pub fn inbox_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.inbox_url = url.into();
        self
    }

    /// Set the mailbox under test
    pub fn address<S: Into<String>>(mut self, address: S) -> Self {
        self.config.address = address.into();
        self
    }

    /// Set the expected fragment
    pub fn expected_fragment<S: Into<String>>(mut self, fragment: S) -> Self {
        self.config.expected_fragment = fragment.into();
        self
    }

    /// Set the per-condition wait budget
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set the polling interval
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the navigation budget
    pub fn navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.navigation_timeout_ms = ms;
        self
    }

    /// Set the evidence destination
    pub fn evidence_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.evidence_path = path.into();
        self
    }

    /// Capture evidence on failure too
    pub fn capture_on_failure(mut self, enabled: bool) -> Self {
        self.config.capture_on_failure = enabled;
        self
    }

    /// Capture the whole page
    pub fn evidence_full_page(mut self, enabled: bool) -> Self {
        self.config.evidence_full_page = enabled;
        self
    }

    /// Set the JPEG/WebP quality
    pub fn evidence_quality(mut self, quality: u8) -> Self {
        self.config.evidence_quality = quality;
        self
    }

    /// Replace the selectors
    pub fn selectors(mut self, selectors: Selectors) -> Self {
        self.config.selectors = selectors;
        self
    }

    /// Build the config
    pub fn build(self) -> FlowConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::CaptureFormat;
    use crate::context::SelectorKind;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::io::Write;

    fn field_of(err: Error) -> &'static str {
        match err {
            Error::Config(ConfigError::Invalid { field, .. }) => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.inbox_url, "https://yopmail.com/wm");
        assert_eq!(config.address, "sibendu@yopmail.com");
        assert_eq!(config.timeout(), Duration::from_secs(20));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert!(!config.capture_on_failure);
        assert_eq!(config.selectors.inbox_frame, "ifinbox");
        assert_eq!(config.selectors.first_message.kind, SelectorKind::Css);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = FlowConfig::builder()
            .inbox_url("http://localhost:8080/wm")
            .address("qa@example.test")
            .expected_fragment("Reset your password")
            .timeout_ms(5000)
            .poll_interval_ms(100)
            .evidence_path("out/shot.jpg")
            .capture_on_failure(true)
            .build();

        assert_eq!(config.inbox_url, "http://localhost:8080/wm");
        assert_eq!(config.address, "qa@example.test");
        assert_eq!(config.timeout_ms, 5000);
        assert!(config.capture_on_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FlowConfig = serde_json::from_str(
            r#"{
                "address": "other@yopmail.com",
                "selectors": { "first_message": { "kind": "xpath", "value": "//button[1]" } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.address, "other@yopmail.com");
        assert_eq!(config.expected_fragment, DEFAULT_FRAGMENT);
        assert_eq!(
            config.selectors.first_message,
            ElementLocator::xpath("//button[1]")
        );
        assert_eq!(config.selectors.address_input, ElementLocator::id("login"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"expected_fragment": "Welcome aboard", "timeout_ms": 1000}}"#).unwrap();

        let config = FlowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.expected_fragment, "Welcome aboard");
        assert_eq!(config.timeout_ms, 1000);
    }

    #[test]
    fn test_from_file_errors() {
        let missing = FlowConfig::from_file(Path::new("/nonexistent/mailprobe.json"));
        assert!(matches!(missing, Err(Error::Config(ConfigError::Read { .. }))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let bad = FlowConfig::from_file(file.path());
        assert!(matches!(bad, Err(Error::Config(ConfigError::Parse { .. }))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: Vec<(FlowConfig, &str)> = vec![
            (FlowConfig::builder().inbox_url("yopmail.com").build(), "inbox_url"),
            (FlowConfig::builder().inbox_url("file:///tmp/x.html").build(), "inbox_url"),
            (FlowConfig::builder().address("").build(), "address"),
            (FlowConfig::builder().address("no-at-sign").build(), "address"),
            (FlowConfig::builder().expected_fragment("  ").build(), "expected_fragment"),
            (FlowConfig::builder().timeout_ms(0).build(), "timeout_ms"),
            (FlowConfig::builder().navigation_timeout_ms(0).build(), "navigation_timeout_ms"),
            (FlowConfig::builder().poll_interval_ms(0).build(), "poll_interval_ms"),
            (
                FlowConfig::builder().timeout_ms(100).poll_interval_ms(200).build(),
                "poll_interval_ms",
            ),
            (FlowConfig::builder().evidence_path("").build(), "evidence_path"),
            (FlowConfig::builder().evidence_quality(0).build(), "evidence_quality"),
            (FlowConfig::builder().evidence_quality(101).build(), "evidence_quality"),
        ];

        for (config, field) in cases {
            assert_eq!(field_of(config.validate().unwrap_err()), field);
        }
    }

    #[test]
    fn test_capture_options_follow_config() {
        let defaults = FlowConfig::default().capture_options();
        assert_eq!(defaults.format, CaptureFormat::Png);
        assert_eq!(defaults.quality, 85);
        assert!(!defaults.full_page);

        let config: FlowConfig = serde_json::from_str(
            r#"{
                "evidence_path": "shots/mail.jpg",
                "evidence_full_page": true,
                "evidence_quality": 60
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let opts = config.capture_options();
        assert_eq!(opts.format, CaptureFormat::Jpeg);
        assert_eq!(opts.quality, 60);
        assert!(opts.full_page);
    }

    #[test]
    fn test_failure_evidence_path() {
        let config = FlowConfig::default();
        assert_eq!(
            config.failure_evidence_path(),
            PathBuf::from("test-result-screenshots/email-screenshot-failure.png")
        );

        let config = FlowConfig::builder().evidence_path("shot").build();
        assert_eq!(config.failure_evidence_path(), PathBuf::from("shot-failure"));
    }

    proptest! {
        #[test]
        fn prop_poll_interval_never_exceeds_timeout(timeout in 1u64..100_000, poll in 1u64..100_000) {
            let config = FlowConfig::builder().timeout_ms(timeout).poll_interval_ms(poll).build();
            prop_assert_eq!(config.validate().is_ok(), poll <= timeout);
        }
    }
}
