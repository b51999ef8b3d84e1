//! Page navigation functionality
//!
//! This module handles URL validation and top-level navigation with a
//! readiness wait. Navigation is attempted once: a page that cannot be
//! reached is a fatal error for the run.

use crate::browser::PageHandle;
use crate::error::{NavigationError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use url::Url;

/// Resolves once the document has fired its load event
const LOAD_READY_SCRIPT: &str = r#"
    new Promise(resolve => {
        if (document.readyState === 'complete') {
            resolve(true);
        } else {
            window.addEventListener('load', () => resolve(true));
        }
    })
"#;

/// Options for page navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOptions {
    /// Budget for the load and the readiness wait, each (default: 30000)
    pub timeout_ms: u64,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}

impl NavigationOptions {
    /// Options with a specific timeout
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// URL validation utilities
pub struct UrlValidator;

impl UrlValidator {
    /// Validate a URL for navigation
    pub fn validate(url: &str) -> std::result::Result<Url, String> {
        if url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }

        // Check URL length (max 2048 characters is common limit)
        if url.len() > 2048 {
            return Err("URL exceeds maximum length of 2048 characters".to_string());
        }

        let parsed = Url::parse(url).map_err(|e| format!("{}: {}", e, url))?;
        match parsed.scheme() {
            "http" | "https" | "file" => {}
            other => {
                return Err(format!(
                    "URL must use http, https, or file, not {}: {}",
                    other, url
                ))
            }
        }

        if parsed.scheme() != "file" && parsed.host_str().is_none() {
            return Err(format!("URL has no host: {}", url));
        }

        Ok(parsed)
    }
}

/// Top-level page navigation
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate to a URL and wait for the load event
    #[instrument(skip(page, opts))]
    pub async fn goto(page: &PageHandle, url: &str, opts: &NavigationOptions) -> Result<()> {
        let start = Instant::now();

        UrlValidator::validate(url).map_err(NavigationError::InvalidUrl)?;

        info!("Navigating to: {}", url);

        tokio::time::timeout(opts.timeout(), page.inner().goto(url))
            .await
            .map_err(|_| NavigationError::Timeout(opts.timeout_ms))?
            .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;

        tokio::time::timeout(opts.timeout(), page.inner().evaluate(LOAD_READY_SCRIPT))
            .await
            .map_err(|_| NavigationError::Timeout(opts.timeout_ms))?
            .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;

        debug!("Loaded {} in {}ms", url, start.elapsed().as_millis());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_options() {
        assert_eq!(NavigationOptions::default().timeout(), Duration::from_secs(30));
        assert_eq!(
            NavigationOptions::with_timeout(5000),
            NavigationOptions { timeout_ms: 5000 }
        );
    }

    #[test]
    fn test_ready_script_waits_for_load() {
        assert!(LOAD_READY_SCRIPT.contains("document.readyState === 'complete'"));
        assert!(LOAD_READY_SCRIPT.contains("addEventListener('load'"));
        assert!(!LOAD_READY_SCRIPT.contains("DOMContentLoaded"));
    }

    #[test]
    fn test_url_validation_valid_https() {
        let url = UrlValidator::validate("https://yopmail.com/wm").unwrap();
        assert_eq!(url.host_str(), Some("yopmail.com"));
    }

    #[test]
    fn test_url_validation_valid_file() {
        assert!(UrlValidator::validate("file:///tmp/inbox.html").is_ok());
    }

    #[test]
    fn test_url_validation_empty() {
        let result = UrlValidator::validate("");
        assert!(result.unwrap_err().contains("empty"));
    }

    #[test]
    fn test_url_validation_no_protocol() {
        assert!(UrlValidator::validate("yopmail.com/wm").is_err());
    }

    #[test]
    fn test_url_validation_invalid_protocol() {
        let result = UrlValidator::validate("ftp://example.com");
        assert!(result.unwrap_err().contains("not ftp"));
    }

    #[test]
    fn test_url_validation_too_long() {
        let long_url = format!("https://example.com/{}", "a".repeat(3000));
        let result = UrlValidator::validate(&long_url);
        assert!(result.unwrap_err().contains("maximum length"));
    }

    #[test]
    fn test_url_validation_with_query_params() {
        assert!(UrlValidator::validate("https://yopmail.com/wm?login=someone").is_ok());
    }
}
