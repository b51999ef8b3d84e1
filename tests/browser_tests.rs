//! Browser module tests
//!
//! These tests verify the browser configuration, capture, navigation and
//! session-level behaviour that does not need a running browser.
//! Note: CdpSession is only exercised against a real Chrome/Chromium instance.

use mailprobe_web::browser::{
    BrowserConfig, BrowserSession, CaptureFormat, CaptureOptions, EvidenceCapture, MockAction,
    MockDocument, MockElement, MockSession, NavigationOptions, UrlValidator,
};
use mailprobe_web::context::{ContextPath, ElementLocator, FrameNavigator};
use mailprobe_web::error::{ContextError, Error};
use std::path::Path;

#[test]
fn test_browser_config_default() {
    let config = BrowserConfig::default();
    assert!(config.headless);
    assert_eq!(config.width, 1280);
    assert_eq!(config.height, 720);
    assert!(config.maximized);
    assert!(config.sandbox);
    assert!(config.user_agent.is_none());
    assert!(config.chrome_path.is_none());
    assert!(config.extra_args.is_empty());
}

#[test]
fn test_browser_config_launch_args() {
    let config = BrowserConfig::builder()
        .headless(false)
        .sandbox(false)
        .user_agent("TestBot/1.0")
        .arg("--disable-gpu")
        .build();

    assert_eq!(
        config.launch_args(),
        vec![
            "--start-maximized".to_string(),
            "--no-sandbox".to_string(),
            "--user-agent=TestBot/1.0".to_string(),
            "--disable-gpu".to_string(),
        ]
    );
}

#[test]
fn test_maximized_only_when_headed() {
    let headed = BrowserConfig::builder().headless(false).build();
    assert_eq!(headed.launch_args(), vec!["--start-maximized".to_string()]);

    let headless = BrowserConfig::default();
    assert!(headless.maximized);
    assert!(headless.launch_args().is_empty());

    let headed = BrowserConfig::builder().headless(false).maximized(false).build();
    assert!(headed.launch_args().is_empty());
}

#[test]
fn test_capture_options_follow_path() {
    let opts = CaptureOptions::for_path(Path::new("test-result-screenshots/email.jpeg"));
    assert_eq!(opts.format, CaptureFormat::Jpeg);
    assert_eq!(opts.quality, 85);
    assert!(!opts.full_page);

    let opts = CaptureOptions::for_path(Path::new("mail.webp"))
        .with_quality(40)
        .with_full_page(true);
    assert_eq!(opts.format, CaptureFormat::Webp);
    assert_eq!(opts.quality, 40);
    assert!(opts.full_page);
}

#[test]
fn test_navigation_options() {
    assert_eq!(NavigationOptions::default().timeout_ms, 30000);
    assert_eq!(NavigationOptions::with_timeout(5000).timeout_ms, 5000);
}

#[test]
fn test_url_validation() {
    assert!(UrlValidator::validate("https://yopmail.com/wm").is_ok());
    assert!(UrlValidator::validate("http://localhost:8080/inbox").is_ok());
    assert!(UrlValidator::validate("file:///tmp/inbox.html").is_ok());

    assert!(UrlValidator::validate("").is_err());
    assert!(UrlValidator::validate("not a url").is_err());
    assert!(UrlValidator::validate("ftp://example.com").is_err());
    assert!(UrlValidator::validate(&format!("https://example.com/{}", "a".repeat(2100))).is_err());
}

#[tokio::test]
async fn test_evidence_from_message_frame() {
    let dir = tempfile::tempdir().unwrap();
    let session = MockSession::builder()
        .document(
            ContextPath::top(),
            MockDocument::new().element(MockElement::new(ElementLocator::id("login"))),
        )
        .document(ContextPath::top().child("ifmail"), MockDocument::new())
        .build();
    session.open("https://yopmail.com/wm").await.unwrap();

    let mut nav = FrameNavigator::new();
    nav.switch_to(&session, "ifmail").await.unwrap();

    let path = dir.path().join("email-screenshot.png");
    let capture = EvidenceCapture::new(CaptureOptions::for_path(&path));
    let artifact = capture.capture(&session, nav.active()).await.unwrap();
    let written = EvidenceCapture::persist(&artifact, &path).await.unwrap();

    assert_eq!(written.bytes, artifact.size());
    assert_eq!(artifact.context(), &ContextPath::top().child("ifmail"));
    assert_eq!(
        session.journal().await.last(),
        Some(&MockAction::Screenshot(ContextPath::top().child("ifmail")))
    );
}

#[tokio::test]
async fn test_probe_of_unloaded_frame_is_detached() {
    let session = MockSession::builder().build();
    session.open("https://yopmail.com/wm").await.unwrap();

    let err = session
        .probe(&ContextPath::top().child("ifinbox"), &ElementLocator::css(".m"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Context(ContextError::Detached(_))));
}
