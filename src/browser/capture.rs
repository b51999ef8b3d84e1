//! Evidence capture
//!
//! Renders the active context to an image once per run and persists it to
//! a caller-supplied path. Capture and persistence are separate steps so a
//! write failure can be reported without losing the rendered bytes.

use crate::browser::BrowserSession;
use crate::config::DEFAULT_EVIDENCE_QUALITY;
use crate::context::{ContextPath, RenderContext};
use crate::error::{CaptureError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Image format for captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureFormat {
    /// PNG screenshot
    #[default]
    Png,
    /// JPEG screenshot
    Jpeg,
    /// WebP screenshot
    Webp,
}

impl CaptureFormat {
    /// Get appropriate MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            CaptureFormat::Png => "image/png",
            CaptureFormat::Jpeg => "image/jpeg",
            CaptureFormat::Webp => "image/webp",
        }
    }

    /// Get file extension
    pub fn extension(&self) -> &'static str {
        match self {
            CaptureFormat::Png => "png",
            CaptureFormat::Jpeg => "jpg",
            CaptureFormat::Webp => "webp",
        }
    }

    /// Guess the format from a file extension, defaulting to PNG
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => CaptureFormat::Jpeg,
            Some("webp") => CaptureFormat::Webp,
            _ => CaptureFormat::Png,
        }
    }
}

/// Options for capture operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Capture format
    pub format: CaptureFormat,
    /// JPEG/WebP quality (1-100)
    pub quality: u8,
    /// Capture beyond the viewport
    pub full_page: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            format: CaptureFormat::Png,
            quality: DEFAULT_EVIDENCE_QUALITY,
            full_page: false,
        }
    }
}

impl CaptureOptions {
    /// Options matching the extension of the destination path
    pub fn for_path(path: &Path) -> Self {
        Self {
            format: CaptureFormat::from_path(path),
            ..Default::default()
        }
    }

    /// Set the JPEG/WebP quality
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Capture beyond the viewport
    pub fn with_full_page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }
}

/// A rendered snapshot of one context. Never mutated after capture.
#[derive(Debug, Clone)]
pub struct EvidenceArtifact {
    data: Vec<u8>,
    format: CaptureFormat,
    context: ContextPath,
    captured_at: DateTime<Utc>,
}

impl EvidenceArtifact {
    /// The image bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Image format
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Context that was active when rendered
    pub fn context(&self) -> &ContextPath {
        &self.context
    }

    /// When the capture happened
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Where an artifact ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEvidence {
    /// Destination path
    pub path: PathBuf,
    /// Bytes written
    pub bytes: usize,
}

/// Renders and persists evidence
#[derive(Debug, Clone, Default)]
pub struct EvidenceCapture {
    options: CaptureOptions,
}

impl EvidenceCapture {
    /// Capture with the given options
    pub fn new(options: CaptureOptions) -> Self {
        Self { options }
    }

    /// Render the active context
    #[instrument(skip(self, session, context), fields(context = %context))]
    pub async fn capture<S>(&self, session: &S, context: &RenderContext) -> Result<EvidenceArtifact>
    where
        S: BrowserSession + ?Sized,
    {
        let data = session.screenshot(context.path(), &self.options).await?;
        if data.is_empty() {
            return Err(CaptureError::Empty.into());
        }

        debug!("Captured {} bytes of {}", data.len(), self.options.format.mime_type());

        Ok(EvidenceArtifact {
            data,
            format: self.options.format,
            context: context.path().clone(),
            captured_at: Utc::now(),
        })
    }

    /// Write an artifact to `path`.
    ///
    /// The parent directory must already exist.
    #[instrument(skip(artifact), fields(bytes = artifact.size()))]
    pub async fn persist(artifact: &EvidenceArtifact, path: &Path) -> Result<PersistedEvidence> {
        tokio::fs::write(path, artifact.data())
            .await
            .map_err(|source| CaptureError::PersistFailed {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Evidence written to {}", path.display());

        Ok(PersistedEvidence {
            path: path.to_path_buf(),
            bytes: artifact.size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::MockSession;
    use crate::context::FrameNavigator;
    use crate::error::Error;

    fn artifact(data: &[u8]) -> EvidenceArtifact {
        EvidenceArtifact {
            data: data.to_vec(),
            format: CaptureFormat::Png,
            context: ContextPath::top().child("ifmail"),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_capture_options_default() {
        let opts = CaptureOptions::default();
        assert_eq!(opts.format, CaptureFormat::Png);
        assert_eq!(opts.quality, 85);
        assert!(!opts.full_page);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            CaptureFormat::from_path(Path::new("shots/mail.png")),
            CaptureFormat::Png
        );
        assert_eq!(
            CaptureFormat::from_path(Path::new("shots/mail.JPG")),
            CaptureFormat::Jpeg
        );
        assert_eq!(
            CaptureFormat::from_path(Path::new("shots/mail.webp")),
            CaptureFormat::Webp
        );
        assert_eq!(
            CaptureFormat::from_path(Path::new("shots/mail")),
            CaptureFormat::Png
        );
    }

    #[test]
    fn test_format_mime_and_extension() {
        assert_eq!(CaptureFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(CaptureFormat::Jpeg.extension(), "jpg");
        assert_eq!(CaptureFormat::Png.extension(), "png");
    }

    #[tokio::test]
    async fn test_capture_records_active_context() {
        let session = MockSession::builder().build();
        let nav = FrameNavigator::new();
        let capture = EvidenceCapture::default();

        let artifact = capture.capture(&session, nav.active()).await.unwrap();
        assert!(artifact.size() > 0);
        assert!(artifact.context().is_top());
        assert_eq!(artifact.format(), CaptureFormat::Png);
    }

    #[tokio::test]
    async fn test_capture_rejects_empty_image() {
        let session = MockSession::builder().screenshot_bytes(Vec::new()).build();
        let nav = FrameNavigator::new();

        let err = EvidenceCapture::default()
            .capture(&session, nav.active())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capture(CaptureError::Empty)));
    }

    #[tokio::test]
    async fn test_persist_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email.png");

        let written = EvidenceCapture::persist(&artifact(b"png-bytes"), &path)
            .await
            .unwrap();
        assert_eq!(written.bytes, 9);
        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_persist_missing_parent_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("email.png");

        let err = EvidenceCapture::persist(&artifact(b"x"), &path)
            .await
            .unwrap_err();
        match err {
            Error::Capture(CaptureError::PersistFailed { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
