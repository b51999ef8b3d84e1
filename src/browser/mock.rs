//! In-memory browser session
//!
//! [`MockSession`] models a page as a set of documents keyed by frame path.
//! Documents and elements become visible according to a [`Reveal`] rule,
//! measured from `open()` or from a click on a trigger element, which is
//! enough to reproduce the asynchronous loading an inbox page goes through.
//! Every action is journaled so tests can assert on ordering.

use crate::browser::capture::CaptureOptions;
use crate::browser::BrowserSession;
use crate::config::Selectors;
use crate::context::{ContextPath, ElementLocator, ElementState, SelectorKind};
use crate::error::{BrowserError, CaptureError, ContextError, NavigationError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// PNG signature followed by a marker; enough for non-empty evidence
const PLACEHOLDER_PNG: &[u8] = b"\x89PNG\r\n\x1a\nmailprobe-mock";

/// When a document or element becomes observable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reveal {
    /// As soon as the page is opened
    Immediate,
    /// A fixed delay after the page is opened
    After(Duration),
    /// A delay after the trigger element is first clicked
    AfterClick {
        /// Element whose click reveals this one
        trigger: ElementLocator,
        /// Delay after the click
        delay: Duration,
    },
    /// Never
    Never,
}

impl Reveal {
    /// Reveal right after `trigger` is clicked
    pub fn on_click(trigger: ElementLocator) -> Self {
        Reveal::AfterClick {
            trigger,
            delay: Duration::ZERO,
        }
    }
}

/// An element in a mock document
#[derive(Debug, Clone)]
pub struct MockElement {
    locator: ElementLocator,
    text: Option<String>,
    visible: bool,
    enabled: bool,
    reveal: Reveal,
}

impl MockElement {
    /// A visible, enabled element matched by `locator`
    pub fn new(locator: ElementLocator) -> Self {
        Self {
            locator,
            text: None,
            visible: true,
            enabled: true,
            reveal: Reveal::Immediate,
        }
    }

    /// Give the element text, matched by text-containment locators
    pub fn text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Render without a box
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set the reveal rule
    pub fn reveal(mut self, reveal: Reveal) -> Self {
        self.reveal = reveal;
        self
    }

    fn matches(&self, locator: &ElementLocator) -> bool {
        match locator.kind {
            SelectorKind::TextContains => self
                .text
                .as_deref()
                .is_some_and(|text| text.contains(locator.value.as_str())),
            _ => &self.locator == locator,
        }
    }
}

/// A document at one frame path
#[derive(Debug, Clone)]
pub struct MockDocument {
    elements: Vec<MockElement>,
    reveal: Reveal,
}

impl Default for MockDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDocument {
    /// An empty document revealed on open
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            reveal: Reveal::Immediate,
        }
    }

    /// Add an element
    pub fn element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Set the reveal rule for the whole document
    pub fn reveal(mut self, reveal: Reveal) -> Self {
        self.reveal = reveal;
        self
    }
}

/// A journaled session action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
    /// `open(url)`
    Open(String),
    /// `type_text`
    Type {
        /// Context path
        path: ContextPath,
        /// Target
        locator: ElementLocator,
        /// Text typed
        text: String,
    },
    /// `click`
    Click {
        /// Context path
        path: ContextPath,
        /// Target
        locator: ElementLocator,
    },
    /// `screenshot`
    Screenshot(ContextPath),
}

#[derive(Debug, Default)]
struct MockState {
    opened_at: Option<Instant>,
    clicks: HashMap<ElementLocator, Instant>,
    journal: Vec<MockAction>,
    probes: u64,
}

impl MockState {
    fn revealed(&self, reveal: &Reveal, now: Instant) -> bool {
        let Some(opened_at) = self.opened_at else {
            return false;
        };
        match reveal {
            Reveal::Immediate => true,
            Reveal::After(delay) => opened_at + *delay <= now,
            Reveal::AfterClick { trigger, delay } => self
                .clicks
                .get(trigger)
                .is_some_and(|clicked| *clicked + *delay <= now),
            Reveal::Never => false,
        }
    }
}

/// Builder for [`MockSession`]
#[derive(Debug, Default)]
pub struct MockSessionBuilder {
    documents: HashMap<ContextPath, MockDocument>,
    navigation_failure: Option<String>,
    screenshot_failure: Option<String>,
    screenshot: Option<Vec<u8>>,
}

impl MockSessionBuilder {
    /// Set (or replace) the document at `path`
    pub fn document(mut self, path: ContextPath, document: MockDocument) -> Self {
        self.documents.insert(path, document);
        self
    }

    /// Make `open()` fail with a load error
    pub fn navigation_failure<S: Into<String>>(mut self, reason: S) -> Self {
        self.navigation_failure = Some(reason.into());
        self
    }

    /// Make `screenshot()` fail
    pub fn screenshot_failure<S: Into<String>>(mut self, reason: S) -> Self {
        self.screenshot_failure = Some(reason.into());
        self
    }

    /// Bytes returned by `screenshot()`
    pub fn screenshot_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Some(bytes);
        self
    }

    /// Build the session
    pub fn build(mut self) -> MockSession {
        self.documents.entry(ContextPath::top()).or_default();
        MockSession {
            documents: self.documents,
            navigation_failure: self.navigation_failure,
            screenshot_failure: self.screenshot_failure,
            screenshot: self
                .screenshot
                .unwrap_or_else(|| PLACEHOLDER_PNG.to_vec()),
            state: Mutex::new(MockState::default()),
        }
    }
}

/// Deterministic in-memory [`BrowserSession`]
#[derive(Debug)]
pub struct MockSession {
    documents: HashMap<ContextPath, MockDocument>,
    navigation_failure: Option<String>,
    screenshot_failure: Option<String>,
    screenshot: Vec<u8>,
    state: Mutex<MockState>,
}

impl MockSession {
    /// Start building a session
    pub fn builder() -> MockSessionBuilder {
        MockSessionBuilder::default()
    }

    /// A disposable-mailbox page laid out as `selectors` describe.
    ///
    /// The inbox list frame loads once the refresh trigger is clicked and
    /// the message frame once the first message row is clicked. The message
    /// body holds `message_text`.
    pub fn inbox_builder(selectors: &Selectors, message_text: &str) -> MockSessionBuilder {
        let top = ContextPath::top();
        let list = top.child(&selectors.inbox_frame);
        let message = top.child(&selectors.message_frame);

        let mut message_doc = MockDocument::new()
            .reveal(Reveal::on_click(selectors.first_message.clone()))
            .element(MockElement::new(ElementLocator::css("div.ellipsis")).text("Test subject"));
        if let Some(ref body) = selectors.message_body {
            message_doc = message_doc.element(MockElement::new(body.clone()));
        }
        message_doc = message_doc.element(MockElement::new(ElementLocator::css("p")).text(message_text));

        Self::builder()
            .document(
                top,
                MockDocument::new()
                    .element(MockElement::new(selectors.address_input.clone()))
                    .element(MockElement::new(selectors.refresh_trigger.clone())),
            )
            .document(
                list,
                MockDocument::new()
                    .reveal(Reveal::on_click(selectors.refresh_trigger.clone()))
                    .element(MockElement::new(selectors.first_message.clone()).text("Test subject")),
            )
            .document(message, message_doc)
    }

    /// Actions performed so far, in order
    pub async fn journal(&self) -> Vec<MockAction> {
        self.state.lock().await.journal.clone()
    }

    /// Number of `probe` and `frame_available` calls so far
    pub async fn probe_count(&self) -> u64 {
        self.state.lock().await.probes
    }

    fn document(&self, state: &MockState, path: &ContextPath, now: Instant) -> Result<&MockDocument> {
        self.documents
            .get(path)
            .filter(|doc| state.revealed(&doc.reveal, now))
            .ok_or_else(|| ContextError::Detached(path.to_string()).into())
    }

    fn find<'a>(
        &'a self,
        state: &MockState,
        path: &ContextPath,
        locator: &ElementLocator,
        now: Instant,
    ) -> Result<Option<&'a MockElement>> {
        let doc = self.document(state, path, now)?;
        Ok(doc
            .elements
            .iter()
            .find(|el| el.matches(locator) && state.revealed(&el.reveal, now)))
    }

    fn missing(path: &ContextPath, locator: &ElementLocator) -> crate::error::Error {
        BrowserError::ElementMissing(format!("{} in {}", locator, path)).into()
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn open(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.journal.push(MockAction::Open(url.to_string()));
        if let Some(ref reason) = self.navigation_failure {
            return Err(NavigationError::LoadFailed(reason.clone()).into());
        }
        state.opened_at = Some(Instant::now());
        state.clicks.clear();
        Ok(())
    }

    async fn probe(&self, path: &ContextPath, locator: &ElementLocator) -> Result<ElementState> {
        let mut state = self.state.lock().await;
        state.probes += 1;
        let now = Instant::now();
        Ok(match self.find(&state, path, locator, now)? {
            Some(el) => ElementState {
                present: true,
                visible: el.visible,
                enabled: el.enabled,
            },
            None => ElementState::absent(),
        })
    }

    async fn frame_available(&self, parent: &ContextPath, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.probes += 1;
        let now = Instant::now();
        self.document(&state, parent, now)?;
        let child = parent.child(name);
        Ok(self.document(&state, &child, now).is_ok())
    }

    async fn click(&self, path: &ContextPath, locator: &ElementLocator) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if self.find(&state, path, locator, now)?.is_none() {
            return Err(Self::missing(path, locator));
        }
        state.journal.push(MockAction::Click {
            path: path.clone(),
            locator: locator.clone(),
        });
        state.clicks.entry(locator.clone()).or_insert(now);
        Ok(())
    }

    async fn type_text(
        &self,
        path: &ContextPath,
        locator: &ElementLocator,
        text: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if self.find(&state, path, locator, now)?.is_none() {
            return Err(Self::missing(path, locator));
        }
        state.journal.push(MockAction::Type {
            path: path.clone(),
            locator: locator.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn screenshot(&self, path: &ContextPath, _options: &CaptureOptions) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        state.journal.push(MockAction::Screenshot(path.clone()));
        if let Some(ref reason) = self.screenshot_failure {
            return Err(CaptureError::ScreenshotFailed(reason.clone()).into());
        }
        Ok(self.screenshot.clone())
    }
}
