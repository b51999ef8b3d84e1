//! Frame contexts and element locators
//!
//! Element lookups always resolve against exactly one [`RenderContext`]: the
//! top document or a document nested inside it through named frames. The
//! [`FrameNavigator`] owns the active context and hands out a new generation
//! on every switch. Elements are stamped with the generation they were
//! resolved in, so an element carried across a switch is rejected instead of
//! silently acting on the wrong document.

use crate::browser::BrowserSession;
use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// How a selector value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// CSS selector
    Css,
    /// Element id
    Id,
    /// XPath expression
    #[serde(rename = "xpath")]
    XPath,
    /// Any element whose own text contains the value
    TextContains,
}

impl SelectorKind {
    /// Short label used in logs and error messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Id => "id",
            Self::XPath => "xpath",
            Self::TextContains => "text",
        }
    }
}

/// A (selector kind, selector value) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementLocator {
    /// How `value` is interpreted
    pub kind: SelectorKind,
    /// The selector itself
    pub value: String,
}

impl ElementLocator {
    /// Locate by CSS selector
    pub fn css<S: Into<String>>(selector: S) -> Self {
        Self {
            kind: SelectorKind::Css,
            value: selector.into(),
        }
    }

    /// Locate by element id
    pub fn id<S: Into<String>>(id: S) -> Self {
        Self {
            kind: SelectorKind::Id,
            value: id.into(),
        }
    }

    /// Locate by XPath expression
    pub fn xpath<S: Into<String>>(expr: S) -> Self {
        Self {
            kind: SelectorKind::XPath,
            value: expr.into(),
        }
    }

    /// Locate the first element whose text contains `fragment`
    pub fn text_contains<S: Into<String>>(fragment: S) -> Self {
        Self {
            kind: SelectorKind::TextContains,
            value: fragment.into(),
        }
    }

    /// The XPath expression a text-containment locator compiles to
    pub fn text_xpath(fragment: &str) -> String {
        format!("//*[contains(text(), {})]", xpath_literal(fragment))
    }
}

impl fmt::Display for ElementLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind.label(), self.value)
    }
}

/// Quote a string as an XPath 1.0 literal.
///
/// XPath 1.0 has no escape sequences, so a value holding both quote kinds is
/// split into pieces joined with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }

    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Frame names leading from the top document to a nested document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextPath(Vec<String>);

impl ContextPath {
    /// The top-level document
    pub fn top() -> Self {
        Self(Vec::new())
    }

    /// Whether this is the top-level document
    pub fn is_top(&self) -> bool {
        self.0.is_empty()
    }

    /// Frame names, outermost first
    pub fn frames(&self) -> &[String] {
        &self.0
    }

    /// Path of a frame nested directly under this one
    pub fn child(&self, name: &str) -> Self {
        let mut frames = self.0.clone();
        frames.push(name.to_string());
        Self(frames)
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "top")
        } else {
            write!(f, "top/{}", self.0.join("/"))
        }
    }
}

/// The active scope for element lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    path: ContextPath,
    generation: u64,
}

impl RenderContext {
    /// Frame path of this context
    pub fn path(&self) -> &ContextPath {
        &self.path
    }

    /// Switch counter at the time this context became active
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path, self.generation)
    }
}

/// A single observation of an element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    /// A matching element exists in the document
    pub present: bool,
    /// It has a rendered box and is not hidden by style
    pub visible: bool,
    /// It is not disabled
    pub enabled: bool,
}

impl ElementState {
    /// No matching element
    pub fn absent() -> Self {
        Self::default()
    }

    /// Present, visible and enabled
    pub fn interactable() -> Self {
        Self {
            present: true,
            visible: true,
            enabled: true,
        }
    }

    /// Whether a click would land
    pub fn is_clickable(&self) -> bool {
        self.present && self.visible && self.enabled
    }
}

/// An element confirmed to exist in a specific context.
///
/// Only the condition waiter constructs these; callers cannot skip the wait.
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    locator: ElementLocator,
    context: RenderContext,
    state: ElementState,
}

impl ResolvedElement {
    pub(crate) fn new(locator: ElementLocator, context: RenderContext, state: ElementState) -> Self {
        Self {
            locator,
            context,
            state,
        }
    }

    /// Locator this element was resolved with
    pub fn locator(&self) -> &ElementLocator {
        &self.locator
    }

    /// Context the element was resolved in
    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// State observed when the wait succeeded
    pub fn state(&self) -> ElementState {
        self.state
    }
}

/// Tracks the active frame context and performs transitions
#[derive(Debug, Default)]
pub struct FrameNavigator {
    active: RenderContext,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            path: ContextPath::top(),
            generation: 0,
        }
    }
}

impl FrameNavigator {
    /// Start at the top document
    pub fn new() -> Self {
        Self::default()
    }

    /// The context lookups currently resolve against
    pub fn active(&self) -> &RenderContext {
        &self.active
    }

    /// Switch into a frame nested in the active context.
    ///
    /// Does not wait: the frame must already be available, which callers
    /// establish with a `FrameAvailable` wait first.
    #[instrument(skip(self, session), fields(from = %self.active))]
    pub async fn switch_to<S>(&mut self, session: &S, name: &str) -> Result<&RenderContext>
    where
        S: BrowserSession + ?Sized,
    {
        if !session.frame_available(self.active.path(), name).await? {
            return Err(ContextError::NotFound {
                name: name.to_string(),
                parent: self.active.path.to_string(),
            }
            .into());
        }

        let path = self.active.path.child(name);
        self.transition(path);
        Ok(&self.active)
    }

    /// Return to the top document. Always succeeds.
    pub fn switch_to_top(&mut self) -> &RenderContext {
        self.transition(ContextPath::top());
        &self.active
    }

    fn transition(&mut self, path: ContextPath) {
        self.active = RenderContext {
            path,
            generation: self.active.generation + 1,
        };
        debug!("Active context is now {}", self.active);
    }

    /// Reject elements resolved before the last transition
    pub fn ensure_current(&self, element: &ResolvedElement) -> Result<()> {
        if element.context.generation != self.active.generation {
            return Err(ContextError::StaleElement {
                locator: element.locator.to_string(),
                resolved_in: element.context.generation,
                active: self.active.generation,
            }
            .into());
        }
        Ok(())
    }

    /// Click an element resolved in the active context
    #[instrument(skip(self, session, element), fields(locator = %element.locator))]
    pub async fn click<S>(&self, session: &S, element: &ResolvedElement) -> Result<()>
    where
        S: BrowserSession + ?Sized,
    {
        self.ensure_current(element)?;
        session.click(self.active.path(), &element.locator).await
    }

    /// Type into an element resolved in the active context
    #[instrument(skip(self, session, element, text), fields(locator = %element.locator))]
    pub async fn type_text<S>(&self, session: &S, element: &ResolvedElement, text: &str) -> Result<()>
    where
        S: BrowserSession + ?Sized,
    {
        self.ensure_current(element)?;
        session
            .type_text(self.active.path(), &element.locator, text)
            .await
    }
}
