//! Frame-scoped browser session
//!
//! [`BrowserSession`] is the boundary between the inbox flow and whatever
//! renders pages. Every element operation names the frame path it runs in;
//! sessions keep no notion of a "current frame" of their own.

use crate::browser::capture::{CaptureFormat, CaptureOptions};
use crate::browser::navigation::{NavigationOptions, PageNavigator};
use crate::browser::PageHandle;
use crate::context::{ContextPath, ElementLocator, ElementState, SelectorKind};
use crate::error::{BrowserError, CaptureError, ContextError, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Operations the inbox flow needs from a browser page
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` in the top-level page
    async fn open(&self, url: &str) -> Result<()>;

    /// Observe the first element matching `locator` in the document at `path`.
    ///
    /// A missing element is reported as [`ElementState::absent`], not an error.
    async fn probe(&self, path: &ContextPath, locator: &ElementLocator) -> Result<ElementState>;

    /// Whether a loaded frame called `name` exists in the document at `parent`
    async fn frame_available(&self, parent: &ContextPath, name: &str) -> Result<bool>;

    /// Click the first element matching `locator`
    async fn click(&self, path: &ContextPath, locator: &ElementLocator) -> Result<()>;

    /// Replace the value of the first element matching `locator`
    async fn type_text(&self, path: &ContextPath, locator: &ElementLocator, text: &str)
        -> Result<()>;

    /// Render the visible viewport while `path` is the active context
    async fn screenshot(&self, path: &ContextPath, options: &CaptureOptions) -> Result<Vec<u8>>;
}

/// Resolves `doc` to the document at the given frame chain, or returns early
/// with `{ detached: true }`.
const RESOLVE_DOCUMENT: &str = r#"
    let doc = document;
    for (const name of frames) {
        const frame = Array.from(doc.querySelectorAll('iframe, frame'))
            .find(f => f.name === name || f.id === name);
        if (!frame || !frame.contentDocument) {
            return { detached: true };
        }
        doc = frame.contentDocument;
    }
"#;

/// Resolves `el` to the first match of `query` in `doc` (or null).
const RESOLVE_ELEMENT: &str = r#"
    let el = null;
    if (query.mode === 'css') {
        el = doc.querySelector(query.value);
    } else if (query.mode === 'id') {
        el = doc.getElementById(query.value);
    } else {
        el = doc.evaluate(query.value, doc, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null)
            .singleNodeValue;
    }
"#;

const PROBE_ACTION: &str = r#"
    if (!el) {
        return { present: false };
    }
    const style = (doc.defaultView || window).getComputedStyle(el);
    const boxed = el.getClientRects().length > 0;
    return {
        present: true,
        visible: boxed && style.visibility !== 'hidden' && style.display !== 'none',
        enabled: !el.disabled
    };
"#;

const CLICK_ACTION: &str = r#"
    if (!el) {
        return { present: false };
    }
    el.scrollIntoView({ block: 'center' });
    el.click();
    return { present: true, done: true };
"#;

const TYPE_ACTION: &str = r#"
    if (!el) {
        return { present: false };
    }
    el.focus();
    el.value = text;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return { present: true, done: true };
"#;

/// What every session script returns
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScriptOutcome {
    detached: bool,
    present: bool,
    visible: bool,
    enabled: bool,
    done: bool,
}

/// Selector as the page scripts understand it: text matches become XPath
fn script_query(locator: &ElementLocator) -> serde_json::Value {
    let (mode, value) = match locator.kind {
        SelectorKind::Css => ("css", locator.value.clone()),
        SelectorKind::Id => ("id", locator.value.clone()),
        SelectorKind::XPath => ("xpath", locator.value.clone()),
        SelectorKind::TextContains => ("xpath", ElementLocator::text_xpath(&locator.value)),
    };
    serde_json::json!({ "mode": mode, "value": value })
}

/// Build a self-invoking script that resolves the frame chain, then runs `body`.
///
/// All caller data is embedded as JSON literals.
fn scoped_script(path: &ContextPath, bindings: &[(&str, serde_json::Value)], body: &str) -> String {
    let mut script = String::from("(() => {\n");
    script.push_str(&format!(
        "    const frames = {};\n",
        serde_json::Value::from(path.frames().to_vec())
    ));
    for (name, value) in bindings {
        script.push_str(&format!("    const {} = {};\n", name, value));
    }
    script.push_str(RESOLVE_DOCUMENT);
    script.push_str(body);
    script.push_str("})()");
    script
}

fn element_script(path: &ContextPath, locator: &ElementLocator, action: &str) -> String {
    element_script_with(path, locator, Vec::new(), action)
}

fn element_script_with(
    path: &ContextPath,
    locator: &ElementLocator,
    mut bindings: Vec<(&str, serde_json::Value)>,
    action: &str,
) -> String {
    bindings.insert(0, ("query", script_query(locator)));
    let body = format!("{}{}", RESOLVE_ELEMENT, action);
    scoped_script(path, &bindings, &body)
}

fn frame_script(parent: &ContextPath, name: &str) -> String {
    let body = r#"
    const frame = Array.from(doc.querySelectorAll('iframe, frame'))
        .find(f => f.name === target || f.id === target);
    const inner = frame ? frame.contentDocument : null;
    return { present: !!inner && inner.readyState === 'complete' };
"#;
    scoped_script(parent, &[("target", serde_json::Value::from(name))], body)
}

/// [`BrowserSession`] backed by a Chrome DevTools Protocol page
pub struct CdpSession {
    page: PageHandle,
    navigation: NavigationOptions,
}

impl CdpSession {
    /// Wrap an open page
    pub fn new(page: PageHandle, navigation: NavigationOptions) -> Self {
        Self { page, navigation }
    }

    /// The underlying page handle
    pub fn page(&self) -> &PageHandle {
        &self.page
    }

    async fn run(&self, path: &ContextPath, script: String) -> Result<ScriptOutcome> {
        let outcome: ScriptOutcome = self
            .page
            .inner()
            .evaluate(script.as_str())
            .await?
            .into_value()
            .map_err(|e| BrowserError::ScriptResult(e.to_string()))?;

        if outcome.detached {
            return Err(ContextError::Detached(path.to_string()).into());
        }
        Ok(outcome)
    }

    async fn act(&self, path: &ContextPath, locator: &ElementLocator, script: String) -> Result<()> {
        let outcome = self.run(path, script).await?;
        if !outcome.done {
            return Err(BrowserError::ElementMissing(format!("{} in {}", locator, path)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    #[instrument(skip(self))]
    async fn open(&self, url: &str) -> Result<()> {
        PageNavigator::goto(&self.page, url, &self.navigation).await
    }

    async fn probe(&self, path: &ContextPath, locator: &ElementLocator) -> Result<ElementState> {
        let outcome = self
            .run(path, element_script(path, locator, PROBE_ACTION))
            .await?;
        Ok(ElementState {
            present: outcome.present,
            visible: outcome.visible,
            enabled: outcome.enabled,
        })
    }

    async fn frame_available(&self, parent: &ContextPath, name: &str) -> Result<bool> {
        let outcome = self.run(parent, frame_script(parent, name)).await?;
        Ok(outcome.present)
    }

    #[instrument(skip(self, path, locator), fields(path = %path, locator = %locator))]
    async fn click(&self, path: &ContextPath, locator: &ElementLocator) -> Result<()> {
        debug!("Clicking {}", locator);
        self.act(path, locator, element_script(path, locator, CLICK_ACTION))
            .await
    }

    #[instrument(skip(self, path, locator, text), fields(path = %path, locator = %locator))]
    async fn type_text(
        &self,
        path: &ContextPath,
        locator: &ElementLocator,
        text: &str,
    ) -> Result<()> {
        debug!("Typing {} chars into {}", text.chars().count(), locator);
        let script = element_script_with(
            path,
            locator,
            vec![("text", serde_json::Value::from(text))],
            TYPE_ACTION,
        );
        self.act(path, locator, script).await
    }

    #[instrument(skip(self, path, options), fields(path = %path))]
    async fn screenshot(&self, path: &ContextPath, options: &CaptureOptions) -> Result<Vec<u8>> {
        let format = match options.format {
            CaptureFormat::Png => CaptureScreenshotFormat::Png,
            CaptureFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
            CaptureFormat::Webp => CaptureScreenshotFormat::Webp,
        };

        let mut params_builder = ScreenshotParams::builder()
            .format(format)
            .from_surface(true)
            .capture_beyond_viewport(options.full_page);

        if matches!(options.format, CaptureFormat::Jpeg | CaptureFormat::Webp) {
            params_builder = params_builder.quality(options.quality as i64);
        }

        let data = self
            .page
            .inner()
            .screenshot(params_builder.build())
            .await
            .map_err(|e| CaptureError::ScreenshotFailed(e.to_string()))?;

        debug!("Screenshot captured: {} bytes", data.len());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_query_text_becomes_xpath() {
        let query = script_query(&ElementLocator::text_contains("it's here"));
        assert_eq!(query["mode"], "xpath");
        assert_eq!(query["value"], "//*[contains(text(), \"it's here\")]");
    }

    #[test]
    fn test_script_query_css_and_id() {
        assert_eq!(script_query(&ElementLocator::css(".m"))["mode"], "css");
        assert_eq!(script_query(&ElementLocator::id("login"))["value"], "login");
    }

    #[test]
    fn test_scoped_script_embeds_frames_as_json() {
        let path = ContextPath::top().child("ifinbox");
        let script = element_script(&path, &ElementLocator::css(".m"), PROBE_ACTION);
        assert!(script.starts_with("(() => {"));
        assert!(script.ends_with("})()"));
        assert!(script.contains(r#"const frames = ["ifinbox"];"#));
        assert!(script.contains(r#"const query = {"mode":"css","value":".m"};"#));
    }

    #[test]
    fn test_type_script_escapes_text() {
        let script = element_script_with(
            &ContextPath::top(),
            &ElementLocator::id("login"),
            vec![("text", serde_json::Value::from("a'b\"c"))],
            TYPE_ACTION,
        );
        assert!(script.contains(r#"const text = "a'b\"c";"#));
        assert!(script.contains(r#"const frames = [];"#));
    }

    #[test]
    fn test_frame_script_targets_name() {
        let script = frame_script(&ContextPath::top(), "ifmail");
        assert!(script.contains(r#"const target = "ifmail";"#));
        assert!(script.contains("readyState === 'complete'"));
    }

    #[test]
    fn test_script_outcome_defaults_missing_fields() {
        let outcome: ScriptOutcome = serde_json::from_str(r#"{"present": true}"#).unwrap();
        assert!(outcome.present);
        assert!(!outcome.detached);
        assert!(!outcome.done);
    }
}
