//! Condition polling
//!
//! [`ConditionWaiter`] repeatedly evaluates a [`WaitCondition`] against the
//! active context until it holds or its budget runs out. Each evaluation is
//! a single non-blocking probe; between probes the waiter sleeps for a fixed
//! interval. A run of waits shares no state except the clock.

use crate::browser::BrowserSession;
use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::context::{ElementLocator, RenderContext, ResolvedElement};
use crate::error::{Result, TimeoutError};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// What a condition checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKind {
    /// A matching element exists
    Present(ElementLocator),
    /// A matching element exists, is visible and is enabled
    Clickable(ElementLocator),
    /// A loaded frame with this name exists in the active context
    FrameAvailable(String),
}

/// A predicate over the active context, with an optional own budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitCondition {
    /// The predicate
    pub kind: ConditionKind,
    /// Budget override; `None` uses the waiter's default
    pub timeout: Option<Duration>,
}

impl WaitCondition {
    /// Wait for an element to exist
    pub fn present(locator: ElementLocator) -> Self {
        Self {
            kind: ConditionKind::Present(locator),
            timeout: None,
        }
    }

    /// Wait for an element to be clickable
    pub fn clickable(locator: ElementLocator) -> Self {
        Self {
            kind: ConditionKind::Clickable(locator),
            timeout: None,
        }
    }

    /// Wait for a nested frame to be available for switching
    pub fn frame_available<S: Into<String>>(name: S) -> Self {
        Self {
            kind: ConditionKind::FrameAvailable(name.into()),
            timeout: None,
        }
    }

    /// Give this condition its own budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConditionKind::Present(locator) => write!(f, "presence of {}", locator),
            ConditionKind::Clickable(locator) => write!(f, "clickability of {}", locator),
            ConditionKind::FrameAvailable(name) => write!(f, "availability of frame '{}'", name),
        }
    }
}

/// What a satisfied condition yields
#[derive(Debug, Clone)]
pub enum Satisfied {
    /// An element confirmed in the active context
    Element(ResolvedElement),
    /// A frame that can now be switched into
    Frame(String),
}

impl Satisfied {
    /// The resolved element, if this was an element condition
    pub fn into_element(self) -> Option<ResolvedElement> {
        match self {
            Satisfied::Element(element) => Some(element),
            Satisfied::Frame(_) => None,
        }
    }
}

/// Polls conditions until they hold or time out
#[derive(Debug, Clone, Copy)]
pub struct ConditionWaiter {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for ConditionWaiter {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
    }
}

impl ConditionWaiter {
    /// Waiter with a default budget and polling interval
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Default budget
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Interval between probes
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll `condition` in `context` until it holds.
    ///
    /// Probe errors count as "not yet"; the last one is attached to the
    /// timeout together with the number of probes that did complete. No probe is allowed to run past the deadline by more than
    /// one polling interval.
    #[instrument(skip(self, session, context, condition), fields(condition = %condition, context = %context))]
    pub async fn wait<S>(
        &self,
        session: &S,
        context: &RenderContext,
        condition: &WaitCondition,
    ) -> Result<Satisfied>
    where
        S: BrowserSession + ?Sized,
    {
        let budget = condition.timeout.unwrap_or(self.timeout);
        let start = Instant::now();
        let deadline = start + budget;
        let mut last_error = None;
        let mut polls: u32 = 0;
        let mut observed: u32 = 0;

        loop {
            polls += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let probe_budget = remaining.max(self.poll_interval);

            match tokio::time::timeout(probe_budget, Self::check(session, context, condition)).await {
                Ok(Ok(Some(satisfied))) => {
                    debug!(
                        "Satisfied after {} poll(s), {}ms",
                        polls,
                        start.elapsed().as_millis()
                    );
                    return Ok(satisfied);
                }
                Ok(Ok(None)) => observed += 1,
                Ok(Err(e)) => {
                    debug!("Probe error (will retry): {}", e);
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    debug!("Probe exceeded {}ms", probe_budget.as_millis());
                    last_error = Some(format!("probe exceeded {}ms", probe_budget.as_millis()));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TimeoutError {
                    condition: condition.to_string(),
                    waited_ms: now.duration_since(start).as_millis() as u64,
                    last_error,
                    observed,
                }
                .into());
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn check<S>(
        session: &S,
        context: &RenderContext,
        condition: &WaitCondition,
    ) -> Result<Option<Satisfied>>
    where
        S: BrowserSession + ?Sized,
    {
        let path = context.path();
        match &condition.kind {
            ConditionKind::Present(locator) => {
                let state = session.probe(path, locator).await?;
                Ok(state.present.then(|| {
                    Satisfied::Element(ResolvedElement::new(locator.clone(), context.clone(), state))
                }))
            }
            ConditionKind::Clickable(locator) => {
                let state = session.probe(path, locator).await?;
                Ok(state.is_clickable().then(|| {
                    Satisfied::Element(ResolvedElement::new(locator.clone(), context.clone(), state))
                }))
            }
            ConditionKind::FrameAvailable(name) => {
                let available = session.frame_available(path, name).await?;
                Ok(available.then(|| Satisfied::Frame(name.clone())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{MockDocument, MockElement, MockSession, Reveal};
    use crate::context::{ContextPath, FrameNavigator};
    use crate::error::Error;

    fn waiter(timeout_ms: u64, poll_ms: u64) -> ConditionWaiter {
        ConditionWaiter::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_ms),
        )
    }

    async fn opened(doc: MockDocument) -> MockSession {
        let session = MockSession::builder().document(ContextPath::top(), doc).build();
        session.open("https://example.com").await.unwrap();
        session
    }

    #[test]
    fn test_condition_display() {
        assert_eq!(
            WaitCondition::present(ElementLocator::id("login")).to_string(),
            "presence of id 'login'"
        );
        assert_eq!(
            WaitCondition::clickable(ElementLocator::css(".m")).to_string(),
            "clickability of css '.m'"
        );
        assert_eq!(
            WaitCondition::frame_available("ifinbox").to_string(),
            "availability of frame 'ifinbox'"
        );
    }

    #[test]
    fn test_default_waiter() {
        let waiter = ConditionWaiter::default();
        assert_eq!(waiter.timeout(), Duration::from_secs(20));
        assert_eq!(waiter.poll_interval(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_present_immediately() {
        let session =
            opened(MockDocument::new().element(MockElement::new(ElementLocator::id("login")))).await;
        let nav = FrameNavigator::new();

        let satisfied = waiter(1000, 10)
            .wait(&session, nav.active(), &WaitCondition::present(ElementLocator::id("login")))
            .await
            .unwrap();
        let element = satisfied.into_element().unwrap();
        assert_eq!(element.locator(), &ElementLocator::id("login"));
        assert_eq!(element.context(), nav.active());
        assert_eq!(session.probe_count().await, 1);
    }

    #[tokio::test]
    async fn test_present_after_delay_polls() {
        let session = opened(
            MockDocument::new().element(
                MockElement::new(ElementLocator::id("login"))
                    .reveal(Reveal::After(Duration::from_millis(60))),
            ),
        )
        .await;
        let nav = FrameNavigator::new();

        waiter(2000, 10)
            .wait(&session, nav.active(), &WaitCondition::present(ElementLocator::id("login")))
            .await
            .unwrap();
        assert!(session.probe_count().await > 1);
    }

    #[tokio::test]
    async fn test_hidden_element_is_present_but_not_clickable() {
        let session = opened(
            MockDocument::new().element(MockElement::new(ElementLocator::css(".f36")).hidden()),
        )
        .await;
        let nav = FrameNavigator::new();
        let w = waiter(80, 10);

        assert!(w
            .wait(&session, nav.active(), &WaitCondition::present(ElementLocator::css(".f36")))
            .await
            .is_ok());

        let err = w
            .wait(&session, nav.active(), &WaitCondition::clickable(ElementLocator::css(".f36")))
            .await
            .unwrap_err();
        match err {
            Error::Timeout(t) => assert_eq!(t.condition, "clickability of css '.f36'"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_bounded_by_budget_plus_interval() {
        let session = opened(MockDocument::new()).await;
        let nav = FrameNavigator::new();
        let w = waiter(150, 40);

        let start = std::time::Instant::now();
        let err = w
            .wait(&session, nav.active(), &WaitCondition::present(ElementLocator::id("never")))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        match err {
            Error::Timeout(t) => {
                assert!(t.observed >= 1);
                assert!(t.last_error.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(elapsed >= Duration::from_millis(150));
        // Generous scheduling slack on top of timeout + one interval
        assert!(elapsed < Duration::from_millis(150 + 40 + 500));
    }

    #[tokio::test]
    async fn test_condition_timeout_overrides_default() {
        let session = opened(MockDocument::new()).await;
        let nav = FrameNavigator::new();

        let start = std::time::Instant::now();
        let condition = WaitCondition::present(ElementLocator::id("never"))
            .with_timeout(Duration::from_millis(30));
        let err = waiter(60_000, 10)
            .wait(&session, nav.active(), &condition)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_probe_errors_are_retried_and_reported() {
        // Never opened: every probe reports a detached context
        let session = MockSession::builder().build();
        let nav = FrameNavigator::new();

        let err = waiter(50, 10)
            .wait(&session, nav.active(), &WaitCondition::present(ElementLocator::id("login")))
            .await
            .unwrap_err();
        match err {
            Error::Timeout(t) => {
                assert_eq!(t.observed, 0);
                assert!(t.last_error.unwrap().contains("detached"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(session.probe_count().await > 1);
    }

    #[tokio::test]
    async fn test_frame_available() {
        let session = MockSession::builder()
            .document(
                ContextPath::top().child("ifinbox"),
                MockDocument::new().reveal(Reveal::After(Duration::from_millis(30))),
            )
            .build();
        session.open("https://example.com").await.unwrap();
        let nav = FrameNavigator::new();

        let satisfied = waiter(1000, 10)
            .wait(&session, nav.active(), &WaitCondition::frame_available("ifinbox"))
            .await
            .unwrap();
        assert!(matches!(satisfied, Satisfied::Frame(ref name) if name == "ifinbox"));
        assert!(satisfied.into_element().is_none());
    }

    #[tokio::test]
    async fn test_waits_do_not_change_context() {
        let session =
            opened(MockDocument::new().element(MockElement::new(ElementLocator::id("login")))).await;
        let nav = FrameNavigator::new();
        let before = nav.active().clone();

        let w = waiter(100, 10);
        w.wait(&session, nav.active(), &WaitCondition::present(ElementLocator::id("login")))
            .await
            .unwrap();
        let _ = w
            .wait(&session, nav.active(), &WaitCondition::frame_available("missing"))
            .await;

        assert_eq!(nav.active(), &before);
    }
}
