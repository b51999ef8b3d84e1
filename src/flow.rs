//! Inbox verification flow
//!
//! The flow is a fixed, linear sequence of nine states. Each state may
//! declare one precondition that is polled to completion before its action
//! runs; a failure at any state ends the run with that state attached.
//!
//! ```text
//! NavigateToInbox ─▶ SubmitAddress ─▶ TriggerRefresh ─▶ EnterListContext
//!        ─▶ OpenFirstMessage ─▶ ReturnToTop ─▶ EnterMessageContext
//!        ─▶ VerifyContent ─▶ CaptureEvidence
//! ```

use crate::browser::{BrowserSession, EvidenceCapture, PersistedEvidence};
use crate::config::FlowConfig;
use crate::context::{ElementLocator, FrameNavigator, ResolvedElement};
use crate::error::{Error, FailureClass, FlowError, Result, VerificationError};
use crate::wait::{ConditionWaiter, Satisfied, WaitCondition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// The states of a verification run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowState {
    /// Load the inbox page
    NavigateToInbox,
    /// Type the mailbox address
    SubmitAddress,
    /// Click the inbox refresh trigger
    TriggerRefresh,
    /// Switch into the message list frame
    EnterListContext,
    /// Click the first message row
    OpenFirstMessage,
    /// Switch back to the top document
    ReturnToTop,
    /// Switch into the message body frame
    EnterMessageContext,
    /// Assert the expected fragment is visible
    VerifyContent,
    /// Render and persist the evidence image
    CaptureEvidence,
}

impl FlowState {
    /// Every state, in order
    pub const ALL: [FlowState; 9] = [
        FlowState::NavigateToInbox,
        FlowState::SubmitAddress,
        FlowState::TriggerRefresh,
        FlowState::EnterListContext,
        FlowState::OpenFirstMessage,
        FlowState::ReturnToTop,
        FlowState::EnterMessageContext,
        FlowState::VerifyContent,
        FlowState::CaptureEvidence,
    ];

    /// State name
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::NavigateToInbox => "NavigateToInbox",
            FlowState::SubmitAddress => "SubmitAddress",
            FlowState::TriggerRefresh => "TriggerRefresh",
            FlowState::EnterListContext => "EnterListContext",
            FlowState::OpenFirstMessage => "OpenFirstMessage",
            FlowState::ReturnToTop => "ReturnToTop",
            FlowState::EnterMessageContext => "EnterMessageContext",
            FlowState::VerifyContent => "VerifyContent",
            FlowState::CaptureEvidence => "CaptureEvidence",
        }
    }

    /// The condition that must hold before this state's action runs
    pub fn precondition(&self, config: &FlowConfig) -> Option<WaitCondition> {
        let selectors = &config.selectors;
        match self {
            FlowState::NavigateToInbox | FlowState::ReturnToTop | FlowState::CaptureEvidence => {
                None
            }
            FlowState::SubmitAddress => {
                Some(WaitCondition::present(selectors.address_input.clone()))
            }
            FlowState::TriggerRefresh => {
                Some(WaitCondition::clickable(selectors.refresh_trigger.clone()))
            }
            FlowState::EnterListContext => {
                Some(WaitCondition::frame_available(selectors.inbox_frame.clone()))
            }
            FlowState::OpenFirstMessage => {
                Some(WaitCondition::clickable(selectors.first_message.clone()))
            }
            FlowState::EnterMessageContext => {
                Some(WaitCondition::frame_available(selectors.message_frame.clone()))
            }
            FlowState::VerifyContent => Some(WaitCondition::present(
                ElementLocator::text_contains(config.expected_fragment.clone()),
            )),
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every state completed and the fragment was visible
    Passed,
    /// Navigation succeeded but the fragment was not found or not visible
    VerificationFailed,
    /// The run could not reach a verdict
    InfrastructureError,
}

impl RunOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Passed => 0,
            RunOutcome::VerificationFailed => 1,
            RunOutcome::InfrastructureError => 2,
        }
    }
}

/// Per-state result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    /// The state's action completed
    Completed,
    /// The state failed and ended the run
    Failed,
}

/// Timing and status of one executed state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    /// Which state
    pub state: FlowState,
    /// Wall time spent, precondition included
    pub elapsed_ms: u64,
    /// Result
    pub status: StateStatus,
}

/// The boolean check made at VerifyContent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Whether the check held
    pub passed: bool,
    /// Human-readable description
    pub message: String,
}

/// What happened to the evidence image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvidenceOutcome {
    /// No capture was attempted
    Skipped,
    /// Written successfully
    Written {
        /// Destination path
        path: String,
        /// Bytes written
        bytes: usize,
    },
    /// Capture or persistence failed
    Failed {
        /// Destination path
        path: String,
        /// What went wrong
        error: String,
    },
}

/// The failing state of an unsuccessful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// State that failed
    pub state: FlowState,
    /// Whether the failure falsified the check or blocked it
    pub verification: bool,
    /// Error text
    pub message: String,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Inbox page
    pub inbox_url: String,
    /// Mailbox under test
    pub address: String,
    /// Fragment that was looked for
    pub expected_fragment: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub finished_at: DateTime<Utc>,
    /// Executed states, in order
    pub states: Vec<StateRecord>,
    /// The VerifyContent check, once reached
    pub assertion: Option<Assertion>,
    /// Evidence written after verification
    pub evidence: EvidenceOutcome,
    /// Evidence written after a failure, when enabled
    pub failure_evidence: EvidenceOutcome,
    /// Set when the run did not pass
    pub failure: Option<FailureRecord>,
    /// Final verdict
    pub outcome: RunOutcome,
}

impl FlowReport {
    /// Whether the run passed
    pub fn passed(&self) -> bool {
        self.outcome == RunOutcome::Passed
    }

    /// The state the run failed at, if any
    pub fn failed_state(&self) -> Option<FlowState> {
        self.failure.as_ref().map(|f| f.state)
    }
}

/// Drives one verification run over a browser session.
///
/// A flow borrows its session and owns its frame navigator; concurrent runs
/// need one session each.
pub struct InboxFlow<'a, S: BrowserSession + ?Sized> {
    session: &'a S,
    config: &'a FlowConfig,
    navigator: FrameNavigator,
    waiter: ConditionWaiter,
    capture: EvidenceCapture,
    assertion: Option<Assertion>,
    evidence: EvidenceOutcome,
}

impl<'a, S: BrowserSession + ?Sized> InboxFlow<'a, S> {
    /// Prepare a run; nothing touches the session until [`InboxFlow::run`]
    pub fn new(session: &'a S, config: &'a FlowConfig) -> Self {
        Self {
            session,
            config,
            navigator: FrameNavigator::new(),
            waiter: ConditionWaiter::new(config.timeout(), config.poll_interval()),
            capture: EvidenceCapture::new(config.capture_options()),
            assertion: None,
            evidence: EvidenceOutcome::Skipped,
        }
    }

    /// Execute every state in order and report the result
    pub async fn run(mut self) -> FlowReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut states = Vec::with_capacity(FlowState::ALL.len());
        let mut failure = None;

        info!(%run_id, address = %self.config.address, "Starting inbox verification");

        for state in FlowState::ALL {
            info!(%state, "Entering state");
            let entered = Instant::now();
            let result = self.step(state).await;
            let elapsed_ms = entered.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    info!(%state, elapsed_ms, "State completed");
                    states.push(StateRecord {
                        state,
                        elapsed_ms,
                        status: StateStatus::Completed,
                    });
                }
                Err(source) => {
                    let err = FlowError::new(state, source);
                    error!(%state, elapsed_ms, "{}", err);
                    states.push(StateRecord {
                        state,
                        elapsed_ms,
                        status: StateStatus::Failed,
                    });
                    failure = Some(err);
                    break;
                }
            }
        }

        let failure_evidence = match failure {
            Some(_) if self.config.capture_on_failure => {
                let path = self.config.failure_evidence_path();
                self.capture_to(&path).await
            }
            _ => EvidenceOutcome::Skipped,
        };

        let outcome = match failure.as_ref().map(FlowError::class) {
            None => RunOutcome::Passed,
            Some(FailureClass::Verification) => RunOutcome::VerificationFailed,
            Some(FailureClass::Infrastructure) => RunOutcome::InfrastructureError,
        };
        info!(%run_id, ?outcome, "Inbox verification finished");

        FlowReport {
            run_id,
            inbox_url: self.config.inbox_url.clone(),
            address: self.config.address.clone(),
            expected_fragment: self.config.expected_fragment.clone(),
            started_at,
            finished_at: Utc::now(),
            states,
            assertion: self.assertion,
            evidence: self.evidence,
            failure_evidence,
            failure: failure.map(|err| FailureRecord {
                state: err.state,
                verification: err.class() == FailureClass::Verification,
                message: err.source.to_string(),
            }),
            outcome,
        }
    }

    #[instrument(skip(self), fields(context = %self.navigator.active()))]
    async fn step(&mut self, state: FlowState) -> Result<()> {
        let satisfied = match state.precondition(self.config) {
            Some(condition) => Some(self.satisfy(state, &condition).await?),
            None => None,
        };

        match state {
            FlowState::NavigateToInbox => self.session.open(&self.config.inbox_url).await,
            FlowState::SubmitAddress => {
                let input = expect_element(state, satisfied)?;
                self.navigator
                    .type_text(self.session, &input, &self.config.address)
                    .await
            }
            FlowState::TriggerRefresh | FlowState::OpenFirstMessage => {
                let target = expect_element(state, satisfied)?;
                self.navigator.click(self.session, &target).await
            }
            FlowState::EnterListContext => {
                let frame = self.config.selectors.inbox_frame.clone();
                self.navigator.switch_to(self.session, &frame).await?;
                Ok(())
            }
            FlowState::ReturnToTop => {
                self.navigator.switch_to_top();
                Ok(())
            }
            FlowState::EnterMessageContext => {
                let frame = self.config.selectors.message_frame.clone();
                self.navigator.switch_to(self.session, &frame).await?;
                let config = self.config;
                if let Some(ref body) = config.selectors.message_body {
                    self.satisfy(state, &WaitCondition::present(body.clone()))
                        .await?;
                }
                Ok(())
            }
            FlowState::VerifyContent => {
                let element = expect_element(state, satisfied)?;
                self.verify(&element)
            }
            FlowState::CaptureEvidence => {
                let path = self.config.evidence_path.clone();
                self.evidence = self.capture_to(&path).await;
                Ok(())
            }
        }
    }

    /// Wait for a state's condition.
    ///
    /// At VerifyContent a timeout is a verification failure only when the
    /// message document was actually observed; if every probe failed the
    /// context was never reached and the timeout stays an infrastructure error.
    async fn satisfy(&mut self, state: FlowState, condition: &WaitCondition) -> Result<Satisfied> {
        let result = self
            .waiter
            .wait(self.session, self.navigator.active(), condition)
            .await;

        match result {
            Err(Error::Timeout(timeout))
                if state == FlowState::VerifyContent && timeout.observed > 0 =>
            {
                let err = VerificationError::NotFound {
                    fragment: self.config.expected_fragment.clone(),
                    waited_ms: timeout.waited_ms,
                };
                self.fail_assertion(&err);
                Err(err.into())
            }
            other => other,
        }
    }

    fn verify(&mut self, element: &ResolvedElement) -> Result<()> {
        self.navigator.ensure_current(element)?;
        let config = self.config;
        let fragment = &config.expected_fragment;

        if !element.state().visible {
            let err = VerificationError::NotVisible {
                fragment: fragment.clone(),
            };
            self.fail_assertion(&err);
            return Err(err.into());
        }

        let message = format!("Message containing '{}' is visible", fragment);
        info!("{}", message);
        self.assertion = Some(Assertion {
            passed: true,
            message,
        });
        Ok(())
    }

    fn fail_assertion(&mut self, err: &VerificationError) {
        warn!("Assertion failed: {}", err);
        self.assertion = Some(Assertion {
            passed: false,
            message: err.to_string(),
        });
    }

    /// Capture the active context and write it; never fails the run
    async fn capture_to(&self, path: &Path) -> EvidenceOutcome {
        let result: Result<PersistedEvidence> = async {
            let artifact = self
                .capture
                .capture(self.session, self.navigator.active())
                .await?;
            EvidenceCapture::persist(&artifact, path).await
        }
        .await;

        match result {
            Ok(written) => EvidenceOutcome::Written {
                path: written.path.display().to_string(),
                bytes: written.bytes,
            },
            Err(e) => {
                warn!("Evidence capture to {} failed: {}", path.display(), e);
                EvidenceOutcome::Failed {
                    path: path.display().to_string(),
                    error: e.to_string(),
                }
            }
        }
    }
}

fn expect_element(state: FlowState, satisfied: Option<Satisfied>) -> Result<ResolvedElement> {
    satisfied
        .and_then(Satisfied::into_element)
        .ok_or_else(|| Error::generic(format!("{} has no element precondition", state)))
}
