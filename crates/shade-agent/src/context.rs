use crate::capture::CaptureBuffer;
use crate::classifier::InputRole;
use crate::config::AgentConfig;
use crate::correlation::{self, AttemptHandle, AttemptState};
use crate::debounce::DebounceGuard;
use crate::link::EventSink;
use crate::observer::{Observer, ScanReport};
use crate::outcome::OutcomeDetector;
use crate::page::{NodeId, Page, PageEvent, lock};
use shade_common::MfaKind;
use std::sync::{Arc, Mutex};

pub(crate) struct ContextState {
    pub(crate) observer: Observer,
    pub(crate) capture: CaptureBuffer,
    pub(crate) pending: Option<correlation::PendingAttempt>,
    pub(crate) generation: u64,
    /// Terminal state of the last attempt, reported while nothing is pending.
    pub(crate) settled: AttemptState,
}

pub(crate) struct Shared {
    pub(crate) page: Arc<dyn Page>,
    pub(crate) config: AgentConfig,
    pub(crate) detector: OutcomeDetector,
    pub(crate) debounce: DebounceGuard,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) state: Mutex<ContextState>,
}

/// Observation state for one loaded document.
///
/// All page activity goes through [`PageContext::handle`]. Triggers spawn
/// attempt tasks on the current tokio runtime.
#[derive(Clone)]
pub struct PageContext {
    shared: Arc<Shared>,
}

impl PageContext {
    pub fn new(page: Arc<dyn Page>, config: AgentConfig, sink: Arc<dyn EventSink>) -> Self {
        let debounce = DebounceGuard::new(config.debounce());
        Self::with_debounce(page, config, sink, debounce)
    }

    /// Like [`PageContext::new`] but with a debounce guard shared with other
    /// contexts.
    pub fn with_debounce(
        page: Arc<dyn Page>,
        config: AgentConfig,
        sink: Arc<dyn EventSink>,
        debounce: DebounceGuard,
    ) -> Self {
        let context = Self {
            shared: Arc::new(Shared {
                page,
                detector: OutcomeDetector::new(config.outcome.clone()),
                config,
                debounce,
                sink,
                state: Mutex::new(ContextState {
                    observer: Observer::new(),
                    capture: CaptureBuffer::new(),
                    pending: None,
                    generation: 0,
                    settled: AttemptState::Idle,
                }),
            }),
        };
        context.scan();
        context
    }

    /// Returns a handle when the event started a login attempt.
    pub fn handle(&self, event: PageEvent) -> Option<AttemptHandle> {
        match event {
            PageEvent::NodesAdded => {
                self.scan();
                None
            }
            PageEvent::Input { node } => {
                let mut state = lock(&self.shared.state);
                if let Some((role, value)) = state.observer.on_input(node) {
                    state.capture.record(role, value);
                }
                None
            }
            PageEvent::Submit { form: node } | PageEvent::Click { node } => self.trigger(node),
            PageEvent::Navigated => {
                self.reset();
                None
            }
        }
    }

    pub fn scan(&self) -> ScanReport {
        let mut state = lock(&self.shared.state);
        let report = state.observer.scan(&*self.shared.page);
        if report.found_mfa()
            && let Some(kind) = InputRole::MfaCode.mfa_kind()
        {
            correlation::confirm_mfa(&mut state, kind);
        }
        report
    }

    /// Full re-scan: forgets every registration and captured value. An
    /// attempt already in flight keeps its own copy of the credentials.
    pub fn reset(&self) -> ScanReport {
        {
            let mut state = lock(&self.shared.state);
            state.observer.clear();
            state.capture.clear();
        }
        self.scan()
    }

    pub fn attempt_state(&self) -> AttemptState {
        let state = lock(&self.shared.state);
        state
            .pending
            .as_ref()
            .map(|pending| pending.state)
            .unwrap_or(state.settled)
    }

    /// MFA category of the attempt in flight, if one was recorded.
    pub fn pending_mfa(&self) -> Option<MfaKind> {
        lock(&self.shared.state)
            .pending
            .as_ref()
            .and_then(|pending| pending.mfa)
    }

    pub fn captured_username(&self) -> Option<String> {
        lock(&self.shared.state)
            .capture
            .username()
            .map(str::to_string)
    }

    pub fn debounce(&self) -> &DebounceGuard {
        &self.shared.debounce
    }

    fn trigger(&self, node: NodeId) -> Option<AttemptHandle> {
        let mut state = lock(&self.shared.state);
        if !state.observer.is_trigger(node) {
            return None;
        }
        correlation::begin(&self.shared, &mut state)
    }
}
