//! Post-submit polling for login success or failure.
//!
//! After an initial delay the page is inspected every poll interval until a
//! failure or success signal shows up or the ceiling is reached. Reaching
//! the ceiling without a signal counts as success: missing a real login is
//! considered worse than reporting a failed one.

use crate::config::OutcomeConfig;
use crate::page::{Node, NodeKind, Page};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const FAILURE_MARKERS: &[&str] = &["error", "invalid", "fail"];

const FAILURE_BANNER_CLASSES: &[&str] = &[
    "alert-danger",
    "alert-warning",
    "flash-alert",
    "notice-danger",
    "is-danger",
    "text-danger",
];

const FAILURE_PHRASES: &[&str] = &[
    "invalid",
    "incorrect",
    "wrong",
    "failed",
    "error",
    "denied",
    "unauthorized",
    "authentication failed",
    "login failed",
    "bad credentials",
    "account locked",
    "too many attempts",
];

const SUCCESS_MARKERS: &[&str] = &["welcome", "dashboard", "success"];

const LOGOUT_MARKERS: &[&str] = &["logout", "log out", "log-out", "signout", "sign out", "sign-out"];

const ACCOUNT_MENU_MARKERS: &[&str] = &[
    "user-menu",
    "usermenu",
    "profile",
    "account-menu",
    "avatar",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessSignal {
    SuccessMarker,
    AuthenticatedIndicator,
    LocationChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success(SuccessSignal),
    Failure,
    /// Neither signal within the ceiling.
    TimedOut,
    /// The attempt was superseded while polling.
    Cancelled,
}

impl Outcome {
    /// Whether the attempt should be reported.
    pub fn should_emit(&self) -> bool {
        matches!(self, Outcome::Success(_) | Outcome::TimedOut)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutcomeDetector {
    config: OutcomeConfig,
}

impl OutcomeDetector {
    pub fn new(config: OutcomeConfig) -> Self {
        Self { config }
    }

    /// Location changes count from the moment this is called.
    pub async fn watch(&self, page: &dyn Page, cancel: &CancellationToken) -> Outcome {
        let baseline = page.location();
        let started = Instant::now();
        let ceiling = self.config.ceiling();

        if !pause(self.config.initial_delay().min(ceiling), cancel).await {
            return Outcome::Cancelled;
        }

        loop {
            if failure_present(page) {
                debug!(elapsed_ms = elapsed_ms(started), "login failure detected");
                return Outcome::Failure;
            }
            if let Some(signal) = success_signal(page, &baseline) {
                debug!(elapsed_ms = elapsed_ms(started), ?signal, "login success detected");
                return Outcome::Success(signal);
            }

            let elapsed = started.elapsed();
            if elapsed >= ceiling {
                debug!(elapsed_ms = elapsed_ms(started), "no outcome signal, assuming success");
                return Outcome::TimedOut;
            }

            let next = self.config.poll_interval().min(ceiling - elapsed);
            if !pause(next, cancel).await {
                return Outcome::Cancelled;
            }
        }
    }
}

/// Sleeps for `duration`; false if cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

fn elapsed_ms(started: Instant) -> u128 {
    started.elapsed().as_millis()
}

pub fn failure_present(page: &dyn Page) -> bool {
    page.nodes().iter().any(|node| {
        (is_failure_banner(node) && contains_any(&node.text().to_lowercase(), FAILURE_PHRASES))
            || is_flagged_credential_input(node)
    })
}

pub fn success_signal(page: &dyn Page, baseline: &str) -> Option<SuccessSignal> {
    let nodes = page.nodes();

    if nodes
        .iter()
        .any(|node| contains_any(&attributes(node), SUCCESS_MARKERS))
    {
        return Some(SuccessSignal::SuccessMarker);
    }

    if nodes.iter().any(|node| is_authenticated_indicator(node)) {
        return Some(SuccessSignal::AuthenticatedIndicator);
    }

    if page.location() != baseline {
        return Some(SuccessSignal::LocationChanged);
    }

    None
}

fn is_failure_banner(node: &Node) -> bool {
    let attrs = attributes(node);
    contains_any(&attrs, FAILURE_MARKERS) || contains_any(&attrs, FAILURE_BANNER_CLASSES)
}

fn is_flagged_credential_input(node: &Node) -> bool {
    node.kind() == NodeKind::Input
        && node.is_invalid()
        && matches!(
            node.control_type().to_ascii_lowercase().as_str(),
            "password" | "email" | "text" | ""
        )
}

fn is_authenticated_indicator(node: &Node) -> bool {
    let attrs = attributes(node);
    let mut logout_haystack = format!("{} {}", attrs, node.text().to_lowercase());
    if let Some(href) = node.href() {
        logout_haystack.push(' ');
        logout_haystack.push_str(&href.to_lowercase());
    }
    contains_any(&logout_haystack, LOGOUT_MARKERS) || contains_any(&attrs, ACCOUNT_MENU_MARKERS)
}

/// Lower-cased `class` and `id`, space separated.
fn attributes(node: &Node) -> String {
    format!("{} {}", node.class_name(), node.element_id()).to_lowercase()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
