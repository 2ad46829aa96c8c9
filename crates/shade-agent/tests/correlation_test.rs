//! End-to-end attempt handling against an in-memory page, with tokio's
//! paused clock standing in for wall time.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use shade_agent::outcome::{Outcome, SuccessSignal};
use shade_agent::{
    AgentConfig, AttemptOutcome, AttemptState, DiscardReason, Document, EventSink, LinkError,
    NodeId, NodeSpec, PageContext, PageEvent,
};
use shade_common::{LoginDetected, MfaKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep};

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Debug, Clone)]
struct Received {
    at: Instant,
    origin: String,
    username: String,
    password: String,
    mfa_present: bool,
    mfa_type: Option<MfaKind>,
}

#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<Received>>,
}

impl RecordingSink {
    fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn login_detected(&self, login: LoginDetected) -> Result<(), LinkError> {
        self.received.lock().unwrap().push(Received {
            at: Instant::now(),
            origin: login.origin,
            username: login.username,
            password: login.password.expose_secret().to_string(),
            mfa_present: login.mfa_present,
            mfa_type: login.mfa_type,
        });
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn login_detected(&self, _login: LoginDetected) -> Result<(), LinkError> {
        Err(LinkError::ConnectionLost)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

struct LoginPage {
    doc: Arc<Document>,
    form: NodeId,
    user: NodeId,
    pass: NodeId,
    button: NodeId,
}

fn login_page() -> LoginPage {
    let doc = Arc::new(Document::new("https://Accounts.Example.com/login"));
    let form = doc.append(NodeSpec::form());
    let user = doc.append(NodeSpec::input("email").name("email").in_form(form));
    let pass = doc.append(NodeSpec::input("password").name("password").in_form(form));
    let button = doc.append(NodeSpec::button("Sign in").in_form(form));
    LoginPage {
        doc,
        form,
        user,
        pass,
        button,
    }
}

fn add_totp_field(doc: &Document) -> NodeId {
    doc.append(NodeSpec::input("number").name("totp_code").max_length(6))
}

fn context(page: &LoginPage, sink: &Arc<RecordingSink>) -> PageContext {
    PageContext::new(page.doc.clone(), AgentConfig::default(), sink.clone())
}

fn fill(ctx: &PageContext, page: &LoginPage, node: NodeId, value: &str) {
    page.doc.set_value(node, value);
    ctx.handle(PageEvent::Input { node });
}

fn fill_credentials(ctx: &PageContext, page: &LoginPage) {
    fill(ctx, page, page.user, "alice@example.com");
    fill(ctx, page, page.pass, "hunter2");
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn assert_near(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + ms(50),
        "expected ~{:?}, got {:?}",
        expected,
        actual
    );
}

// =============================================================================
// Second factor handling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_mfa_field_at_submit_skips_wait() {
    let page = login_page();
    add_totp_field(&page.doc);
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let start = Instant::now();
    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");

    // Confirmed before any outcome poll has run.
    assert_eq!(ctx.attempt_state(), AttemptState::OutcomeCheck);
    assert_eq!(ctx.pending_mfa(), Some(MfaKind::Totp));

    let outcome = handle.outcome().await;
    let AttemptOutcome::Dispatched(dispatched) = outcome else {
        panic!("expected dispatch, got {:?}", outcome);
    };
    assert!(dispatched.mfa_present);
    assert_eq!(dispatched.mfa_type, Some(MfaKind::Totp));
    assert_eq!(dispatched.outcome, Outcome::TimedOut);

    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].mfa_type, Some(MfaKind::Totp));
    assert_near(received[0].at - start, ms(5000));
}

#[tokio::test(start_paused = true)]
async fn test_late_mfa_field_cuts_wait_short() {
    let page = login_page();
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let start = Instant::now();
    let handle = ctx
        .handle(PageEvent::Click { node: page.button })
        .expect("attempt should start");
    assert_eq!(ctx.attempt_state(), AttemptState::MfaWait);
    assert_eq!(ctx.pending_mfa(), None);

    sleep(ms(2000)).await;
    assert_eq!(ctx.attempt_state(), AttemptState::MfaWait);

    add_totp_field(&page.doc);
    page.doc
        .append(NodeSpec::element("main").id("dashboard"));
    ctx.handle(PageEvent::NodesAdded);

    assert_eq!(ctx.attempt_state(), AttemptState::OutcomeCheck);
    assert_eq!(ctx.pending_mfa(), Some(MfaKind::Totp));

    let outcome = handle.outcome().await;
    assert!(matches!(outcome, AttemptOutcome::Dispatched(_)));

    // 2000 ms of waiting plus the 1000 ms initial outcome delay, instead of
    // the full 8000 ms window.
    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].mfa_present);
    assert_near(received[0].at - start, ms(3000));
}

#[tokio::test(start_paused = true)]
async fn test_mfa_wait_expires_without_second_factor() {
    let page = login_page();
    page.doc
        .append(NodeSpec::element("div").class("welcome-back"));
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let start = Instant::now();
    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");

    let AttemptOutcome::Dispatched(dispatched) = handle.outcome().await else {
        panic!("expected dispatch");
    };
    assert!(!dispatched.mfa_present);
    assert_eq!(dispatched.mfa_type, None);
    assert_eq!(
        dispatched.outcome,
        Outcome::Success(SuccessSignal::SuccessMarker)
    );

    let received = sink.received();
    assert_near(received[0].at - start, ms(9000));
}

// =============================================================================
// Outcome detection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_success_marker_emits_on_next_poll_tick() {
    let page = login_page();
    add_totp_field(&page.doc);
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let start = Instant::now();
    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");

    sleep(ms(1200)).await;
    page.doc.append(NodeSpec::button("Log out").class("nav-item"));

    let AttemptOutcome::Dispatched(dispatched) = handle.outcome().await else {
        panic!("expected dispatch");
    };
    assert_eq!(
        dispatched.outcome,
        Outcome::Success(SuccessSignal::AuthenticatedIndicator)
    );
    assert_near(sink.received()[0].at - start, ms(1500));
}

#[tokio::test(start_paused = true)]
async fn test_failure_banner_discards_attempt() {
    let page = login_page();
    add_totp_field(&page.doc);
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");
    page.doc.append(
        NodeSpec::element("div")
            .class("alert alert-danger")
            .text("Invalid credentials"),
    );

    assert_eq!(
        handle.outcome().await,
        AttemptOutcome::Discarded(DiscardReason::LoginFailed)
    );
    assert_eq!(ctx.attempt_state(), AttemptState::Discarded);

    sleep(ms(10_000)).await;
    assert!(sink.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_location_change_counts_as_success() {
    let page = login_page();
    add_totp_field(&page.doc);
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");
    sleep(ms(200)).await;
    page.doc.navigate("https://accounts.example.com/home");

    let AttemptOutcome::Dispatched(dispatched) = handle.outcome().await else {
        panic!("expected dispatch");
    };
    assert_eq!(
        dispatched.outcome,
        Outcome::Success(SuccessSignal::LocationChanged)
    );
    // Origin is fixed when the attempt starts.
    assert_eq!(dispatched.origin, "accounts.example.com");
}

#[tokio::test(start_paused = true)]
async fn test_redirect_to_mfa_step_is_not_success() {
    let page = login_page();
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");
    assert_eq!(ctx.attempt_state(), AttemptState::MfaWait);

    // The login form moves on to its second-factor step.
    sleep(ms(500)).await;
    page.doc.navigate("https://accounts.example.com/login/mfa");
    add_totp_field(&page.doc);
    ctx.handle(PageEvent::Navigated);
    assert_eq!(ctx.attempt_state(), AttemptState::OutcomeCheck);

    sleep(ms(1200)).await;
    page.doc.append(
        NodeSpec::element("div")
            .class("alert alert-danger")
            .text("Invalid code"),
    );

    assert_eq!(
        handle.outcome().await,
        AttemptOutcome::Discarded(DiscardReason::LoginFailed)
    );
    sleep(ms(10_000)).await;
    assert!(sink.received().is_empty());
}

// =============================================================================
// Debounce and supersession
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_triggers_inside_debounce_window_yield_one_event() {
    let page = login_page();
    add_totp_field(&page.doc);
    page.doc
        .append(NodeSpec::element("section").class("dashboard"));
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let first = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("first attempt");
    sleep(ms(100)).await;
    let second = ctx
        .handle(PageEvent::Click { node: page.button })
        .expect("second attempt");

    assert_eq!(
        first.outcome().await,
        AttemptOutcome::Discarded(DiscardReason::Superseded)
    );
    assert!(matches!(
        second.outcome().await,
        AttemptOutcome::Dispatched(_)
    ));
    assert_eq!(sink.received().len(), 1);

    // Within the window after dispatch: suppressed outright.
    sleep(ms(500)).await;
    assert!(ctx.handle(PageEvent::Submit { form: page.form }).is_none());
    assert!(ctx.debounce().get("accounts.example.com", "alice@example.com").is_some());

    // Past the window the same account may be reported again. The capture
    // buffer was cleared, so the registered fields supply the values.
    sleep(ms(600)).await;
    let third = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("third attempt");
    assert!(matches!(third.outcome().await, AttemptOutcome::Dispatched(_)));
    assert_eq!(sink.received().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shared_debounce_spans_contexts() {
    let page = login_page();
    add_totp_field(&page.doc);
    page.doc
        .append(NodeSpec::element("section").class("dashboard"));
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    let sibling = PageContext::with_debounce(
        page.doc.clone(),
        AgentConfig::default(),
        sink.clone(),
        ctx.debounce().clone(),
    );
    fill_credentials(&ctx, &page);

    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");
    handle.outcome().await;

    assert!(sibling.handle(PageEvent::Submit { form: page.form }).is_none());
    assert_eq!(sink.received().len(), 1);
}

// =============================================================================
// Credential assembly
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_captured_values_reach_the_sink() {
    let page = login_page();
    add_totp_field(&page.doc);
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);
    assert_eq!(ctx.captured_username().as_deref(), Some("alice@example.com"));

    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");
    handle.outcome().await;

    let received = sink.received();
    assert_eq!(received[0].origin, "accounts.example.com");
    assert_eq!(received[0].username, "alice@example.com");
    assert_eq!(received[0].password, "hunter2");
    // Cleared once dispatched.
    assert_eq!(ctx.captured_username(), None);
}

#[tokio::test(start_paused = true)]
async fn test_page_search_finds_unregistered_fields() {
    let doc = Arc::new(Document::new("https://example.com/signin"));
    let button = doc.append(NodeSpec::button("Continue"));
    doc.append(NodeSpec::input("number").name("otp").max_length(6));
    let sink = Arc::new(RecordingSink::default());
    let ctx = PageContext::new(doc.clone(), AgentConfig::default(), sink.clone());

    // Rendered without a structural notification.
    doc.append(NodeSpec::input("text").name("username").value("bob"));
    doc.append(NodeSpec::input("password").value("correct horse"));

    let handle = ctx
        .handle(PageEvent::Click { node: button })
        .expect("page search should assemble credentials");
    handle.outcome().await;

    let received = sink.received();
    assert_eq!(received[0].username, "bob");
    assert_eq!(received[0].password, "correct horse");
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_credentials_do_not_start_attempt() {
    let page = login_page();
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill(&ctx, &page, page.user, "alice@example.com");

    assert!(ctx.handle(PageEvent::Submit { form: page.form }).is_none());
    assert_eq!(ctx.attempt_state(), AttemptState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_controls_do_not_trigger() {
    let page = login_page();
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let late_button = page.doc.append(NodeSpec::button("Next"));
    assert!(ctx.handle(PageEvent::Click { node: late_button }).is_none());
    assert!(ctx.handle(PageEvent::Click { node: NodeId(999) }).is_none());

    ctx.handle(PageEvent::NodesAdded);
    assert!(ctx.handle(PageEvent::Click { node: late_button }).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_input_on_removed_field_is_ignored() {
    let page = login_page();
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);

    page.doc.remove(page.user);
    ctx.handle(PageEvent::Input { node: page.user });
    assert_eq!(ctx.captured_username(), None);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_resets_capture_but_not_attempt() {
    let page = login_page();
    add_totp_field(&page.doc);
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(&page, &sink);
    fill_credentials(&ctx, &page);

    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");
    page.doc.navigate("https://accounts.example.com/app");
    ctx.handle(PageEvent::Navigated);
    assert_eq!(ctx.captured_username(), None);

    assert!(matches!(handle.outcome().await, AttemptOutcome::Dispatched(_)));
    assert_eq!(sink.received()[0].password, "hunter2");
}

#[tokio::test(start_paused = true)]
async fn test_delivery_failure_is_reported_as_discard() {
    let page = login_page();
    add_totp_field(&page.doc);
    let ctx = PageContext::new(
        page.doc.clone(),
        AgentConfig::default(),
        Arc::new(FailingSink),
    );
    fill(&ctx, &page, page.user, "alice@example.com");
    fill(&ctx, &page, page.pass, "hunter2");

    let handle = ctx
        .handle(PageEvent::Submit { form: page.form })
        .expect("attempt should start");
    assert_eq!(
        handle.outcome().await,
        AttemptOutcome::Discarded(DiscardReason::DeliveryFailed)
    );
}
