//! Human-verification gate and widget lifecycle.
//!
//! The widget itself is a pluggable capability: anything that can issue,
//! expire, and invalidate single-use tokens. The gate only tracks whether a
//! token is currently held; one token authorizes exactly one send.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

/// Opaque single-use proof of human interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationToken(String);

impl VerificationToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Gate state for the current token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenState {
    #[default]
    None,
    Held(VerificationToken),
    JustExpired,
}

/// Inline notices the gate raises instead of mutating the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationNotice {
    /// No usable token: the user must complete the verification check.
    CompleteVerification,
    /// The widget itself failed; distinct from conversation-level errors.
    WidgetFailed,
}

impl VerificationNotice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::CompleteVerification => "Please complete the verification check to continue.",
            Self::WidgetFailed => "Verification failed. Please retry.",
        }
    }
}

/// Callback-equivalent events emitted by the verification widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    Issued(VerificationToken),
    Expired,
    Errored,
}

/// Tracks the lifecycle of the single-use token.
#[derive(Debug, Default)]
pub struct VerificationGate {
    state: TokenState,
    widget_failed: bool,
}

impl VerificationGate {
    pub fn state(&self) -> &TokenState {
        &self.state
    }

    pub fn has_token(&self) -> bool {
        matches!(self.state, TokenState::Held(_))
    }

    pub fn apply(&mut self, event: VerificationEvent) {
        match event {
            VerificationEvent::Issued(token) => self.on_issued(token),
            VerificationEvent::Expired => self.on_expired(),
            VerificationEvent::Errored => self.on_error(),
        }
    }

    pub fn on_issued(&mut self, token: VerificationToken) {
        self.state = TokenState::Held(token);
        self.widget_failed = false;
    }

    pub fn on_expired(&mut self) {
        self.state = TokenState::JustExpired;
    }

    pub fn on_error(&mut self) {
        self.state = TokenState::None;
        self.widget_failed = true;
    }

    /// Discards the held token without spending it on a send.
    pub fn on_consumed(&mut self) {
        self.state = TokenState::None;
    }

    /// Consumes the held token for one send.
    ///
    /// Success forces the gate back to `None`: the next send needs a fresh
    /// token, and the caller is expected to reset the widget.
    pub fn take_for_send(&mut self) -> Result<VerificationToken, VerificationNotice> {
        match mem::take(&mut self.state) {
            TokenState::Held(token) => Ok(token),
            TokenState::None if self.widget_failed => Err(VerificationNotice::WidgetFailed),
            TokenState::None | TokenState::JustExpired => {
                Err(VerificationNotice::CompleteVerification)
            }
        }
    }
}

/// Identifier the widget implementation assigns to one rendered instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WidgetId(pub String);

/// Pluggable verification widget capability.
pub trait VerificationWidget: Send + Sync {
    /// Attempts to render one widget instance.
    ///
    /// Returns `None` while the widget implementation has not finished
    /// loading; the host polls until it appears.
    fn render(
        &self,
        sitekey: &str,
        events: mpsc::UnboundedSender<VerificationEvent>,
    ) -> Option<WidgetId>;

    /// Discards widget state so a fresh token can be issued.
    fn reset(&self, widget: &WidgetId);

    /// Tears the widget instance down.
    fn remove(&self, widget: &WidgetId);
}

pub const WIDGET_POLL_ATTEMPTS: u32 = 20;
pub const WIDGET_POLL_INTERVAL_MS: u64 = 200;

/// Owns one rendered widget instance for the lifetime of a view.
pub struct VerificationHost {
    widget: Arc<dyn VerificationWidget>,
    sitekey: String,
    widget_id: Option<WidgetId>,
    events_tx: mpsc::UnboundedSender<VerificationEvent>,
    events_rx: mpsc::UnboundedReceiver<VerificationEvent>,
}

impl VerificationHost {
    pub fn new(widget: Arc<dyn VerificationWidget>, sitekey: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            widget,
            sitekey: sitekey.into(),
            widget_id: None,
            events_tx,
            events_rx,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.widget_id.is_some()
    }

    /// Renders the widget, polling for availability with bounded retries.
    ///
    /// Returns false when the widget never became available; the gate then
    /// stays empty and every send is rejected with a verification notice.
    pub async fn mount(&mut self) -> bool {
        if self.widget_id.is_some() {
            return true;
        }

        for attempt in 0..WIDGET_POLL_ATTEMPTS {
            if let Some(widget_id) = self
                .widget
                .render(&self.sitekey, self.events_tx.clone())
            {
                tracing::debug!(attempt, widget_id = %widget_id.0, "verification widget rendered");
                self.widget_id = Some(widget_id);
                return true;
            }

            if attempt + 1 < WIDGET_POLL_ATTEMPTS {
                time::sleep(Duration::from_millis(WIDGET_POLL_INTERVAL_MS)).await;
            }
        }

        tracing::warn!(
            attempts = WIDGET_POLL_ATTEMPTS,
            "verification widget never became available"
        );
        false
    }

    /// Resets the rendered widget so it can issue the next token.
    pub fn reset(&self) {
        if let Some(widget_id) = &self.widget_id {
            self.widget.reset(widget_id);
        }
    }

    /// Receives the next widget event; pending forever while none arrive.
    pub async fn next_event(&mut self) -> Option<VerificationEvent> {
        self.events_rx.recv().await
    }

    /// Drains one already-delivered widget event without waiting.
    pub fn try_event(&mut self) -> Option<VerificationEvent> {
        self.events_rx.try_recv().ok()
    }

    pub fn unmount(&mut self) {
        if let Some(widget_id) = self.widget_id.take() {
            self.widget.remove(&widget_id);
        }
    }
}

impl Drop for VerificationHost {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn token_is_single_use() {
        let mut gate = VerificationGate::default();
        gate.on_issued(VerificationToken::new("tok-1"));
        assert!(gate.has_token());

        let token = gate.take_for_send().expect("held token is consumable");
        assert_eq!(token.as_str(), "tok-1");
        assert_eq!(gate.state(), &TokenState::None);
        assert_eq!(
            gate.take_for_send(),
            Err(VerificationNotice::CompleteVerification)
        );
    }

    #[test]
    fn consumed_event_discards_the_held_token() {
        let mut gate = VerificationGate::default();
        gate.on_issued(VerificationToken::new("tok-1"));
        gate.on_consumed();

        assert_eq!(gate.state(), &TokenState::None);
        assert_eq!(
            gate.take_for_send(),
            Err(VerificationNotice::CompleteVerification)
        );
    }

    #[test]
    fn expiry_requires_reverification() {
        let mut gate = VerificationGate::default();
        gate.on_issued(VerificationToken::new("tok-1"));
        gate.on_expired();

        assert_eq!(gate.state(), &TokenState::JustExpired);
        assert_eq!(
            gate.take_for_send(),
            Err(VerificationNotice::CompleteVerification)
        );

        gate.on_issued(VerificationToken::new("tok-2"));
        assert_eq!(
            gate.take_for_send().expect("fresh token").as_str(),
            "tok-2"
        );
    }

    #[test]
    fn widget_error_raises_a_distinct_notice() {
        let mut gate = VerificationGate::default();
        gate.apply(VerificationEvent::Errored);
        assert_eq!(gate.take_for_send(), Err(VerificationNotice::WidgetFailed));

        // A fresh token clears the failure notice.
        gate.apply(VerificationEvent::Issued(VerificationToken::new("tok-3")));
        assert!(gate.take_for_send().is_ok());
        assert_eq!(
            gate.take_for_send(),
            Err(VerificationNotice::CompleteVerification)
        );
    }

    struct CountingWidget {
        render_calls: AtomicU32,
        available_after: u32,
        removed: Mutex<Vec<WidgetId>>,
    }

    impl CountingWidget {
        fn new(available_after: u32) -> Self {
            Self {
                render_calls: AtomicU32::new(0),
                available_after,
                removed: Mutex::new(Vec::new()),
            }
        }
    }

    impl VerificationWidget for CountingWidget {
        fn render(
            &self,
            _sitekey: &str,
            _events: mpsc::UnboundedSender<VerificationEvent>,
        ) -> Option<WidgetId> {
            let call = self.render_calls.fetch_add(1, Ordering::SeqCst);
            (call >= self.available_after).then(|| WidgetId(format!("widget-{call}")))
        }

        fn reset(&self, _widget: &WidgetId) {}

        fn remove(&self, widget: &WidgetId) {
            self.removed
                .lock()
                .expect("removed lock poisoned")
                .push(widget.clone());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn mount_polls_until_the_widget_appears() {
        let widget = Arc::new(CountingWidget::new(5));
        let mut host = VerificationHost::new(widget.clone(), "sitekey");

        assert!(host.mount().await);
        assert!(host.is_mounted());
        assert_eq!(widget.render_calls.load(Ordering::SeqCst), 6);

        // A second mount is a no-op.
        assert!(host.mount().await);
        assert_eq!(widget.render_calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn mount_gives_up_after_bounded_attempts() {
        let widget = Arc::new(CountingWidget::new(u32::MAX));
        let mut host = VerificationHost::new(widget.clone(), "sitekey");

        assert!(!host.mount().await);
        assert!(!host.is_mounted());
        assert_eq!(
            widget.render_calls.load(Ordering::SeqCst),
            WIDGET_POLL_ATTEMPTS
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drop_removes_the_rendered_widget() {
        let widget = Arc::new(CountingWidget::new(0));
        {
            let mut host = VerificationHost::new(widget.clone(), "sitekey");
            assert!(host.mount().await);
        }

        let removed = widget.removed.lock().expect("removed lock poisoned");
        assert_eq!(removed.as_slice(), &[WidgetId("widget-0".to_string())]);
    }
}
