use std::sync::Arc;
use std::time::Duration;

use saga_api::{ApiError, ChatBackend, ChatRequest, ChatResponse, Usage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::message::{ChatPhase, Message, MessageId, PhaseTransition, RevealSessionId};
use crate::reveal::{REVEAL_TICK_MS, RevealCursor, RevealPlan};
use crate::verify::{VerificationEvent, VerificationGate, VerificationNotice};

/// Request shaping applied to every dispatched message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub top_k: u8,
    pub temperature: f64,
    pub system_prompt: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            top_k: 8,
            temperature: 0.3,
            system_prompt: None,
        }
    }
}

/// Local input rejection; the transcript is never touched for these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    EmptyInput,
    /// A send is already in flight; concurrent sends are rejected, not queued.
    Busy,
    VerificationRequired(VerificationNotice),
}

/// Shape of the transcript after one mutation, for scroll/view consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationChange {
    pub message_count: usize,
    pub tail_content_len: usize,
}

/// Internal events delivered by spawned tasks.
#[derive(Debug)]
enum PumpEvent {
    BackendResolved {
        session: RevealSessionId,
        outcome: Result<ChatResponse, ApiError>,
    },
    RevealTick {
        session: RevealSessionId,
    },
}

/// Reveal bookkeeping for the in-flight placeholder.
#[derive(Debug)]
struct ActiveReveal {
    session: RevealSessionId,
    message_id: MessageId,
    cursor: RevealCursor,
    model: String,
    usage: Option<Usage>,
}

/// Owns the transcript and orchestrates send/reveal/failure/retry.
///
/// All state lives behind `&mut self`; spawned tasks only feed events back
/// through the controller's channel and are aborted on supersede or teardown,
/// so nothing mutates a conversation that is gone.
pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    options: ChatOptions,
    gate: VerificationGate,
    messages: Vec<Message>,
    phase: ChatPhase,
    last_error: Option<ApiError>,
    last_user_input: Option<String>,
    next_session: u64,
    events_tx: mpsc::UnboundedSender<PumpEvent>,
    events_rx: mpsc::UnboundedReceiver<PumpEvent>,
    backend_task: Option<JoinHandle<()>>,
    reveal_ticker: Option<JoinHandle<()>>,
    active_reveal: Option<ActiveReveal>,
}

impl ChatController {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self::with_options(backend, ChatOptions::default())
    }

    pub fn with_options(backend: Arc<dyn ChatBackend>, options: ChatOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            options,
            gate: VerificationGate::default(),
            messages: Vec::new(),
            phase: ChatPhase::Idle,
            last_error: None,
            last_user_input: None,
            next_session: 0,
            events_tx,
            events_rx,
            backend_task: None,
            reveal_ticker: None,
            active_reveal: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    /// True from send acceptance until the reveal finishes or the send fails.
    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn last_user_input(&self) -> Option<&str> {
        self.last_user_input.as_deref()
    }

    pub fn gate(&self) -> &VerificationGate {
        &self.gate
    }

    /// Feeds one widget event into the verification gate.
    pub fn apply_verification(&mut self, event: VerificationEvent) {
        self.gate.apply(event);
    }

    /// Current transcript shape, as handed to scroll/view consumers.
    pub fn change_snapshot(&self) -> ConversationChange {
        ConversationChange {
            message_count: self.messages.len(),
            tail_content_len: self
                .messages
                .last()
                .map(|message| message.content.chars().count())
                .unwrap_or(0),
        }
    }

    /// Validates and dispatches one user message.
    ///
    /// On acceptance the user message and an empty assistant placeholder are
    /// appended synchronously, then the backend call is spawned; rejections
    /// leave the transcript untouched.
    pub fn send_message(&mut self, text: &str) -> Result<(), SendRejection> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SendRejection::EmptyInput);
        }
        if self.phase.is_loading() {
            return Err(SendRejection::Busy);
        }

        // The token is proof of humanity, not a credential: the dispatched
        // request carries nothing, but consuming it here enforces one
        // verification per message.
        let _token = self
            .gate
            .take_for_send()
            .map_err(SendRejection::VerificationRequired)?;

        let session = self.alloc_session();
        if !self.transition(PhaseTransition::Accept(session)) {
            return Err(SendRejection::Busy);
        }

        self.last_error = None;
        self.last_user_input = Some(trimmed.to_string());
        self.messages.push(Message::user(trimmed));
        self.messages.push(Message::assistant_placeholder());

        let mut request = ChatRequest::new(trimmed)
            .with_top_k(self.options.top_k)
            .with_temperature(self.options.temperature);
        if let Some(system_prompt) = &self.options.system_prompt {
            request = request.with_system_prompt(system_prompt.clone());
        }

        tracing::debug!(?session, chars = trimmed.chars().count(), "dispatching chat request");
        self.spawn_backend_call(session, request);
        Ok(())
    }

    /// Empties the conversation and forgets error/retry memory.
    ///
    /// Also tears down any in-flight exchange; a late event for it fails the
    /// session guard and is dropped.
    pub fn clear_messages(&mut self) {
        self.abort_in_flight();
        self.transition(PhaseTransition::Reset);
        self.messages.clear();
        self.last_error = None;
        self.last_user_input = None;
    }

    /// Re-dispatches the last sent text after a failure.
    ///
    /// Removes the trailing two messages (the failed user + error pair) and
    /// sends again; without a prior dispatch this is deliberately a no-op.
    pub fn retry_last_message(&mut self) -> Result<(), SendRejection> {
        if self.phase.is_loading() {
            return Err(SendRejection::Busy);
        }

        let Some(text) = self.last_user_input.clone() else {
            return Ok(());
        };

        self.messages
            .truncate(self.messages.len().saturating_sub(2));
        self.send_message(&text)
    }

    /// Applies the next internal event and reports the resulting list shape.
    ///
    /// Pends until a spawned task delivers something; returns `None` only if
    /// the event channel is gone.
    pub async fn next_change(&mut self) -> Option<ConversationChange> {
        let event = self.events_rx.recv().await?;
        self.apply(event);
        Some(self.change_snapshot())
    }

    /// Drains events until the in-flight exchange fully resolves.
    pub async fn run_until_idle(&mut self) {
        while self.phase.is_loading() {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            self.apply(event);
        }
    }

    fn alloc_session(&mut self) -> RevealSessionId {
        self.next_session = self.next_session.saturating_add(1);
        RevealSessionId::new(self.next_session)
    }

    fn transition(&mut self, transition: PhaseTransition) -> bool {
        match self.phase.apply(transition) {
            Ok(next) => {
                self.phase = next;
                true
            }
            Err(rejection) => {
                tracing::warn!(?rejection, ?transition, "illegal phase transition");
                false
            }
        }
    }

    fn spawn_backend_call(&mut self, session: RevealSessionId, request: ChatRequest) {
        if let Some(task) = self.backend_task.take() {
            task.abort();
        }

        let events_tx = self.events_tx.clone();
        let call = self.backend.chat(request);
        self.backend_task = Some(tokio::spawn(async move {
            let outcome = call.await;
            let _ = events_tx.send(PumpEvent::BackendResolved { session, outcome });
        }));
    }

    fn apply(&mut self, event: PumpEvent) {
        match event {
            PumpEvent::BackendResolved { session, outcome } => {
                self.on_backend_resolved(session, outcome);
            }
            PumpEvent::RevealTick { session } => self.on_reveal_tick(session),
        }
    }

    fn on_backend_resolved(
        &mut self,
        session: RevealSessionId,
        outcome: Result<ChatResponse, ApiError>,
    ) {
        if !self.phase.accepts_event(session) {
            tracing::debug!(?session, "ignoring stale backend resolution");
            return;
        }
        self.backend_task = None;

        match outcome {
            Ok(response) => self.begin_reveal(session, response),
            Err(error) => self.fail_send(session, error),
        }
    }

    fn begin_reveal(&mut self, session: RevealSessionId, response: ChatResponse) {
        let Some(placeholder_id) = self.active_placeholder_id() else {
            // Nothing left to fill in; resolve the session without mutating.
            self.transition(PhaseTransition::Reset);
            return;
        };

        if !self.transition(PhaseTransition::BeginReveal(session)) {
            return;
        }

        let ChatResponse {
            response,
            model,
            usage,
        } = response;
        self.active_reveal = Some(ActiveReveal {
            session,
            message_id: placeholder_id,
            cursor: RevealCursor::new(RevealPlan::new(response)),
            model,
            usage,
        });

        // First step lands immediately so a short answer never shows an idle
        // typing indicator; anything longer gets the paced ticker.
        self.advance_reveal(session);
        if matches!(self.phase, ChatPhase::Revealing(_)) {
            self.start_ticker(session);
        }
    }

    fn on_reveal_tick(&mut self, session: RevealSessionId) {
        if !self.phase.accepts_event(session) {
            tracing::debug!(?session, "ignoring stale reveal tick");
            return;
        }
        self.advance_reveal(session);
    }

    fn advance_reveal(&mut self, session: RevealSessionId) {
        let Some(reveal) = self.active_reveal.as_mut() else {
            return;
        };
        if reveal.session != session {
            return;
        }

        let Some(step) = reveal.cursor.advance() else {
            self.finish_reveal(session);
            return;
        };

        let delta = step.delta.to_string();
        let is_final = step.is_final;
        let message_id = reveal.message_id;
        let model = reveal.model.clone();
        let usage = reveal.usage.clone();

        let Some(message) = self
            .messages
            .iter_mut()
            .find(|message| message.id == message_id)
        else {
            // Target message is gone; stop revealing instead of touching a
            // different message.
            self.finish_reveal(session);
            return;
        };

        message.content.push_str(&delta);
        if is_final {
            // Final content and deferred metadata land in the same step.
            message.model = Some(model);
            message.usage = usage;
            message.revealing = false;
            self.finish_reveal(session);
        }
    }

    fn finish_reveal(&mut self, session: RevealSessionId) {
        self.stop_ticker();
        self.active_reveal = None;
        self.transition(PhaseTransition::Complete(session));
    }

    fn fail_send(&mut self, session: RevealSessionId, error: ApiError) {
        // A failed call never leaves a half-empty bubble behind.
        if let Some(index) = self.active_placeholder_index() {
            self.messages.remove(index);
        }

        self.messages
            .push(Message::assistant_notice(format_error_notice(&error)));
        tracing::warn!(status = error.status(), error = %error, "chat request failed");
        self.last_error = Some(error);
        self.transition(PhaseTransition::Fail(session));
    }

    fn start_ticker(&mut self, session: RevealSessionId) {
        // Only one reveal timer may exist system-wide.
        self.stop_ticker();

        let events_tx = self.events_tx.clone();
        self.reveal_ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_millis(REVEAL_TICK_MS));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately and the initial
            // step was already applied; skip it.
            interval.tick().await;

            loop {
                interval.tick().await;
                if events_tx.send(PumpEvent::RevealTick { session }).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.reveal_ticker.take() {
            ticker.abort();
        }
    }

    fn abort_in_flight(&mut self) {
        if let Some(task) = self.backend_task.take() {
            task.abort();
        }
        self.stop_ticker();
        self.active_reveal = None;
    }

    fn active_placeholder_index(&self) -> Option<usize> {
        self.messages.iter().position(|message| message.revealing)
    }

    fn active_placeholder_id(&self) -> Option<MessageId> {
        self.active_placeholder_index()
            .map(|index| self.messages[index].id)
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.abort_in_flight();
    }
}

fn format_error_notice(error: &ApiError) -> String {
    let detail = error
        .detail()
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    format!("⚠️ **Error**: {detail}\n\nPlease try again or check if the backend is running.")
}
