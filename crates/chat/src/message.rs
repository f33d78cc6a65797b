use std::fmt;
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;

use saga_api::Usage;
use uuid::Uuid;
use uuid::timestamp::{Timestamp, context::ContextV7};

/// Stable identifier for one message.
///
/// UUID v7 keeps identifiers unique and orderable by creation time while
/// staying opaque to everything outside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub Uuid);

// Shared v7 context so identifiers minted within the same millisecond still
// sort in creation order.
static ID_CONTEXT: OnceLock<Mutex<ContextV7>> = OnceLock::new();

impl MessageId {
    /// Mints a fresh time-ordered identifier.
    pub fn generate() -> Self {
        let context = ID_CONTEXT.get_or_init(|| Mutex::new(ContextV7::new()));
        let context = context.lock().expect("message id context poisoned");
        Self(Uuid::new_v7(Timestamp::now(&*context)))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier for one send/reveal session.
///
/// This must change on every accepted send so stale backend resolutions and
/// reveal ticks can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevealSessionId(pub u64);

impl RevealSessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub created_at: SystemTime,
    /// True only while this message's content has not reached its final length.
    pub revealing: bool,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, revealing: bool) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            created_at: SystemTime::now(),
            revealing,
            model: None,
            usage: None,
        }
    }

    /// Creates a completed user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, false)
    }

    /// Creates the empty assistant placeholder a reveal fills in.
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new(), true)
    }

    /// Creates the synthetic assistant message shown for a failed exchange.
    pub fn assistant_notice(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, false)
    }
}

/// Conversation lifecycle phase.
///
/// `Failed` is deliberately absent: a failure appends its notice message and
/// lands back in `Idle` in the same step, with only `last_error` persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatPhase {
    #[default]
    Idle,
    Sending(RevealSessionId),
    Revealing(RevealSessionId),
}

/// State transition input for the conversation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    Accept(RevealSessionId),
    BeginReveal(RevealSessionId),
    Complete(RevealSessionId),
    Fail(RevealSessionId),
    Reset,
}

/// Rejection reason for illegal phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseRejection {
    Busy {
        active: RevealSessionId,
        attempted: RevealSessionId,
    },
    NotInFlight,
    SessionMismatch {
        active: RevealSessionId,
        attempted: RevealSessionId,
    },
}

pub type PhaseTransitionResult = Result<ChatPhase, PhaseRejection>;

impl ChatPhase {
    /// True from send acceptance until reveal completion or failure.
    pub fn is_loading(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn active_session(&self) -> Option<RevealSessionId> {
        match self {
            Self::Idle => None,
            Self::Sending(session) | Self::Revealing(session) => Some(*session),
        }
    }

    /// Returns true when an incoming event matches the in-flight session.
    pub fn accepts_event(&self, session: RevealSessionId) -> bool {
        self.active_session() == Some(session)
    }

    /// Applies one transition deterministically.
    ///
    /// `Accept` requires `Idle`; every other transition except `Reset` must
    /// match the currently active session exactly.
    pub fn apply(&self, transition: PhaseTransition) -> PhaseTransitionResult {
        match transition {
            PhaseTransition::Accept(session) => self.apply_accept(session),
            PhaseTransition::BeginReveal(session) => self.apply_begin_reveal(session),
            PhaseTransition::Complete(session) => self.apply_terminal(session),
            PhaseTransition::Fail(session) => self.apply_terminal(session),
            PhaseTransition::Reset => Ok(Self::Idle),
        }
    }

    fn apply_accept(&self, session: RevealSessionId) -> PhaseTransitionResult {
        match self.active_session() {
            None => Ok(Self::Sending(session)),
            Some(active) => Err(PhaseRejection::Busy {
                active,
                attempted: session,
            }),
        }
    }

    fn apply_begin_reveal(&self, session: RevealSessionId) -> PhaseTransitionResult {
        match self {
            Self::Sending(active) if *active == session => Ok(Self::Revealing(session)),
            Self::Sending(active) | Self::Revealing(active) => {
                Err(PhaseRejection::SessionMismatch {
                    active: *active,
                    attempted: session,
                })
            }
            Self::Idle => Err(PhaseRejection::NotInFlight),
        }
    }

    fn apply_terminal(&self, session: RevealSessionId) -> PhaseTransitionResult {
        match self.active_session() {
            Some(active) if active == session => Ok(Self::Idle),
            Some(active) => Err(PhaseRejection::SessionMismatch {
                active,
                attempted: session,
            }),
            None => Err(PhaseRejection::NotInFlight),
        }
    }
}
