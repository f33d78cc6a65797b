pub mod controller;
pub mod message;
pub mod reveal;
pub mod scroll;
pub mod verify;

pub use controller::{ChatController, ChatOptions, ConversationChange, SendRejection};
pub use message::{
    ChatPhase, Message, MessageId, PhaseRejection, PhaseTransition, RevealSessionId, Role,
};
pub use reveal::{REVEAL_TICK_MS, RevealCursor, RevealPlan, RevealStep, chunk_chars};
pub use scroll::{NEAR_BOTTOM_THRESHOLD, ScrollCommand, ScrollCoordinator, Viewport};
pub use verify::{
    TokenState, VerificationEvent, VerificationGate, VerificationHost, VerificationNotice,
    VerificationToken, VerificationWidget, WidgetId,
};
