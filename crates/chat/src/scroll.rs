use crate::controller::ConversationChange;

/// Distance from true bottom still treated as "at bottom".
pub const NEAR_BOTTOM_THRESHOLD: f32 = 100.0;

/// Scroll metrics reported by the embedding view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_top: f32,
    pub viewport_height: f32,
    pub content_height: f32,
}

impl Viewport {
    pub fn distance_from_bottom(&self) -> f32 {
        (self.content_height - self.scroll_top - self.viewport_height).max(0.0)
    }

    pub fn is_near_bottom(&self) -> bool {
        self.distance_from_bottom() < NEAR_BOTTOM_THRESHOLD
    }
}

/// Reposition command handed back to the embedding view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    ToBottom { smooth: bool },
}

/// Keeps the viewport pinned to the newest content, but only while the user
/// has not deliberately scrolled away to read history.
#[derive(Debug)]
pub struct ScrollCoordinator {
    enabled: bool,
    smooth: bool,
    follow_bottom: bool,
    attached: bool,
    last_change: Option<ConversationChange>,
}

impl ScrollCoordinator {
    pub fn new(smooth: bool) -> Self {
        Self {
            enabled: true,
            smooth,
            follow_bottom: true,
            attached: false,
            last_change: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_following_bottom(&self) -> bool {
        self.follow_bottom
    }

    /// Registers the scroll listener; exactly once per mount lifecycle.
    pub fn attach(&mut self) -> bool {
        if self.attached {
            tracing::warn!("scroll coordinator attached twice without detach");
            return false;
        }
        self.attached = true;
        true
    }

    pub fn detach(&mut self) -> bool {
        let was_attached = self.attached;
        self.attached = false;
        was_attached
    }

    /// Records whether the user is still reading the tail.
    pub fn handle_scroll(&mut self, viewport: Viewport) {
        if self.attached {
            self.follow_bottom = viewport.is_near_bottom();
        }
    }

    /// Reacts to one conversation mutation.
    ///
    /// Returns a reposition command only while attached, enabled, following
    /// the bottom, and the list shape actually changed since the last call.
    pub fn on_change(&mut self, change: ConversationChange) -> Option<ScrollCommand> {
        if !self.attached || !self.enabled {
            return None;
        }

        if self.last_change == Some(change) {
            return None;
        }
        self.last_change = Some(change);

        self.follow_bottom.then_some(ScrollCommand::ToBottom {
            smooth: self.smooth,
        })
    }
}
