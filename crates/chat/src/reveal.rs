//! Client-side reveal pacing for answers that arrive complete.
//!
//! The backend returns one full answer; the controller replays it as a paced
//! sequence of growing prefixes so the transcript reads like live typing.

/// Wall-clock spacing between reveal steps, independent of chunk size.
pub const REVEAL_TICK_MS: u64 = 100;

/// Soft bound on the number of visible update steps per answer.
const TARGET_STEP_COUNT: usize = 200;
const MIN_CHUNK_CHARS: usize = 8;
const MAX_CHUNK_CHARS: usize = 64;

/// Characters revealed per step for an answer of `total_chars` length.
pub fn chunk_chars(total_chars: usize) -> usize {
    total_chars
        .div_ceil(TARGET_STEP_COUNT)
        .clamp(MIN_CHUNK_CHARS, MAX_CHUNK_CHARS)
}

/// Precomputed prefix schedule for one answer.
///
/// Step boundaries land on `char` boundaries so every emitted prefix is valid
/// text; the final step always ends exactly at the full answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealPlan {
    text: String,
    /// Byte offsets of successive prefix ends, strictly increasing.
    steps: Vec<usize>,
}

impl RevealPlan {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let chunk = chunk_chars(text.chars().count());

        let mut steps = Vec::new();
        for (seen, (offset, _)) in text.char_indices().enumerate() {
            if seen > 0 && seen % chunk == 0 {
                steps.push(offset);
            }
        }
        steps.push(text.len());

        Self { text, steps }
    }

    pub fn full_text(&self) -> &str {
        &self.text
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// True when the whole answer fits in one step and no timer is needed.
    pub fn completes_synchronously(&self) -> bool {
        self.steps.len() == 1
    }

    /// Prefix revealed once `step` has been applied (clamped to the last step).
    pub fn prefix(&self, step: usize) -> &str {
        let end = self.steps[step.min(self.steps.len() - 1)];
        &self.text[..end]
    }
}

/// One increment handed to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealStep<'a> {
    /// Text to append to the placeholder's current content.
    pub delta: &'a str,
    pub is_final: bool,
}

/// Mutable progress over a reveal plan for one placeholder message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealCursor {
    plan: RevealPlan,
    next_step: usize,
}

impl RevealCursor {
    pub fn new(plan: RevealPlan) -> Self {
        Self { plan, next_step: 0 }
    }

    pub fn plan(&self) -> &RevealPlan {
        &self.plan
    }

    /// Returns the next increment, or `None` once the plan is exhausted.
    pub fn advance(&mut self) -> Option<RevealStep<'_>> {
        if self.next_step >= self.plan.steps.len() {
            return None;
        }

        let start = if self.next_step == 0 {
            0
        } else {
            self.plan.steps[self.next_step - 1]
        };
        let end = self.plan.steps[self.next_step];
        self.next_step += 1;

        Some(RevealStep {
            delta: &self.plan.text[start..end],
            is_final: self.next_step == self.plan.steps.len(),
        })
    }
}
