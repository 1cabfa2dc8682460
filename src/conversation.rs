//! Per-chat dialogs for changing the notification target.
//!
//! ```text
//! /setchat   → AwaitingCodeword → AwaitingConfirm → done
//! /setemail  → AwaitingCodeword → AwaitingEmail   → done
//! ```
//! Any step ends on `/cancel` or after the inactivity timeout.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const CONVERSATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    SetChat,
    SetEmail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    AwaitingCodeword(Flow),
    AwaitingConfirm { codeword: String },
    AwaitingEmail { codeword: String },
}

/// What the chat's last message meant for its conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Codeword entered; the caller verifies it and continues with
    /// [`Conversations::await_confirm`] or [`Conversations::await_email`].
    Codeword { flow: Flow, codeword: String },
    Confirmed { codeword: String },
    Declined,
    Email { email: String, codeword: String },
    Expired,
}

struct Conversation {
    step: Step,
    touched: Instant,
}

pub struct Conversations {
    active: Mutex<HashMap<String, Conversation>>,
    timeout: Duration,
}

impl Default for Conversations {
    fn default() -> Self {
        Self::new(CONVERSATION_TIMEOUT)
    }
}

impl Conversations {
    pub fn new(timeout: Duration) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn start(&self, chat_id: &str, flow: Flow, now: Instant) {
        self.put(chat_id, Step::AwaitingCodeword(flow), now);
    }

    pub fn await_confirm(&self, chat_id: &str, codeword: String, now: Instant) {
        self.put(chat_id, Step::AwaitingConfirm { codeword }, now);
    }

    pub fn await_email(&self, chat_id: &str, codeword: String, now: Instant) {
        self.put(chat_id, Step::AwaitingEmail { codeword }, now);
    }

    /// End the chat's conversation. Returns whether one was running.
    pub fn cancel(&self, chat_id: &str) -> bool {
        self.lock().remove(chat_id).is_some()
    }

    /// Consume a plain-text message. `None` when the chat has no conversation.
    /// Every step is single-use: the conversation is removed here and the
    /// caller re-arms the next step explicitly.
    pub fn take_input(&self, chat_id: &str, text: &str, now: Instant) -> Option<Input> {
        let conversation = self.lock().remove(chat_id)?;
        if now.duration_since(conversation.touched) > self.timeout {
            return Some(Input::Expired);
        }
        let text = text.trim();
        Some(match conversation.step {
            Step::AwaitingCodeword(flow) => Input::Codeword {
                flow,
                codeword: text.to_string(),
            },
            Step::AwaitingConfirm { codeword } if is_yes(text) => Input::Confirmed { codeword },
            Step::AwaitingConfirm { .. } => Input::Declined,
            Step::AwaitingEmail { codeword } => Input::Email {
                email: text.to_string(),
                codeword,
            },
        })
    }

    /// Drop conversations idle past the timeout.
    pub fn prune(&self, now: Instant) -> usize {
        let mut active = self.lock();
        let before = active.len();
        active.retain(|_, c| now.duration_since(c.touched) <= self.timeout);
        before - active.len()
    }

    fn put(&self, chat_id: &str, step: Step, now: Instant) {
        self.lock().insert(
            chat_id.to_string(),
            Conversation { step, touched: now },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Conversation>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_yes(text: &str) -> bool {
    matches!(text.to_lowercase().as_str(), "да" | "yes" | "y")
}
