//! # Lockwarden Channels
//!
//! Delivery channels behind the [`Notifier`](lockwarden_core::traits::Notifier)
//! seam, plus the Telegram long-polling client the control bot runs on.

pub mod email;
pub mod telegram;

pub use email::EmailNotifier;
pub use telegram::{IncomingText, TelegramApi, TelegramNotifier};
