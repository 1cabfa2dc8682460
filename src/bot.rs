//! Telegram bot front-end over the control surface.
//!
//! Only the configured notification chat may drive the bot; `/start`, `/menu`,
//! `/setchat` and `/cancel` are open to any chat so a new chat can register.

use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveTime, Weekday};
use futures::StreamExt;
use lockwarden_channels::telegram::escape_html;
use lockwarden_channels::{IncomingText, TelegramApi};
use lockwarden_core::schedule::{BreakWindow, Schedule, format_hhmm, parse_hhmm, parse_weekday};
use lockwarden_scheduler::control::{ActionSummary, TargetChange};
use lockwarden_scheduler::{
    CancelSignal, ControlCommand, ControlError, ControlReply, ControlSurface, DispatchReport,
    EngineState, StatusReport,
};

use crate::conversation::{Conversations, Flow, Input};

const NOT_AUTHORIZED: &str =
    "⛔ This chat is not allowed to control the lock. Use /setchat to register it.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Menu,
    Status,
    Open,
    Close,
    CancelRetry,
    Enable,
    Disable,
    SetTime { day: Weekday, time: NaiveTime },
    ClearTime { day: Weekday },
    AddBreak { day: Weekday, window: BreakWindow },
    DelBreak { day: Weekday, index: usize },
    SetTimezone(String),
    SetChat,
    SetEmail,
    TestNotify,
    Unblock(String),
    Cancel,
}

impl BotCommand {
    /// Commands any chat may use.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            BotCommand::Start | BotCommand::Menu | BotCommand::SetChat | BotCommand::Cancel
        )
    }

    fn to_control(&self) -> Option<ControlCommand> {
        Some(match self {
            BotCommand::Status => ControlCommand::Status,
            BotCommand::Open => ControlCommand::UnlockNow,
            BotCommand::Close => ControlCommand::LockNow,
            BotCommand::CancelRetry => ControlCommand::CancelRetry,
            BotCommand::Enable => ControlCommand::SetScheduleEnabled(true),
            BotCommand::Disable => ControlCommand::SetScheduleEnabled(false),
            BotCommand::SetTime { day, time } => ControlCommand::SetOpenTime {
                day: *day,
                time: *time,
            },
            BotCommand::ClearTime { day } => ControlCommand::ClearOpenTime { day: *day },
            BotCommand::AddBreak { day, window } => ControlCommand::AddBreak {
                day: *day,
                window: *window,
            },
            BotCommand::DelBreak { day, index } => ControlCommand::RemoveBreak {
                day: *day,
                index: *index,
            },
            BotCommand::SetTimezone(tz) => ControlCommand::SetTimezone(tz.clone()),
            BotCommand::TestNotify => ControlCommand::TestNotification,
            BotCommand::Unblock(chat_id) => ControlCommand::Unblock {
                requester: format!("chat:{chat_id}"),
            },
            _ => return None,
        })
    }
}

/// Parse a slash command. `None` for plain text, `Err` carries a usage hint.
pub fn parse_command(text: &str) -> Option<Result<BotCommand, String>> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next().unwrap_or_default();
    // "/status@lock_bot" in group chats.
    let name = head.split('@').next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = parts.collect();

    Some(match name.as_str() {
        "start" => Ok(BotCommand::Start),
        "menu" | "help" => Ok(BotCommand::Menu),
        "status" => Ok(BotCommand::Status),
        "open" | "unlock" => Ok(BotCommand::Open),
        "close" | "lock" => Ok(BotCommand::Close),
        "cancel_retry" => Ok(BotCommand::CancelRetry),
        "enable" => Ok(BotCommand::Enable),
        "disable" => Ok(BotCommand::Disable),
        "settime" => parse_day(args.first()).and_then(|day| {
            let time = args
                .get(1)
                .and_then(|t| parse_hhmm(t))
                .ok_or_else(|| "Usage: /settime &lt;day&gt; HH:MM".to_string())?;
            Ok(BotCommand::SetTime { day, time })
        }),
        "cleartime" => parse_day(args.first()).map(|day| BotCommand::ClearTime { day }),
        "addbreak" => parse_day(args.first()).and_then(|day| {
            let range = args[1.min(args.len())..].join("-");
            let window = BreakWindow::parse(&range)
                .map_err(|e| format!("{}\nUsage: /addbreak &lt;day&gt; HH:MM-HH:MM", escape_html(&e.to_string())))?;
            Ok(BotCommand::AddBreak { day, window })
        }),
        "delbreak" => parse_day(args.first()).and_then(|day| {
            let index = args
                .get(1)
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| "Usage: /delbreak &lt;day&gt; &lt;number&gt;".to_string())?;
            Ok(BotCommand::DelBreak { day, index })
        }),
        "settimezone" => match args.first() {
            Some(tz) => Ok(BotCommand::SetTimezone(tz.to_string())),
            None => Err("Usage: /settimezone Area/City".to_string()),
        },
        "setchat" => Ok(BotCommand::SetChat),
        "setemail" => Ok(BotCommand::SetEmail),
        "testnotify" => Ok(BotCommand::TestNotify),
        "unblock" => match args.first() {
            Some(chat_id) => Ok(BotCommand::Unblock(chat_id.to_string())),
            None => Err("Usage: /unblock &lt;chat id&gt;".to_string()),
        },
        "cancel" => Ok(BotCommand::Cancel),
        _ => Err("Unknown command. /menu lists what I understand.".to_string()),
    })
}

fn parse_day(arg: Option<&&str>) -> Result<Weekday, String> {
    arg.and_then(|d| parse_weekday(d))
        .ok_or_else(|| "Expected a weekday: mon, tue, wed, thu, fri, sat, sun".to_string())
}

pub struct Bot {
    api: TelegramApi,
    surface: Arc<ControlSurface>,
    conversations: Conversations,
}

impl Bot {
    pub fn new(api: TelegramApi, surface: Arc<ControlSurface>) -> Self {
        Self {
            api,
            surface,
            conversations: Conversations::default(),
        }
    }

    /// Poll for messages until `shutdown` fires. Each message is handled on
    /// its own task so a long manual action never blocks `/status`.
    pub async fn run(self: Arc<Self>, poll_timeout_secs: u64, mut shutdown: CancelSignal) {
        let mut updates = self.api.clone().start_polling(poll_timeout_secs);
        loop {
            tokio::select! {
                message = updates.next() => {
                    let Some(message) = message else { break };
                    let bot = self.clone();
                    tokio::spawn(async move {
                        if let Some(reply) = bot.handle_text(&message).await
                            && let Err(e) = bot.api.send_message(&message.chat_id, &reply).await
                        {
                            tracing::warn!(chat_id = %message.chat_id, "⚠️ Bot reply failed: {e}");
                        }
                    });
                }
                _ = shutdown.cancelled() => break,
            }
        }
        tracing::info!("🤖 Telegram bot stopped");
    }

    fn is_authorized(&self, chat_id: &str) -> bool {
        let target = self.surface.state().target();
        target.has_chat() && target.chat_id.trim() == chat_id
    }

    /// Handle one incoming message and return the HTML reply, if any.
    pub async fn handle_text(&self, message: &IncomingText) -> Option<String> {
        let chat_id = message.chat_id.as_str();
        let requester = format!("chat:{chat_id}");
        let now = Instant::now();
        let authorized = self.is_authorized(chat_id);

        let command = match parse_command(&message.text) {
            None => return self.continue_conversation(chat_id, &requester, &message.text, now).await,
            Some(Err(usage)) if authorized => return Some(usage),
            Some(Err(_)) => return Some(NOT_AUTHORIZED.to_string()),
            Some(Ok(command)) => command,
        };
        self.conversations.prune(now);
        tracing::debug!(chat_id, sender = %message.sender_name, ?command, "Bot command");

        if command == BotCommand::Cancel {
            return Some(if self.conversations.cancel(chat_id) {
                "Cancelled, nothing changed.".to_string()
            } else {
                "Nothing to cancel.".to_string()
            });
        }
        // A new command abandons any half-finished dialog.
        self.conversations.cancel(chat_id);

        if !command.is_public() && !authorized {
            return Some(NOT_AUTHORIZED.to_string());
        }

        match command {
            BotCommand::Start | BotCommand::Menu => Some(menu_text(authorized)),
            BotCommand::SetChat | BotCommand::SetEmail => {
                if self.surface.guard().is_blocked(&requester) {
                    return Some(render_error(&ControlError::Blocked));
                }
                let (flow, prompt) = if command == BotCommand::SetChat {
                    (Flow::SetChat, "🔑 Send the codeword to make this chat the notification target.")
                } else {
                    (Flow::SetEmail, "🔑 Send the codeword to change the notification email.")
                };
                self.conversations.start(chat_id, flow, now);
                Some(format!("{prompt}\n/cancel to abort."))
            }
            other => {
                let control = other.to_control()?;
                Some(render_result(self.surface.handle(&requester, control).await))
            }
        }
    }

    async fn continue_conversation(
        &self,
        chat_id: &str,
        requester: &str,
        text: &str,
        now: Instant,
    ) -> Option<String> {
        let input = self.conversations.take_input(chat_id, text, now)?;
        self.conversations.prune(now);
        Some(match input {
            Input::Expired => {
                "⌛ That conversation timed out. Start again with /setchat or /setemail.".to_string()
            }
            Input::Codeword { flow, codeword } => {
                if let Err(e) = self.surface.guard().verify(requester, &codeword) {
                    return Some(render_error(&e));
                }
                match flow {
                    Flow::SetChat => {
                        self.conversations.await_confirm(chat_id, codeword, now);
                        format!(
                            "Make this chat (<code>{}</code>) the notification target?\nReply <b>да</b> or <b>yes</b>.",
                            escape_html(chat_id)
                        )
                    }
                    Flow::SetEmail => {
                        self.conversations.await_email(chat_id, codeword, now);
                        "📧 Send the new email address.".to_string()
                    }
                }
            }
            Input::Declined => "Cancelled, nothing changed.".to_string(),
            Input::Confirmed { codeword } => {
                let command = ControlCommand::SetNotificationTarget {
                    change: TargetChange::ChatId(chat_id.to_string()),
                    codeword,
                };
                render_result(self.surface.handle(requester, command).await)
            }
            Input::Email { email, codeword } => {
                let command = ControlCommand::SetNotificationTarget {
                    change: TargetChange::Email(email),
                    codeword,
                };
                render_result(self.surface.handle(requester, command).await)
            }
        })
    }
}

// ─── Rendering ────────────────────────────────────────────────

pub fn menu_text(authorized: bool) -> String {
    if !authorized {
        return "🔐 <b>Lockwarden</b>\nThis chat is not registered.\n/setchat: register this chat (codeword required)".to_string();
    }
    [
        "🔐 <b>Lockwarden</b>",
        "/status: lock, schedule and recent actions",
        "/open, /close: unlock or lock now",
        "/cancel_retry: stop the running retry sequence",
        "/enable, /disable: turn the schedule on or off",
        "/settime &lt;day&gt; HH:MM, /cleartime &lt;day&gt;",
        "/addbreak &lt;day&gt; HH:MM-HH:MM, /delbreak &lt;day&gt; &lt;n&gt;",
        "/settimezone Area/City",
        "/setchat, /setemail: change where alerts go",
        "/testnotify: send a test alert",
        "/unblock &lt;chat id&gt;: allow a chat blocked for wrong codewords",
    ]
    .join("\n")
}

pub fn render_result(result: Result<ControlReply, ControlError>) -> String {
    match result {
        Ok(reply) => render_reply(&reply),
        Err(e) => render_error(&e),
    }
}

pub fn render_error(error: &ControlError) -> String {
    let icon = match error {
        ControlError::Busy { .. } => "⏳",
        ControlError::Blocked | ControlError::Unauthorized { .. } => "⛔",
        _ => "❌",
    };
    format!("{icon} {}", escape_html(&error.to_string()))
}

pub fn render_reply(reply: &ControlReply) -> String {
    match reply {
        ControlReply::Status(report) => render_status(report),
        ControlReply::ScheduleUpdated { schedule, .. } => {
            format!("✅ Schedule updated.\n\n{}", render_schedule(schedule))
        }
        ControlReply::ActionFinished(summary) => render_action(summary),
        ControlReply::TargetUpdated(target) => {
            let email = target.email_to.as_deref().unwrap_or("not set");
            format!(
                "✅ Notification target updated.\nChat: <code>{}</code>\nEmail: {}",
                escape_html(&target.chat_id),
                escape_html(email)
            )
        }
        ControlReply::Cancelled(active) => {
            format!("🛑 Cancelling {}.", escape_html(&active.to_string()))
        }
        ControlReply::TestNotification(report) => render_dispatch(report),
        ControlReply::Unblocked {
            requester,
            was_blocked: true,
        } => format!("🔓 <code>{}</code> may try the codeword again.", escape_html(requester)),
        ControlReply::Unblocked { requester, .. } => {
            format!("<code>{}</code> was not blocked.", escape_html(requester))
        }
    }
}

fn render_action(summary: &ActionSummary) -> String {
    let mut text = match summary.state {
        EngineState::Success => format!(
            "✅ Lock {} ({} attempt(s)).",
            summary.kind.done_verb(),
            summary.attempts
        ),
        EngineState::Cancelled => format!(
            "🛑 {} cancelled after {} attempt(s).",
            summary.kind, summary.attempts
        ),
        _ => format!(
            "🚨 Could not {} the lock after {} attempts.",
            summary.kind, summary.attempts
        ),
    };
    if summary.state != EngineState::Success
        && let Some(error) = &summary.last_error
    {
        text.push_str(&format!("\nLast error: {}", escape_html(error)));
    }
    if let Some(status) = &summary.lock_status {
        text.push_str(&format!("\nLock: {}", status.describe()));
    }
    text
}

fn render_dispatch(report: &DispatchReport) -> String {
    let line = |name: &str, result: &Result<(), lockwarden_core::traits::NotifyError>| match result {
        Ok(()) => format!("{name}: ✅ delivered"),
        Err(e) => format!("{name}: ❌ {}", escape_html(&e.to_string())),
    };
    format!(
        "📣 Test notification\n{}\n{}",
        line("Chat", &report.chat),
        line("Email", &report.email)
    )
}

pub fn render_schedule(schedule: &Schedule) -> String {
    let mut lines = vec![format!(
        "<b>Schedule</b> ({}, {})",
        escape_html(&schedule.timezone),
        if schedule.enabled { "enabled" } else { "disabled" }
    )];
    for (day, plan) in schedule.days() {
        let open = plan.open_time.map(format_hhmm).unwrap_or_else(|| "—".into());
        let mut line = format!("{day}: {open}");
        if !plan.breaks.is_empty() {
            let breaks = plan
                .breaks
                .iter()
                .enumerate()
                .map(|(i, b)| format!("{}) {b}", i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            line.push_str(&format!(" · breaks {breaks}"));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Strip the few tags the renderers emit, for terminal output.
pub fn html_to_plain(html: &str) -> String {
    ["<b>", "</b>", "<code>", "</code>"]
        .iter()
        .fold(html.to_string(), |text, tag| text.replace(tag, ""))
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

pub fn render_status(report: &StatusReport) -> String {
    let mut lines = vec!["🔐 <b>Status</b>".to_string()];
    lines.push(match &report.lock {
        Some(status) => format!("Lock: {}", status.describe()),
        None => "Lock: unavailable".to_string(),
    });
    lines.push(format!(
        "Local time: {}",
        report.local_time.format("%a %Y-%m-%d %H:%M")
    ));
    if let Some(warning) = &report.timezone_warning {
        lines.push(format!("⚠️ {}", escape_html(warning)));
    }
    if report.in_break {
        lines.push("☕ Inside a break window".to_string());
    }
    lines.push(match report.next_due {
        Some(next) => format!("Next unlock: {}", next.format("%a %Y-%m-%d %H:%M")),
        None => "Next unlock: none scheduled".to_string(),
    });
    if let Some(active) = &report.active {
        lines.push(format!("Running: {}", escape_html(&active.to_string())));
    }
    if report.consecutive_failures > 0 {
        lines.push(format!(
            "🚨 {} action(s) in a row gave up",
            report.consecutive_failures
        ));
    }
    lines.push(format!(
        "Alerts: chat {}, email {}",
        if report.chat_configured { "✅" } else { "❌" },
        if report.email_configured { "✅" } else { "❌" }
    ));
    lines.push(String::new());
    lines.push(render_schedule(&report.schedule));

    if !report.recent.is_empty() {
        lines.push(String::new());
        lines.push("<b>Recent</b>".to_string());
        for entry in &report.recent {
            lines.push(format!(
                "• {} {} {}: {} ({} attempt(s))",
                entry.slot, entry.origin, entry.kind, entry.outcome, entry.attempts
            ));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lockwarden_core::target::NotificationTarget;
    use lockwarden_core::traits::{Actuator, Notification, Notifier, NotifyError};
    use lockwarden_core::types::{FailureReason, LockAction, LockStatus};
    use lockwarden_scheduler::{
        ActionExecutor, CodewordGuard, ConfigStore, NotificationDispatcher, RetryEscalationEngine,
        RetryPolicy, SharedState,
    };
    use std::time::Duration;

    struct OkActuator;

    #[async_trait]
    impl Actuator for OkActuator {
        async fn attempt(&self, _action: LockAction) -> Result<(), FailureReason> {
            Ok(())
        }

        async fn lock_status(&self) -> Result<LockStatus, FailureReason> {
            Ok(LockStatus {
                locked: Some(true),
                battery_pct: Some(64),
            })
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn send(&self, _: &Notification, _: &NotificationTarget) -> Result<(), NotifyError> {
            Ok(())
        }

        fn channel_name(&self) -> &str {
            "silent"
        }
    }

    fn bot(dir: &std::path::Path, chat_id: &str) -> Bot {
        let state = Arc::new(SharedState::new(
            Schedule::default(),
            NotificationTarget {
                chat_id: chat_id.into(),
                ..Default::default()
            },
        ));
        let store = Arc::new(ConfigStore::new(
            dir.join("schedule.json"),
            dir.join("notify_target.json"),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(SilentNotifier),
            Arc::new(SilentNotifier),
            state.clone(),
            Duration::from_secs(5),
        ));
        let engine = Arc::new(RetryEscalationEngine::new(Arc::new(OkActuator), dispatcher));
        let executor = Arc::new(ActionExecutor::new(
            engine,
            RetryPolicy::default(),
            RetryPolicy::default(),
        ));
        let surface = Arc::new(ControlSurface::new(
            state,
            store,
            executor,
            CodewordGuard::new("secretword"),
        ));
        Bot::new(TelegramApi::new(""), surface)
    }

    fn msg(chat_id: &str, text: &str) -> IncomingText {
        IncomingText {
            chat_id: chat_id.into(),
            sender_id: "1".into(),
            sender_name: "@tester".into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/status@lock_bot"), Some(Ok(BotCommand::Status)));
        assert_eq!(
            parse_command("/settime Пт 08:45"),
            Some(Ok(BotCommand::SetTime {
                day: Weekday::Fri,
                time: NaiveTime::from_hms_opt(8, 45, 0).unwrap()
            }))
        );
        assert_eq!(
            parse_command("/addbreak mon 12:00 13:00"),
            Some(Ok(BotCommand::AddBreak {
                day: Weekday::Mon,
                window: BreakWindow::parse("12:00-13:00").unwrap()
            }))
        );
        assert_eq!(
            parse_command("/delbreak tuesday 2"),
            Some(Ok(BotCommand::DelBreak {
                day: Weekday::Tue,
                index: 2
            }))
        );
        assert!(matches!(parse_command("/settime xyz 09:00"), Some(Err(_))));
        assert!(matches!(parse_command("/settime mon 9"), Some(Err(_))));
        assert!(matches!(parse_command("/addbreak mon 13:00-12:00"), Some(Err(_))));
        assert!(matches!(parse_command("/frobnicate"), Some(Err(_))));
        assert_eq!(
            parse_command("/unblock 77"),
            Some(Ok(BotCommand::Unblock("77".into())))
        );
        assert!(matches!(parse_command("/unblock"), Some(Err(_))));
    }

    #[tokio::test]
    async fn test_unregistered_chat_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot(dir.path(), "42");
        let reply = bot.handle_text(&msg("77", "/status")).await.unwrap();
        assert_eq!(reply, NOT_AUTHORIZED);
        let reply = bot.handle_text(&msg("77", "/open")).await.unwrap();
        assert_eq!(reply, NOT_AUTHORIZED);

        let menu = bot.handle_text(&msg("77", "/menu")).await.unwrap();
        assert!(menu.contains("/setchat"));
        assert!(!menu.contains("/open"));
    }

    #[tokio::test]
    async fn test_setchat_registers_new_chat() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot(dir.path(), "42");

        let prompt = bot.handle_text(&msg("77", "/setchat")).await.unwrap();
        assert!(prompt.contains("codeword"));
        let confirm = bot.handle_text(&msg("77", "secretword")).await.unwrap();
        assert!(confirm.contains("<code>77</code>"));
        let done = bot.handle_text(&msg("77", "да")).await.unwrap();
        assert!(done.contains("Notification target updated"), "{done}");

        let status = bot.handle_text(&msg("77", "/status")).await.unwrap();
        assert!(status.contains("locked, battery 64%"));
        // The previous chat lost control.
        assert_eq!(bot.handle_text(&msg("42", "/status")).await.unwrap(), NOT_AUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_codeword_ends_dialog() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot(dir.path(), "42");
        bot.handle_text(&msg("77", "/setchat")).await;
        let reply = bot.handle_text(&msg("77", "guess")).await.unwrap();
        assert!(reply.contains("4 attempt(s) left"), "{reply}");
        // Plain text outside a dialog is ignored.
        assert_eq!(bot.handle_text(&msg("77", "secretword")).await, None);
    }

    #[tokio::test]
    async fn test_late_codeword_reports_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut bot = bot(dir.path(), "42");
        bot.conversations = Conversations::new(Duration::from_millis(1));
        bot.handle_text(&msg("77", "/setchat")).await.unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let reply = bot.handle_text(&msg("77", "secretword")).await.unwrap();
        assert!(reply.contains("timed out"), "{reply}");
        assert_eq!(bot.handle_text(&msg("77", "secretword")).await, None);
        assert_eq!(bot.surface.state().target().chat_id, "42");
    }

    #[tokio::test]
    async fn test_setemail_flow() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot(dir.path(), "42");
        bot.handle_text(&msg("42", "/setemail")).await.unwrap();
        bot.handle_text(&msg("42", "secretword")).await.unwrap();
        let reply = bot.handle_text(&msg("42", "ops@example.com")).await.unwrap();
        assert!(reply.contains("ops@example.com"));
        assert_eq!(
            bot.surface.state().target().email_to.as_deref(),
            Some("ops@example.com")
        );
    }

    #[tokio::test]
    async fn test_cancel_aborts_dialog() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot(dir.path(), "42");
        bot.handle_text(&msg("42", "/setchat")).await;
        let reply = bot.handle_text(&msg("42", "/cancel")).await.unwrap();
        assert!(reply.starts_with("Cancelled"));
        assert_eq!(bot.handle_text(&msg("42", "secretword")).await, None);
    }

    #[tokio::test]
    async fn test_schedule_commands() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot(dir.path(), "42");
        let reply = bot.handle_text(&msg("42", "/settime sat 10:30")).await.unwrap();
        assert!(reply.contains("Sat: 10:30"), "{reply}");
        let reply = bot
            .handle_text(&msg("42", "/addbreak sat 10:00-11:00"))
            .await
            .unwrap();
        assert!(reply.contains("breaks 1) 10:00-11:00"));
        let reply = bot.handle_text(&msg("42", "/delbreak sat 4")).await.unwrap();
        assert!(reply.starts_with("❌"));
        let reply = bot.handle_text(&msg("42", "/disable")).await.unwrap();
        assert!(reply.contains("disabled"));
    }

    #[test]
    fn test_html_to_plain() {
        assert_eq!(
            html_to_plain("<b>Schedule</b> &lt;day&gt; <code>a&amp;b</code>"),
            "Schedule <day> a&b"
        );
    }

    #[tokio::test]
    async fn test_open_reports_result() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot(dir.path(), "42");
        let reply = bot.handle_text(&msg("42", "/open")).await.unwrap();
        assert_eq!(reply, "✅ Lock unlocked (1 attempt(s)).");
    }
}
