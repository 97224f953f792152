// src/commands/list.rs
use crate::commands::CmdResult;
use crate::report::escape;
use crate::store::{Store, Subscription};
use chrono::SecondsFormat;
use std::sync::Arc;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ParseMode};
use teloxide::Bot;

pub const EMPTY: &str = "📭 No subscriptions yet.";

pub fn render(entries: &[(String, Subscription)]) -> String {
    if entries.is_empty() {
        return EMPTY.to_string();
    }
    let mut out = format!("📋 <b>Subscriptions ({})</b>\n", entries.len());
    for (chat_id, sub) in entries {
        let last = sub
            .last_sent_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "never".to_string());
        out.push_str(&format!(
            "\n<code>{}</code> → {}\nlast sent: {}\n",
            escape(chat_id),
            escape(&sub.handle),
            escape(&last)
        ));
    }
    out.trim_end().to_string()
}

/// Handle the `/list` command (admin only, checked by the dispatcher)
pub async fn list_command(bot: Bot, chat_id: ChatId, store: Arc<Store>) -> CmdResult {
    let reply = render(&store.snapshot().await);
    bot.send_message(chat_id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
