// src/commands/add.rs
use crate::commands::CmdResult;
use crate::report::escape;
use crate::store::Store;
use std::sync::Arc;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ParseMode};
use teloxide::Bot;

pub const USAGE: &str = "Usage: /add &lt;handle&gt; [chat_id]";

/// Parse `<handle> [chat_id]`, register it and build the reply.
pub async fn add_reply(store: &Store, args: &str, current: ChatId) -> String {
    let mut parts = args.split_whitespace();
    let Some(handle) = parts.next() else {
        return USAGE.to_string();
    };
    let target = parts
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| current.0.to_string());

    let previous = store.get(&target).await;
    store.upsert(&target, handle).await;
    log::info!("subscription added: {} -> {}", target, handle);

    let mut reply = format!(
        "✅ Chat <code>{}</code> will receive reports for <b>{}</b>",
        escape(&target),
        escape(handle)
    );
    if let Some(prev) = previous.filter(|p| p.handle != handle) {
        reply.push_str(&format!(" (was {})", escape(&prev.handle)));
    }
    reply
}

/// Handle the `/add` command (admin only, checked by the dispatcher)
pub async fn add_command(bot: Bot, chat_id: ChatId, args: String, store: Arc<Store>) -> CmdResult {
    let reply = add_reply(&store, &args, chat_id).await;
    bot.send_message(chat_id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
