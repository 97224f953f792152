// src/commands/rem.rs
use crate::commands::CmdResult;
use crate::report::escape;
use crate::store::Store;
use std::sync::Arc;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ParseMode};
use teloxide::Bot;

pub const USAGE: &str = "Usage: /rem &lt;chat_id&gt;";

pub async fn rem_reply(store: &Store, args: &str) -> String {
    let Some(target) = args.split_whitespace().next() else {
        return USAGE.to_string();
    };
    if store.remove(target).await {
        log::info!("subscription removed: {}", target);
        format!("🗑 Removed subscription for <code>{}</code>", escape(target))
    } else {
        format!("ℹ️ No subscription for <code>{}</code>", escape(target))
    }
}

/// Handle the `/rem` command (admin only, checked by the dispatcher)
pub async fn rem_command(bot: Bot, chat_id: ChatId, args: String, store: Arc<Store>) -> CmdResult {
    let reply = rem_reply(&store, &args).await;
    bot.send_message(chat_id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
