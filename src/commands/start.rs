// src/commands/start.rs
use crate::commands::CmdResult;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ParseMode};
use teloxide::Bot;

pub const HELP: &str = "👋 <b>TikTok analytics reports</b>\n\
\n\
Admin commands:\n\
/add &lt;handle&gt; [chat_id] — subscribe a chat (defaults to this one)\n\
/rem &lt;chat_id&gt; — remove a subscription\n\
/list — show all subscriptions";

/// Handle the `/start` command (open to everyone)
pub async fn start_command(bot: Bot, chat_id: ChatId) -> CmdResult {
    bot.send_message(chat_id, HELP)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
