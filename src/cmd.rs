// src/cmd.rs

//! Central command dispatcher
use crate::commands::{add, list, rem, start};
use crate::config::Config;
use crate::store::Store;
use std::sync::Arc;
use teloxide::Bot;
use teloxide::{dptree, prelude::*, utils::command::BotCommands};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "show help")]
    Start,
    #[command(description = "subscribe a chat: /add <handle> [chat_id] (admin only)")]
    Add(String),
    #[command(description = "remove a subscription: /rem <chat_id> (admin only)")]
    Rem(String),
    #[command(description = "list subscriptions (admin only)")]
    List,
}

impl Command {
    pub fn needs_admin(&self) -> bool {
        !matches!(self, Command::Start)
    }
}

pub async fn cmd_dispatch(bot: Bot, cfg: Config, store: Arc<Store>) {
    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(handle_cmd);

    Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![bot, cfg, store])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_cmd(
    bot: Bot,
    msg: Message,
    cmd: Command,
    cfg: Config,
    store: Arc<Store>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64);

    // unauthorized calls get no reply at all
    if cmd.needs_admin() && !user_id.is_some_and(|id| cfg.is_admin(id)) {
        log::debug!("ignoring {:?} from {:?} in {}", cmd, user_id, chat_id);
        return Ok(());
    }

    match cmd {
        Command::Start => start::start_command(bot, chat_id).await?,
        Command::Add(args) => add::add_command(bot, chat_id, args, store).await?,
        Command::Rem(args) => rem::rem_command(bot, chat_id, args, store).await?,
        Command::List => list::list_command(bot, chat_id, store).await?,
    }
    Ok(())
}
