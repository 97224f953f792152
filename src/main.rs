// src/main.rs

mod cmd;
mod commands;
mod config;
mod error;
mod fetcher;
mod report;
mod scheduler;
mod store;

use anyhow::Result;
use chrono::Local;
use env_logger::Builder;
use fetcher::HttpFetcher;
use log::info;
use scheduler::{Scheduler, TokioPause};
use std::io::Write;
use std::sync::Arc;
use teloxide::Bot;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    // —— 加载配置 —— //
    let cfg = config::Config::load("config.toml")?;

    // —— 初始化日志 —— //
    Builder::new()
        .format(|buf, rec| {
            writeln!(
                buf,
                "[{} {:<5}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                rec.level(),
                rec.args()
            )
        })
        .filter_level(cfg.log_level().parse()?)
        .init();
    info!("日志级别 = {}", cfg.log_level());
    match cfg.admin_id {
        Some(id) => info!("admin commands restricted to user {}", id),
        None => info!("no ADMIN_ID configured, everyone may manage subscriptions"),
    }

    // —— 加载订阅 —— //
    let store = Arc::new(store::Store::open(&cfg.state_file).await);
    info!("Subscription store at {}", store.path().display());

    let client = cfg.http_client()?;
    let bot = Bot::with_client(cfg.token.clone(), client.clone());

    // —— 启动后台投递任务 —— //
    let scheduler = Scheduler::new(
        store.clone(),
        HttpFetcher::from_config(&cfg, client),
        bot.clone(),
        TokioPause,
    )
    .gap(cfg.pause)
    .interval(cfg.interval);
    tokio::spawn(scheduler.run());
    info!("Delivery cycle every {:?}", cfg.interval);

    // —— 启动 Telegram 命令分发 —— //
    info!("Starting to Process Telegram Messages");
    cmd::cmd_dispatch(bot, cfg, store).await;
    info!("Dispatcher stopped");
    Ok(())
}
