// src/scheduler.rs
use crate::error::Result;
use crate::fetcher::Analytics;
use crate::report::{escape, format_report};
use crate::store::Store;
use chrono::Utc;
use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ParseMode, Recipient};
use teloxide::Bot;
use tokio::time::{self, MissedTickBehavior};

/// Delivers an HTML message to a chat.
pub trait Notifier: Send + Sync {
    fn send_html<'a>(&'a self, chat_id: &'a str, text: String) -> BoxFuture<'a, Result<()>>;
}

/// Pacing between entries, replaceable in tests.
pub trait Pause: Send + Sync {
    fn pause(&self, dur: Duration) -> BoxFuture<'_, ()>;
}

pub struct TokioPause;

impl Pause for TokioPause {
    fn pause(&self, dur: Duration) -> BoxFuture<'_, ()> {
        Box::pin(time::sleep(dur))
    }
}

/// Numeric ids go to `ChatId`, anything else is treated as `@channel`.
pub fn recipient(chat_id: &str) -> Recipient {
    match chat_id.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.trim().to_string()),
    }
}

impl Notifier for Bot {
    fn send_html<'a>(&'a self, chat_id: &'a str, text: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.send_message(recipient(chat_id), text)
                .parse_mode(ParseMode::Html)
                .await?;
            Ok(())
        })
    }
}

pub fn fallback_notice(handle: &str) -> String {
    format!(
        "⚠️ Could not fetch data for <b>{}</b>. Will retry next cycle.",
        escape(handle)
    )
}

/// Outcome counters for one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Scheduler<A, N, P = TokioPause> {
    store: Arc<Store>,
    analytics: A,
    notifier: N,
    pause: P,
    gap: Duration,
    interval: Duration,
}

impl<A, N, P> Scheduler<A, N, P>
where
    A: Analytics,
    N: Notifier,
    P: Pause,
{
    pub fn new(store: Arc<Store>, analytics: A, notifier: N, pause: P) -> Self {
        Scheduler {
            store,
            analytics,
            notifier,
            pause,
            gap: Duration::from_millis(1500),
            interval: Duration::from_secs(12 * 3600),
        }
    }

    /// Delay between entries.
    pub fn gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    /// Time between cycle starts.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one cycle now, then one per interval, forever.
    pub async fn run(self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // first tick completes immediately
            ticker.tick().await;
            let report = self.run_cycle().await;
            info!(
                "Cycle done: {} delivered, {} failed, {} skipped",
                report.delivered, report.failed, report.skipped
            );
        }
    }

    /// One pass over a snapshot of the store. Per-entry failures are logged,
    /// reported to the chat and never abort the pass.
    pub async fn run_cycle(&self) -> CycleReport {
        let entries = self.store.snapshot().await;
        info!("Starting delivery cycle over {} subscriptions", entries.len());
        let mut report = CycleReport::default();

        for (chat_id, sub) in entries {
            let handle = sub.handle.as_str();
            if handle.trim().is_empty() {
                report.skipped += 1;
                continue;
            }

            match self.deliver(&chat_id, handle).await {
                Ok(()) => {
                    report.delivered += 1;
                    if !self.store.mark_sent(&chat_id, Utc::now()).await {
                        debug!("chat {} removed during delivery", chat_id);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!("发送报告失败 [{} / {}]: {}", chat_id, handle, e);
                    if let Err(e) = self.notifier.send_html(&chat_id, fallback_notice(handle)).await {
                        warn!("fallback notice to {} failed: {}", chat_id, e);
                    }
                }
            }

            self.pause.pause(self.gap).await;
        }
        report
    }

    async fn deliver(&self, chat_id: &str, handle: &str) -> Result<()> {
        debug!("delivering {} to {}", handle, chat_id);
        let raw = self.analytics.fetch(handle).await?;
        let text = format_report(&raw);
        self.notifier.send_html(chat_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::time::Instant;

    #[derive(Default)]
    struct FakeAnalytics {
        responses: HashMap<String, Value>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeAnalytics {
        fn with(mut self, handle: &str, raw: Value) -> Self {
            self.responses.insert(handle.to_string(), raw);
            self
        }
    }

    impl Analytics for FakeAnalytics {
        fn fetch<'a>(&'a self, handle: &'a str) -> BoxFuture<'a, Result<Value>> {
            self.calls.lock().unwrap().push(handle.to_string());
            let res = self
                .responses
                .get(handle)
                .cloned()
                .ok_or_else(|| Error::Fetch(format!("HTTP 500 for {}", handle)));
            Box::pin(async move { res })
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<(String, String)>>,
        failing: Vec<String>,
    }

    impl Notifier for FakeNotifier {
        fn send_html<'a>(&'a self, chat_id: &'a str, text: String) -> BoxFuture<'a, Result<()>> {
            let res = if self.failing.iter().any(|c| c == chat_id) {
                Err(Error::Send("chat not found".into()))
            } else {
                self.sent.lock().unwrap().push((chat_id.to_string(), text));
                Ok(())
            };
            Box::pin(async move { res })
        }
    }

    #[derive(Default)]
    struct RecordedPause(Mutex<Vec<Duration>>);

    impl Pause for RecordedPause {
        fn pause(&self, dur: Duration) -> BoxFuture<'_, ()> {
            self.0.lock().unwrap().push(dur);
            Box::pin(async {})
        }
    }

    async fn store_with(dir: &TempDir, entries: &[(&str, &str)]) -> Arc<Store> {
        let store = Store::open(dir.path().join("subscriptions.json")).await;
        for (chat, handle) in entries {
            store.upsert(chat, handle).await;
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn delivers_report_and_persists_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("111", "@a")]).await;
        let analytics = FakeAnalytics::default()
            .with("@a", json!({ "profile_id": "a", "profile_followers": { "value": 10 } }));
        let scheduler = Scheduler::new(
            store.clone(),
            analytics,
            FakeNotifier::default(),
            RecordedPause::default(),
        );

        let report = scheduler.run_cycle().await;

        assert_eq!(report, CycleReport { delivered: 1, failed: 0, skipped: 0 });
        let sent = scheduler.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "111");
        assert!(sent[0].1.contains("@a"));
        assert!(sent[0].1.contains("10"));

        assert!(store.get("111").await.unwrap().last_sent_at.is_some());
        let reloaded = Store::open(store.path()).await;
        assert!(reloaded.get("111").await.unwrap().last_sent_at.is_some());
    }

    #[tokio::test]
    async fn fetch_failure_sends_fallback_and_continues() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("1", "@broken"), ("2", "@ok")]).await;
        let analytics = FakeAnalytics::default().with("@ok", json!({ "profile_id": "ok" }));
        let scheduler = Scheduler::new(
            store.clone(),
            analytics,
            FakeNotifier::default(),
            RecordedPause::default(),
        );

        let report = scheduler.run_cycle().await;

        assert_eq!(report, CycleReport { delivered: 1, failed: 1, skipped: 0 });
        assert_eq!(store.get("1").await.unwrap().last_sent_at, None);
        assert!(store.get("2").await.unwrap().last_sent_at.is_some());

        let sent = scheduler.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent[0], ("1".to_string(), fallback_notice("@broken")));
        assert!(sent[1].1.contains("@ok"));
    }

    #[tokio::test]
    async fn send_failure_swallows_fallback_error() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("1", "@a"), ("2", "@b")]).await;
        let analytics = FakeAnalytics::default()
            .with("@a", json!({}))
            .with("@b", json!({}));
        let notifier = FakeNotifier {
            failing: vec!["1".into()],
            ..Default::default()
        };
        let scheduler = Scheduler::new(store.clone(), analytics, notifier, RecordedPause::default());

        let report = scheduler.run_cycle().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(store.get("1").await.unwrap().last_sent_at, None);
    }

    #[tokio::test]
    async fn blank_handles_are_skipped_without_pause() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("1", ""), ("2", "  "), ("3", "@c")]).await;
        let analytics = FakeAnalytics::default().with("@c", json!({}));
        let scheduler = Scheduler::new(
            store,
            analytics,
            FakeNotifier::default(),
            RecordedPause::default(),
        )
        .gap(Duration::from_millis(20));

        let report = scheduler.run_cycle().await;

        assert_eq!(report, CycleReport { delivered: 1, failed: 0, skipped: 2 });
        assert_eq!(*scheduler.analytics.calls.lock().unwrap(), vec!["@c".to_string()]);
        assert_eq!(*scheduler.pause.0.lock().unwrap(), vec![Duration::from_millis(20)]);
    }

    #[tokio::test]
    async fn pauses_after_every_processed_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("1", "@a"), ("2", "@missing"), ("3", "@c")]).await;
        let analytics = FakeAnalytics::default()
            .with("@a", json!({}))
            .with("@c", json!({}));
        let scheduler = Scheduler::new(
            store,
            analytics,
            FakeNotifier::default(),
            RecordedPause::default(),
        );

        scheduler.run_cycle().await;

        assert_eq!(
            *scheduler.pause.0.lock().unwrap(),
            vec![Duration::from_millis(1500); 3]
        );
        assert_eq!(
            *scheduler.analytics.calls.lock().unwrap(),
            vec!["@a", "@missing", "@c"]
        );
    }

    #[tokio::test]
    async fn handle_reaches_fetcher_verbatim() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("1", " @padded ")]).await;
        let scheduler = Scheduler::new(
            store,
            FakeAnalytics::default(),
            FakeNotifier::default(),
            RecordedPause::default(),
        );

        let report = scheduler.run_cycle().await;

        assert_eq!(report.failed, 1);
        assert_eq!(*scheduler.analytics.calls.lock().unwrap(), vec![" @padded "]);
        let sent = scheduler.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent[0].1, fallback_notice(" @padded "));
    }

    /// Records the elapsed time at which each fetch starts.
    struct ClockedAnalytics {
        origin: Instant,
        starts: Arc<Mutex<Vec<Duration>>>,
    }

    impl Analytics for ClockedAnalytics {
        fn fetch<'a>(&'a self, _handle: &'a str) -> BoxFuture<'a, Result<Value>> {
            self.starts.lock().unwrap().push(self.origin.elapsed());
            Box::pin(async { Ok(json!({})) })
        }
    }

    /// Sleeps `first` on the first call only.
    struct SlowFirstPause {
        first: Duration,
        calls: AtomicUsize,
    }

    impl Pause for SlowFirstPause {
        fn pause(&self, _dur: Duration) -> BoxFuture<'_, ()> {
            let dur = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.first
            } else {
                Duration::ZERO
            };
            Box::pin(time::sleep(dur))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_fires_immediately_then_every_interval() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("1", "@a")]).await;
        let starts = Arc::new(Mutex::new(Vec::new()));
        let analytics = ClockedAnalytics {
            origin: Instant::now(),
            starts: starts.clone(),
        };
        let task = tokio::spawn(
            Scheduler::new(store, analytics, FakeNotifier::default(), RecordedPause::default())
                .interval(Duration::from_secs(60))
                .run(),
        );

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*starts.lock().unwrap(), vec![Duration::ZERO]);

        time::sleep(Duration::from_secs(58)).await;
        assert_eq!(starts.lock().unwrap().len(), 1);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            *starts.lock().unwrap(),
            vec![Duration::ZERO, Duration::from_secs(60)]
        );
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_cycle_does_not_trigger_catch_up_burst() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("1", "@a")]).await;
        let starts = Arc::new(Mutex::new(Vec::new()));
        let analytics = ClockedAnalytics {
            origin: Instant::now(),
            starts: starts.clone(),
        };
        let pause = SlowFirstPause {
            first: Duration::from_secs(130),
            calls: AtomicUsize::new(0),
        };
        let task = tokio::spawn(
            Scheduler::new(store, analytics, FakeNotifier::default(), pause)
                .interval(Duration::from_secs(60))
                .run(),
        );

        time::sleep(Duration::from_secs(200)).await;

        // first pass overruns two ticks; the next start is one interval later,
        // not an immediate replay of the missed tick
        assert_eq!(
            *starts.lock().unwrap(),
            vec![
                Duration::ZERO,
                Duration::from_secs(130),
                Duration::from_secs(190)
            ]
        );
        task.abort();
    }

    #[test]
    fn recipient_parsing() {
        assert_eq!(recipient("-100123"), Recipient::Id(ChatId(-100123)));
        assert_eq!(
            recipient("@my_channel"),
            Recipient::ChannelUsername("@my_channel".into())
        );
    }

    #[test]
    fn fallback_notice_escapes_handle() {
        assert!(fallback_notice("a<b").contains("a&lt;b"));
    }
}
