// src/store.rs
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// One registered chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub handle: String,
    #[serde(rename = "lastSentAt", default)]
    pub last_sent_at: Option<DateTime<Utc>>,
}

pub type Subscriptions = BTreeMap<String, Subscription>;

/// JSON-file backed subscription registry. Every mutation rewrites the whole
/// file before returning.
pub struct Store {
    path: PathBuf,
    subs: Mutex<Subscriptions>,
}

impl Store {
    /// Load the state file, creating it as `{}` when absent.
    ///
    /// A file that cannot be read or parsed is copied to `<path>.bak` and the
    /// store starts empty; the file itself is left alone until the next mutation.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let subs = load(&path);
        Store {
            path,
            subs: Mutex::new(subs),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add or replace the subscription for `chat_id`, clearing `lastSentAt`.
    pub async fn upsert(&self, chat_id: &str, handle: &str) {
        let mut subs = self.subs.lock().await;
        subs.insert(
            chat_id.to_string(),
            Subscription {
                handle: handle.to_string(),
                last_sent_at: None,
            },
        );
        self.persist(&subs);
    }

    /// Returns whether a subscription was actually removed. The file is only
    /// rewritten when it was.
    pub async fn remove(&self, chat_id: &str) -> bool {
        let mut subs = self.subs.lock().await;
        if subs.remove(chat_id).is_none() {
            return false;
        }
        self.persist(&subs);
        true
    }

    /// Record a successful delivery. No-op when the chat was removed meanwhile.
    pub async fn mark_sent(&self, chat_id: &str, at: DateTime<Utc>) -> bool {
        let mut subs = self.subs.lock().await;
        match subs.get_mut(chat_id) {
            Some(sub) => sub.last_sent_at = Some(at),
            None => return false,
        }
        self.persist(&subs);
        true
    }

    pub async fn get(&self, chat_id: &str) -> Option<Subscription> {
        self.subs.lock().await.get(chat_id).cloned()
    }

    /// Point-in-time copy of all entries, ordered by chat id.
    pub async fn snapshot(&self) -> Vec<(String, Subscription)> {
        self.subs
            .lock()
            .await
            .iter()
            .map(|(id, sub)| (id.clone(), sub.clone()))
            .collect()
    }

    fn persist(&self, subs: &Subscriptions) {
        if let Err(e) = save(&self.path, subs) {
            error!("写入状态文件失败 [{}]: {}", self.path.display(), e);
        }
    }
}

fn load(path: &Path) -> Subscriptions {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No state file at {}, starting empty", path.display());
            let empty = Subscriptions::new();
            if let Err(e) = save(path, &empty) {
                error!("cannot create {}: {}", path.display(), e);
            }
            return empty;
        }
        Err(e) => {
            error!("cannot read {}: {}", path.display(), e);
            return Subscriptions::new();
        }
    };

    match serde_json::from_slice::<Subscriptions>(&raw) {
        Ok(subs) => {
            info!("Loaded {} subscriptions from {}", subs.len(), path.display());
            subs
        }
        Err(e) => {
            error!("malformed state file {}: {}", path.display(), e);
            let backup = backup_path(path);
            match fs::write(&backup, &raw) {
                Ok(()) => warn!("unparsable state preserved at {}", backup.display()),
                Err(e) => error!("cannot back up {}: {}", path.display(), e),
            }
            Subscriptions::new()
        }
    }
}

/// Serialise the full mapping and replace the file atomically.
pub fn save(path: &Path, subs: &Subscriptions) -> Result<()> {
    let json = serde_json::to_string_pretty(subs).map_err(|e| Error::Store(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}
