// src/fetcher.rs

//! Remote analytics client
use crate::config::Config;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use log::debug;
use serde_json::{json, Value};

pub const RPC_METHOD: &str = "getProfileAnalytics";
pub const TOOL: &str = "tiktok-profile-analytics";
pub const DASHBOARD_VERSION: &str = "2";

/// Source of raw analytics for a handle.
pub trait Analytics: Send + Sync {
    fn fetch<'a>(&'a self, handle: &'a str) -> BoxFuture<'a, Result<Value>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    endpoint: String,
    timezone: String,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, timezone: impl Into<String>) -> Self {
        HttpFetcher {
            client,
            endpoint: endpoint.into(),
            timezone: timezone.into(),
        }
    }

    pub fn from_config(cfg: &Config, client: reqwest::Client) -> Self {
        Self::new(client, cfg.endpoint.clone(), cfg.timezone.clone())
    }

    fn envelope(&self, handle: &str) -> Value {
        json!({
            "id": chrono::Utc::now().timestamp_millis(),
            "method": RPC_METHOD,
            "params": {
                "handle": handle,
                "timezone": self.timezone,
                "tool": TOOL,
                "auth": { "dashboardVersion": DASHBOARD_VERSION },
            },
        })
    }

    async fn request(&self, handle: &str) -> Result<Value> {
        debug!("fetching analytics for {}", handle);
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&self.envelope(handle))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Fetch(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let text = resp.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Fetch(format!("response is not JSON: {}", e)))?;
        unwrap_envelope(body)
    }
}

impl Analytics for HttpFetcher {
    fn fetch<'a>(&'a self, handle: &'a str) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.request(handle))
    }
}

/// Accept either a bare analytics object or a `{result: {...}}` envelope.
fn unwrap_envelope(body: Value) -> Result<Value> {
    let Value::Object(mut obj) = body else {
        return Err(Error::Fetch("response is not a JSON object".into()));
    };
    if let Some(err) = obj.get("error").filter(|e| !e.is_null()) {
        return Err(Error::Fetch(format!("remote error: {}", err)));
    }
    match obj.remove("result") {
        Some(result @ Value::Object(_)) => Ok(result),
        Some(other) => {
            obj.insert("result".into(), other);
            Ok(Value::Object(obj))
        }
        None => Ok(Value::Object(obj)),
    }
}
