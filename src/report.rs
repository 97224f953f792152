// src/report.rs

//! Turns raw analytics JSON into an HTML report.
//!
//! The analytics payload is loosely typed, so every field is described by an
//! ordered list of extraction rules; the first rule that yields a value wins.
use serde_json::Value;

/// Maximum number of top videos listed in a report.
pub const TOP_VIDEOS: usize = 3;

pub const FALLBACK_NAME: &str = "Unknown profile";

type Rule = fn(&Value) -> Option<&Value>;

/// Apply `rules` in order and return the first non-null value.
pub fn first_of<'a>(raw: &'a Value, rules: &[Rule]) -> Option<&'a Value> {
    rules
        .iter()
        .filter_map(|rule| rule(raw))
        .find(|v| !v.is_null())
}

const NAME: &[Rule] = &[
    |r| non_empty(r.get("profile_name")),
    |r| non_empty(r.get("nickname")),
    |r| non_empty(r.get("profile_id")),
];
const PROFILE_ID: &[Rule] = &[|r| non_empty(r.get("profile_id"))];
const FOLLOWERS: &[Rule] = &[|r| r.pointer("/profile_followers/value")];
const ENGAGEMENT: &[Rule] = &[|r| r.pointer("/engagement_rate/float_2f")];
const POSTS: &[Rule] = &[|r| r.get("posts")];
const TOTAL_VIEWS: &[Rule] = &[
    |r| non_empty(r.pointer("/total_views/abbreviated")),
    |r| r.pointer("/total_views/value"),
];
const AVG_VIEWS: &[Rule] = &[|r| r.get("avg_views_per_video")];
const AVG_LIKES: &[Rule] = &[|r| r.get("avg_likes_per_video")];
const VIDEO_LIKES: &[Rule] = &[|p| p.get("likes"), |p| p.get("digg_count")];
const VIDEO_LINK: &[Rule] = &[
    |p| non_empty(p.get("url")),
    |p| non_empty(p.get("link")),
    |p| non_empty(p.get("share_url")),
];

fn non_empty(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !matches!(v, Value::String(s) if s.is_empty()))
}

/// HTML-escape `&`, `<` and `>`. Ampersands go first so entities produced
/// here are not escaped again.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_opt(text: Option<&str>) -> String {
    text.map(escape).unwrap_or_default()
}

/// Plain-text rendering of a JSON scalar.
pub fn text_of(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_or_zero(raw: &Value, rules: &[Rule]) -> String {
    first_of(raw, rules).map(text_of).unwrap_or_else(|| "0".to_string())
}

/// Numbers (and numeric strings) get one decimal place; anything else is
/// rendered as it came.
fn one_decimal(raw: &Value, rules: &[Rule]) -> String {
    match first_of(raw, rules) {
        None => format!("{:.1}", 0.0),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) => format!("{:.1}", f),
            None => n.to_string(),
        },
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => format!("{:.1}", f),
            _ => s.clone(),
        },
        Some(other) => text_of(other),
    }
}

/// A top video as it will be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopVideo {
    pub likes: String,
    pub link: Option<String>,
}

pub fn top_videos(raw: &Value) -> Vec<TopVideo> {
    let Some(posts) = raw.get("top_posts").and_then(Value::as_array) else {
        return Vec::new();
    };
    posts
        .iter()
        .take(TOP_VIDEOS)
        .map(|post| TopVideo {
            likes: text_or_zero(post, VIDEO_LIKES),
            link: first_of(post, VIDEO_LINK).map(text_of),
        })
        .collect()
}

pub fn format_report(raw: &Value) -> String {
    let name = first_of(raw, NAME)
        .map(text_of)
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let handle = first_of(raw, PROFILE_ID)
        .map(|id| format!("@{}", text_of(id)))
        .unwrap_or_default();

    let mut out = format!("📊 <b>{}</b>", escape(&name));
    if !handle.is_empty() {
        out.push_str(&format!(" ({})", escape(&handle)));
    }
    out.push_str("\n\n");
    out.push_str(&format!(
        "👥 Followers: <b>{}</b>\n",
        escape(&text_or_zero(raw, FOLLOWERS))
    ));
    out.push_str(&format!(
        "💬 Engagement rate: <b>{}%</b>\n",
        escape(&text_or_zero(raw, ENGAGEMENT))
    ));
    out.push_str(&format!(
        "🎬 Posts analyzed: <b>{}</b>\n",
        escape(&text_or_zero(raw, POSTS))
    ));
    out.push_str(&format!(
        "👀 Total views: <b>{}</b>\n",
        escape(&text_or_zero(raw, TOTAL_VIEWS))
    ));
    out.push_str(&format!(
        "📈 Avg views/video: <b>{}</b>\n",
        escape(&one_decimal(raw, AVG_VIEWS))
    ));
    out.push_str(&format!(
        "❤️ Avg likes/video: <b>{}</b>\n",
        escape(&one_decimal(raw, AVG_LIKES))
    ));

    let videos = top_videos(raw);
    if !videos.is_empty() {
        out.push_str("\n🔥 <b>Top videos</b>\n");
        for (i, video) in videos.iter().enumerate() {
            out.push_str(&format!("{}. ❤️ {}\n", i + 1, escape(&video.likes)));
            let link = escape_opt(video.link.as_deref());
            if !link.is_empty() {
                out.push_str(&link);
                out.push('\n');
            }
        }
    }
    out.trim_end().to_string()
}
