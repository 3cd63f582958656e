//! Field-shape adapter for tweet payloads.
//!
//! Different source endpoints (and versions of the same endpoint) put the
//! same logical field in different places. Each logical field has an
//! ordered list of candidate dotted paths; the first one present with a
//! usable value wins.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::types::SourceTweet;

const ID_PATHS: &[&str] = &["id_str", "tweet_id", "tweetId", "id", "rest_id", "legacy.id_str"];
const TEXT_PATHS: &[&str] = &["full_text", "text", "legacy.full_text", "content"];
const AUTHOR_ID_PATHS: &[&str] = &[
    "author.rest_id",
    "author.id_str",
    "author.id",
    "user.id_str",
    "user.id",
    "user_info.rest_id",
    "author_id",
    "user_id",
];
const AUTHOR_NAME_PATHS: &[&str] = &[
    "author.screen_name",
    "author.userName",
    "author.username",
    "user.screen_name",
    "user_info.screen_name",
    "screen_name",
    "username",
];
const CREATED_PATHS: &[&str] = &["created_at", "createdAt", "timestamp", "legacy.created_at"];

/// Author name used when the payload carries none.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Twitter's classic `created_at` format, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const TWITTER_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Unix timestamps above this are taken as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |node, key| node.get(key))
}

/// Returns the first candidate rendered as a non-empty string. Numbers are
/// rendered in decimal.
fn first_string(raw: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(raw, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Parses a creation time in any of the shapes the source emits: RFC 3339,
/// Twitter's classic format, or unix seconds/milliseconds as a number or a
/// numeric string.
#[must_use]
pub fn parse_source_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(from_unix),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = DateTime::parse_from_str(s, TWITTER_TIME_FORMAT) {
                return Some(dt.with_timezone(&Utc));
            }
            s.parse::<i64>().ok().and_then(from_unix)
        }
        _ => None,
    }
}

fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    if ts.abs() >= MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(ts).single()
    } else {
        Utc.timestamp_opt(ts, 0).single()
    }
}

/// Flattens one raw tweet. Returns `None` when no tweet id can be found,
/// since such an entry can be neither deduplicated nor stored.
#[must_use]
pub fn normalize_tweet(raw: &Value) -> Option<SourceTweet> {
    let tweet_id = first_string(raw, ID_PATHS)?;
    let created_at = CREATED_PATHS
        .iter()
        .find_map(|path| lookup(raw, path).and_then(parse_source_timestamp));

    Some(SourceTweet {
        tweet_id,
        text: first_string(raw, TEXT_PATHS).unwrap_or_default(),
        author_id: first_string(raw, AUTHOR_ID_PATHS),
        author_name: first_string(raw, AUTHOR_NAME_PATHS)
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        created_at,
    })
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
