//! Structural fingerprints for near-duplicate suppression.
//!
//! Volatile values (ids, hashes, session tokens) are replaced by markers so
//! that `?id=1` and `?id=2` collapse, while short literal values such as
//! `?route=user/profile` stay distinct.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::model::Request;

const INT_MARK: &str = "{{int}}";
const HASH_MARK: &str = "{{hash}}";
const TOKEN_MARK: &str = "{{token}}";
const LONG_MARK: &str = "{{long}}";
const JSON_MARK: &str = "{{json}}";
const SEGMENT_MARK: &str = "{{seg}}";

const LONG_VALUE_LEN: usize = 64;

static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+$").expect("valid regex"));
static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{16,}$").expect("valid regex"));
static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid regex")
});
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-+/=.]{24,}$").expect("valid regex"));

/// Keys derived from one request by [`mark_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marked {
    /// Method, host, marked path and marked parameters: equal for requests
    /// that differ only in volatile values.
    pub marked_id: String,
    /// Method, host, path shape and parameter names: the bucket a request is
    /// counted against.
    pub fingerprint: String,
}

/// Classifies a single value, replacing volatile-looking ones with a marker.
pub fn mark_value(value: &str) -> Cow<'_, str> {
    if value.is_empty() {
        return Cow::Borrowed(value);
    }
    if value.chars().count() > LONG_VALUE_LEN {
        return Cow::Borrowed(LONG_MARK);
    }
    if INT_RE.is_match(value) {
        return Cow::Borrowed(INT_MARK);
    }
    if HEX_RE.is_match(value) || UUID_RE.is_match(value) {
        return Cow::Borrowed(HASH_MARK);
    }
    if TOKEN_RE.is_match(value)
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().any(|c| c.is_ascii_alphabetic())
    {
        return Cow::Borrowed(TOKEN_MARK);
    }
    Cow::Borrowed(value)
}

pub fn mark_path(path: &str) -> String {
    path.split('/')
        .map(|segment| mark_value(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Coarser path shape: every segment after the first collapses to a
/// placeholder (markers stay, the last segment keeps its extension), so
/// `/user/alice/profile` and `/user/bob/profile` share one shape.
pub fn strict_path_shape(path: &str) -> String {
    let marked = mark_path(path);
    let segments = marked.split('/').collect::<Vec<_>>();
    let last = segments.len() - 1;
    let mut seen_first = false;

    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            if segment.is_empty() || segment.starts_with("{{") {
                return segment.to_string();
            }
            if !seen_first {
                seen_first = true;
                return segment.to_string();
            }
            match segment.rsplit_once('.') {
                Some((stem, ext)) if index == last && !stem.is_empty() && !ext.is_empty() => {
                    format!("{SEGMENT_MARK}.{ext}")
                }
                _ => SEGMENT_MARK.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Parameters carried in the body: a flat JSON object or form-urlencoded pairs.
pub fn body_params(post_data: &str) -> Vec<(String, String)> {
    let trimmed = post_data.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) {
            return object
                .into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        Value::Null => String::new(),
                        _ => JSON_MARK.to_string(),
                    };
                    (k, value)
                })
                .collect();
        }
    }
    url::form_urlencoded::parse(trimmed.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

pub fn mark_request(req: &Request, strict: bool) -> Marked {
    let path = req.url.path();
    let marked_path = mark_path(path);
    let shape = if strict {
        strict_path_shape(path)
    } else {
        marked_path.clone()
    };

    let query = req.url.query_pairs();
    let body = body_params(&req.post_data);
    let host = req.url.host();

    let marked_id = format!(
        "{} {}{}?{}|{}",
        req.method,
        host,
        marked_path,
        marked_pairs(&query),
        marked_pairs(&body)
    );
    let fingerprint = format!(
        "{} {}{}?{}|{}",
        req.method,
        host,
        shape,
        param_names(&query),
        param_names(&body)
    );

    Marked {
        marked_id,
        fingerprint,
    }
}

fn marked_pairs(pairs: &[(String, String)]) -> String {
    let mut marked = pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", mark_value(v)))
        .collect::<Vec<_>>();
    marked.sort();
    marked.join("&")
}

fn param_names(pairs: &[(String, String)]) -> String {
    let mut names = pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
    names.sort_unstable();
    names.dedup();
    names.join(",")
}
