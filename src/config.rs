//! Crawl configuration and parsing of operator-supplied values.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
pub const DEFAULT_INPUT_TEXT: &str = "reqhound";
pub const MAX_TABS_COUNT: usize = 10;
pub const MAX_CRAWL_COUNT: usize = 200;
pub const MAX_RUN_TIME: Duration = Duration::from_secs(60 * 60);
pub const TAB_RUN_TIMEOUT: Duration = Duration::from_secs(20);
pub const DOM_CONTENT_LOADED_TIMEOUT: Duration = Duration::from_secs(5);
pub const EVENT_TRIGGER_INTERVAL: Duration = Duration::from_millis(100);
pub const BEFORE_EXIT_DELAY: Duration = Duration::from_secs(1);
pub const SMART_BUCKET_LIMIT: usize = 16;
pub const STRICT_BUCKET_LIMIT: usize = 4;

pub const DEFAULT_IGNORE_KEYWORDS: [&str; 3] = ["logout", "quit", "exit"];

/// Form field categories an operator may override with `--form-values`.
pub const ALLOWED_FORM_NAMES: [&str; 11] = [
    "default", "mail", "code", "phone", "username", "password", "qq", "id_card", "url", "date",
    "number",
];

/// Extensions that never lead to new requests.
pub const STATIC_SUFFIXES: &[&str] = &[
    "png", "gif", "jpg", "mp4", "mp3", "mng", "pct", "bmp", "jpeg", "pst", "psp", "ttf", "tif",
    "tiff", "ai", "drw", "wma", "ogg", "wav", "ra", "aac", "mid", "au", "aiff", "dxf", "eps", "ps",
    "svg", "3gp", "asf", "asx", "avi", "mov", "mpg", "qt", "rm", "wmv", "m4a", "bin", "xls",
    "xlsx", "ppt", "pptx", "doc", "docx", "odt", "ods", "odg", "odp", "exe", "zip", "rar", "tar",
    "gz", "iso", "rss", "pdf", "txt", "dll", "ico", "gz2", "apk", "crt", "woff", "map", "woff2",
    "webp", "less", "dmg", "bz2", "otf", "swf", "flv", "mpeg", "dat", "xsl", "csv", "cab", "exif",
    "wps", "m4v", "rmvb",
];

/// Extra suffixes dropped once structural filtering is on.
pub const SCRIPT_RESOURCE_SUFFIXES: [&str; 3] = ["js", "css", "json"];

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Simple,
    #[default]
    Smart,
    Strict,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterMode::Simple => "simple",
            FilterMode::Smart => "smart",
            FilterMode::Strict => "strict",
        })
    }
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventTriggerMode {
    #[default]
    Async,
    Sync,
}

/// Read-only crawl settings shared by every worker.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub max_crawl_count: usize,
    pub max_run_time: Duration,
    pub max_tabs_count: usize,
    pub tab_run_timeout: Duration,
    pub dom_content_loaded_timeout: Duration,
    pub event_trigger_mode: EventTriggerMode,
    pub event_trigger_interval: Duration,
    pub before_exit_delay: Duration,
    pub filter_mode: FilterMode,
    pub smart_bucket_limit: usize,
    pub strict_bucket_limit: usize,
    pub ignore_keywords: Vec<String>,
    pub custom_form_values: HashMap<String, String>,
    pub custom_form_keyword_values: HashMap<String, String>,
    pub extra_headers: BTreeMap<String, String>,
    pub path_from_robots: bool,
    pub path_by_fuzz: bool,
    pub fuzz_dict_path: Option<PathBuf>,
    pub proxy: Option<String>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_crawl_count: MAX_CRAWL_COUNT,
            max_run_time: MAX_RUN_TIME,
            max_tabs_count: MAX_TABS_COUNT,
            tab_run_timeout: TAB_RUN_TIMEOUT,
            dom_content_loaded_timeout: DOM_CONTENT_LOADED_TIMEOUT,
            event_trigger_mode: EventTriggerMode::default(),
            event_trigger_interval: EVENT_TRIGGER_INTERVAL,
            before_exit_delay: BEFORE_EXIT_DELAY,
            filter_mode: FilterMode::default(),
            smart_bucket_limit: SMART_BUCKET_LIMIT,
            strict_bucket_limit: STRICT_BUCKET_LIMIT,
            ignore_keywords: DEFAULT_IGNORE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            custom_form_values: HashMap::new(),
            custom_form_keyword_values: HashMap::new(),
            extra_headers: BTreeMap::new(),
            path_from_robots: false,
            path_by_fuzz: false,
            fuzz_dict_path: None,
            proxy: None,
        }
    }
}

impl TaskConfig {
    pub fn with_max_crawl_count(mut self, count: usize) -> Self {
        self.max_crawl_count = count;
        self
    }

    pub fn with_max_run_time(mut self, max_run_time: Duration) -> Self {
        self.max_run_time = max_run_time;
        self
    }

    pub fn with_max_tabs_count(mut self, count: usize) -> Self {
        self.max_tabs_count = count;
        self
    }

    pub fn with_tab_run_timeout(mut self, timeout: Duration) -> Self {
        self.tab_run_timeout = timeout;
        self
    }

    pub fn with_filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    pub fn with_ignore_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Rejects zero-sized budgets and pools; the crawl would never run a tab.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tabs_count == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_tabs_count",
            });
        }
        if self.tab_run_timeout.is_zero() {
            return Err(ConfigError::NotPositive {
                field: "tab_run_timeout",
            });
        }
        if self.smart_bucket_limit == 0 || self.strict_bucket_limit == 0 {
            return Err(ConfigError::NotPositive {
                field: "bucket_limit",
            });
        }
        Ok(())
    }

    /// Bucket tolerance for a structural filter mode. Strict never admits
    /// more per bucket than smart.
    pub fn bucket_limit(&self, mode: FilterMode) -> usize {
        match mode {
            FilterMode::Strict => self.strict_bucket_limit.min(self.smart_bucket_limit),
            _ => self.smart_bucket_limit,
        }
    }
}

/// Parses `--form-values` items (`type=value`); the type must be a known form category.
pub fn parse_custom_form_values(items: &[String]) -> Result<HashMap<String, String>, ConfigError> {
    let mut parsed = HashMap::new();
    for item in items {
        let (key, value) = split_key_value(item)
            .ok_or_else(|| ConfigError::InvalidFormItem(item.clone()))?;
        if !ALLOWED_FORM_NAMES.contains(&key) {
            return Err(ConfigError::NotAllowedFormKey(key.to_string()));
        }
        parsed.insert(key.to_string(), value.to_string());
    }
    Ok(parsed)
}

/// Parses `--form-keyword-values` items (`keyword=value`).
pub fn parse_keyword_values(items: &[String]) -> Result<HashMap<String, String>, ConfigError> {
    let mut parsed = HashMap::new();
    for item in items {
        let (key, value) = split_key_value(item)
            .ok_or_else(|| ConfigError::InvalidKeywordItem(item.clone()))?;
        parsed.insert(key.to_string(), value.to_string());
    }
    Ok(parsed)
}

/// Parses the `--custom-headers` JSON object. Non-string values are stringified.
pub fn parse_extra_headers(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let object: serde_json::Map<String, Value> = serde_json::from_str(raw)?;
    Ok(object
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, value)
        })
        .collect())
}

fn split_key_value(item: &str) -> Option<(&str, &str)> {
    let (key, value) = item.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = TaskConfig::default();
        assert_eq!(config.max_crawl_count, 200);
        assert_eq!(config.max_tabs_count, 10);
        assert_eq!(config.tab_run_timeout, Duration::from_secs(20));
        assert_eq!(config.filter_mode, FilterMode::Smart);
        assert_eq!(config.ignore_keywords, vec!["logout", "quit", "exit"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_bucket_limit_never_exceeds_smart() {
        let mut config = TaskConfig::default().with_filter_mode(FilterMode::Strict);
        config.strict_bucket_limit = 50;
        assert_eq!(config.bucket_limit(FilterMode::Strict), config.smart_bucket_limit);
        config.strict_bucket_limit = 2;
        assert_eq!(config.bucket_limit(FilterMode::Strict), 2);
        assert_eq!(config.bucket_limit(FilterMode::Smart), config.smart_bucket_limit);
    }

    #[test]
    fn test_validate_rejects_zero_tabs() {
        let config = TaskConfig::default().with_max_tabs_count(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive { field: "max_tabs_count" })
        ));
    }

    #[test]
    fn test_parse_custom_form_values() {
        let parsed = parse_custom_form_values(&items(&["mail=a@b.c", "password=p=w"])).unwrap();
        assert_eq!(parsed["mail"], "a@b.c");
        assert_eq!(parsed["password"], "p=w");
    }

    #[test]
    fn test_parse_custom_form_values_rejects_bad_input() {
        assert!(matches!(
            parse_custom_form_values(&items(&["mail"])),
            Err(ConfigError::InvalidFormItem(_))
        ));
        assert!(matches!(
            parse_custom_form_values(&items(&["nickname=bob"])),
            Err(ConfigError::NotAllowedFormKey(k)) if k == "nickname"
        ));
    }

    #[test]
    fn test_parse_keyword_values() {
        let parsed = parse_keyword_values(&items(&["captcha=1234"])).unwrap();
        assert_eq!(parsed["captcha"], "1234");
        assert!(matches!(
            parse_keyword_values(&items(&["=x"])),
            Err(ConfigError::InvalidKeywordItem(_))
        ));
    }

    #[test]
    fn test_parse_extra_headers() {
        let headers =
            parse_extra_headers(r#"{"Cookie": "a=1", "X-Retry": 3}"#).unwrap();
        assert_eq!(headers["Cookie"], "a=1");
        assert_eq!(headers["X-Retry"], "3");
        assert!(parse_extra_headers("").unwrap().is_empty());
        assert!(matches!(
            parse_extra_headers("[1,2]"),
            Err(ConfigError::InvalidHeaders(_))
        ));
    }
}
