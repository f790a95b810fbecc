//! Request records exchanged between the browser, the filters and the scheduler.

pub mod domain;
pub mod url;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
pub use self::url::RequestUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(ModelError::UnknownMethod(other.to_string())),
        }
    }
}

/// Where a request was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Target,
    Navigation,
    #[serde(rename = "XHR")]
    Xhr,
    #[serde(rename = "DOM")]
    Dom,
    JavaScript,
    PathFuzz,
    #[serde(rename = "robots.txt")]
    Robots,
    Comment,
    WebSocket,
    EventSource,
    Fetch,
    #[serde(rename = "HistoryAPI")]
    HistoryApi,
    OpenWindow,
    HashChange,
    StaticResource,
    StaticRegex,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Target => "Target",
            Source::Navigation => "Navigation",
            Source::Xhr => "XHR",
            Source::Dom => "DOM",
            Source::JavaScript => "JavaScript",
            Source::PathFuzz => "PathFuzz",
            Source::Robots => "robots.txt",
            Source::Comment => "Comment",
            Source::WebSocket => "WebSocket",
            Source::EventSource => "EventSource",
            Source::Fetch => "Fetch",
            Source::HistoryApi => "HistoryAPI",
            Source::OpenWindow => "OpenWindow",
            Source::HashChange => "HashChange",
            Source::StaticResource => "StaticResource",
            Source::StaticRegex => "StaticRegex",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    pub post_data: String,
}

/// One candidate HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub method: Method,
    pub url: RequestUrl,
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "data")]
    pub post_data: String,
    pub source: Source,
    #[serde(skip)]
    pub gremlin_testing: bool,
    #[serde(skip)]
    pub proxy: Option<String>,
}

impl Request {
    pub fn new(method: Method, raw_url: &str) -> Result<Self, ModelError> {
        Self::with_options(method, raw_url, RequestOptions::default())
    }

    pub fn with_options(
        method: Method,
        raw_url: &str,
        options: RequestOptions,
    ) -> Result<Self, ModelError> {
        Ok(Self::from_url(method, RequestUrl::parse(raw_url)?, options))
    }

    pub fn from_url(method: Method, url: RequestUrl, options: RequestOptions) -> Self {
        Self {
            method,
            url,
            headers: options.headers,
            post_data: options.post_data,
            source: Source::Target,
            gremlin_testing: false,
            proxy: None,
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Identity for exact dedup: method, normalized URL and body. Headers are ignored.
    pub fn unique_id(&self) -> String {
        let digest = md5::compute(format!(
            "{}{}{}",
            self.method,
            self.url.normalized(),
            self.post_data
        ));
        format!("{digest:x}")
    }

    /// `METHOD URL [DATA]`, the key used by the JSON report.
    pub fn summary_key(&self) -> String {
        if self.post_data.is_empty() {
            format!("{} {}", self.method, self.url)
        } else {
            format!("{} {} {}", self.method, self.url, self.post_data)
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.method, self.url)?;
        for (name, value) in &self.headers {
            writeln!(f, "{name}: {value}")?;
        }
        if !self.post_data.is_empty() {
            writeln!(f)?;
            writeln!(f, "{}", self.post_data)?;
        }
        Ok(())
    }
}
