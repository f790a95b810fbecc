use std::fmt;

use serde::{Serialize, Serializer};
use tracing::debug;
use url::Url;

use super::domain::root_domain;
use crate::error::ModelError;

/// A parsed `http`/`https` URL with the facts the filters need derived up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    url: Url,
    hostname: String,
    root_domain: String,
    file_ext: String,
}

impl RequestUrl {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let url = Url::parse(raw.trim())?;
        Self::from_url(url)
    }

    /// Resolves `href` against `base`, as a browser would for a link on that page.
    pub fn join(base: &RequestUrl, href: &str) -> Result<Self, ModelError> {
        let url = base.url.join(href.trim())?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, ModelError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ModelError::UnsupportedScheme(url.scheme().to_string()));
        }
        let hostname = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ModelError::MissingHost(url.to_string()))?
            .to_ascii_lowercase();
        let root_domain = root_domain(&hostname);
        let file_ext = file_ext_of(url.path());

        Ok(Self {
            url,
            hostname,
            root_domain,
            file_ext,
        })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Explicit, non-default port. `http://h:80/` reports `None`.
    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// `hostname[:port]`, with the port only when it is explicit.
    pub fn host(&self) -> String {
        match self.port() {
            Some(port) => format!("{}:{port}", self.hostname),
            None => self.hostname.clone(),
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.url.fragment()
    }

    pub fn file_ext(&self) -> &str {
        &self.file_ext
    }

    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }

    /// `path[?query]`
    pub fn request_uri(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{q}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }

    /// Serialization used for identity: fragment dropped unless it is a
    /// client-side route (`#/...`, `#!/...`).
    pub fn normalized(&self) -> String {
        let mut url = self.url.clone();
        let keep_fragment = url
            .fragment()
            .is_some_and(|f| f.starts_with('/') || f.starts_with("!/"));
        if !keep_fragment {
            url.set_fragment(None);
        }
        url.to_string()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// Same URL with the other web scheme (`http` <-> `https`).
    pub fn with_flipped_scheme(&self) -> Self {
        let mut url = self.url.clone();
        let flipped = if url.scheme() == "http" { "https" } else { "http" };
        if url.set_scheme(flipped).is_err() {
            debug!(url = %self.url, scheme = flipped, "scheme flip rejected");
        }
        Self {
            url,
            ..self.clone()
        }
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl Serialize for RequestUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.url.as_str())
    }
}

fn file_ext_of(path: &str) -> String {
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}
