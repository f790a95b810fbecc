use std::collections::HashSet;
use std::sync::Mutex;

use crate::config::STATIC_SUFFIXES;
use crate::filter::Filter;
use crate::model::Request;

/// Host scoping, exact dedup and static-resource exclusion.
#[derive(Debug)]
pub struct SimpleFilter {
    host_limit: Option<String>,
    static_suffixes: HashSet<String>,
    seen: Mutex<HashSet<String>>,
}

impl SimpleFilter {
    pub fn new(host_limit: Option<&str>) -> Self {
        Self {
            host_limit: host_limit
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty()),
            static_suffixes: STATIC_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn extend_static_suffixes<I, S>(&mut self, suffixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_suffixes
            .extend(suffixes.into_iter().map(|s| s.into().to_ascii_lowercase()));
    }

    pub fn host_limit(&self) -> Option<&str> {
        self.host_limit.as_deref()
    }

    /// True when the request leaves the configured host. Without a host limit
    /// nothing is out of scope.
    pub fn domain_filter(&self, req: &Request) -> bool {
        let Some(limit) = self.host_limit.as_deref() else {
            return false;
        };
        let url = &req.url;
        if url.host() == limit || url.hostname() == limit {
            return false;
        }
        if url.port().is_none() {
            let implied = match url.scheme() {
                "http" => format!("{}:80", url.hostname()),
                "https" => format!("{}:443", url.hostname()),
                _ => return true,
            };
            if implied == limit {
                return false;
            }
        }
        true
    }

    /// Exact dedup on [`Request::unique_id`]; records the id on first sight.
    pub fn unique_filter(&self, req: &Request) -> bool {
        let id = req.unique_id();
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        !seen.insert(id)
    }

    pub fn static_filter(&self, req: &Request) -> bool {
        let ext = req.url.file_ext();
        !ext.is_empty() && self.static_suffixes.contains(ext)
    }
}

impl Filter for SimpleFilter {
    fn do_filter(&self, req: &Request) -> bool {
        self.domain_filter(req) || self.unique_filter(req) || self.static_filter(req)
    }
}
