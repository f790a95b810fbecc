use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::model::Request;
use crate::model::domain::is_subdomain_of;

/// What a crawl produced. Filled under the scheduler's lock while running,
/// frozen once the crawl finishes.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Requests that passed the filter: the crawl's real output.
    pub req_list: Vec<Request>,
    /// Every request observed, across all hosts, deduplicated after the run.
    pub all_req_list: Vec<Request>,
    pub all_domain_list: Vec<String>,
    pub sub_domain_list: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlResult {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            req_list: Vec::new(),
            all_req_list: Vec::new(),
            all_domain_list: Vec::new(),
            sub_domain_list: Vec::new(),
            started_at,
            finished_at: None,
        }
    }

    /// Whole seconds between start and finish (zero while unfinished).
    pub fn runtime_secs(&self) -> i64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduced {
    pub all_req_list: Vec<Request>,
    pub all_domain_list: Vec<String>,
    pub sub_domain_list: Vec<String>,
}

/// Post-run pass over every observed request: exact dedup keeping the first
/// occurrence, then the distinct hostnames and the subdomains of `root_domain`,
/// both in first-seen order.
pub fn reduce(all_req_list: Vec<Request>, root_domain: &str) -> Reduced {
    let mut ids = HashSet::new();
    let all_req_list = all_req_list
        .into_iter()
        .filter(|req| ids.insert(req.unique_id()))
        .collect::<Vec<_>>();

    let mut hosts = HashSet::new();
    let all_domain_list = all_req_list
        .iter()
        .map(|req| req.url.hostname())
        .filter(|host| hosts.insert(*host))
        .map(str::to_string)
        .collect::<Vec<_>>();

    let sub_domain_list = all_domain_list
        .iter()
        .filter(|host| is_subdomain_of(host, root_domain))
        .cloned()
        .collect();

    Reduced {
        all_req_list,
        all_domain_list,
        sub_domain_list,
    }
}
