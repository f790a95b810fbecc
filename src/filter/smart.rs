use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::trace;

use super::mark::mark_request;
use super::simple::SimpleFilter;
use crate::config::SCRIPT_RESOURCE_SUFFIXES;
use crate::filter::Filter;
use crate::model::Request;

#[derive(Debug, Default)]
struct SmartState {
    marked_ids: HashSet<String>,
    buckets: HashMap<String, usize>,
}

/// Structural near-duplicate suppression on top of a [`SimpleFilter`].
///
/// Each request is reduced to a marked id (volatile values replaced by
/// markers) and a bucket fingerprint (path shape plus parameter names). A
/// request is dropped when its marked id was already seen, or when its bucket
/// already holds `bucket_limit` distinct marked ids.
#[derive(Debug)]
pub struct SmartFilter {
    simple: SimpleFilter,
    strict: bool,
    bucket_limit: usize,
    state: Mutex<SmartState>,
}

impl SmartFilter {
    pub fn new(mut simple: SimpleFilter, strict: bool, bucket_limit: usize) -> Self {
        simple.extend_static_suffixes(SCRIPT_RESOURCE_SUFFIXES);
        Self {
            simple,
            strict,
            bucket_limit: bucket_limit.max(1),
            state: Mutex::new(SmartState::default()),
        }
    }
}

impl Filter for SmartFilter {
    fn do_filter(&self, req: &Request) -> bool {
        if self.simple.do_filter(req) {
            return true;
        }

        let marked = mark_request(req, self.strict);
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.marked_ids.contains(&marked.marked_id) {
            trace!(id = %marked.marked_id, "marked duplicate");
            return true;
        }

        let count = state.buckets.get(&marked.fingerprint).copied().unwrap_or(0);
        if count >= self.bucket_limit {
            trace!(bucket = %marked.fingerprint, count, "bucket full");
            return true;
        }

        state.buckets.insert(marked.fingerprint, count + 1);
        state.marked_ids.insert(marked.marked_id);
        false
    }
}
