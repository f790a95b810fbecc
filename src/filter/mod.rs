//! Request filter pipeline.
//!
//! Filters answer one question: should this request be dropped? They never
//! error, and every implementation is safe to share across crawl workers.

pub mod mark;
pub mod simple;
pub mod smart;

use std::sync::Arc;

pub use self::simple::SimpleFilter;
pub use self::smart::SmartFilter;
use crate::config::{FilterMode, TaskConfig};
use crate::model::Request;

pub trait Filter: Send + Sync {
    /// `true` when the request should be dropped.
    fn do_filter(&self, req: &Request) -> bool;
}

/// Builds the filter for one crawl. Each call returns fresh state.
pub fn build_filter(
    mode: FilterMode,
    host_limit: Option<&str>,
    config: &TaskConfig,
) -> Arc<dyn Filter> {
    let simple = SimpleFilter::new(host_limit);
    let limit = config.bucket_limit(mode);
    match mode {
        FilterMode::Simple => Arc::new(simple),
        FilterMode::Smart => Arc::new(SmartFilter::new(simple, false, limit)),
        FilterMode::Strict => Arc::new(SmartFilter::new(simple, true, limit)),
    }
}

/// Case-insensitive substring match of any keyword against the full URL.
pub fn is_ignored_by_keyword(req: &Request, keywords: &[String]) -> bool {
    let url = req.url.as_str().to_ascii_lowercase();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .any(|k| url.contains(&k.to_ascii_lowercase()))
}
