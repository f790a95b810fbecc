//! Browser seam consumed by the crawl scheduler.
//!
//! The scheduler only needs "run one tab for this request and report what it
//! saw" plus a final shutdown. [`webdriver::WebDriverBrowser`] is the real
//! implementation; tests drive the scheduler through scripted in-memory ones.

pub mod collect;
pub mod driver;
pub mod form;
pub mod webdriver;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{EventTriggerMode, TaskConfig};
use crate::error::BrowserError;
use crate::model::Request;

pub use self::driver::{BrowserKind, DriverOptions};
pub use self::webdriver::WebDriverBrowser;

/// Per-tab knobs, derived from [`TaskConfig`] with the tab budget already
/// clamped to the remaining crawl time.
#[derive(Debug, Clone)]
pub struct TabOptions {
    pub timeout: Duration,
    pub dom_content_loaded_timeout: Duration,
    pub event_trigger_mode: EventTriggerMode,
    pub event_trigger_interval: Duration,
    pub before_exit_delay: Duration,
    pub ignore_keywords: Vec<String>,
    pub custom_form_values: HashMap<String, String>,
    pub custom_form_keyword_values: HashMap<String, String>,
}

impl TabOptions {
    pub fn from_config(config: &TaskConfig, timeout: Duration) -> Self {
        Self {
            timeout,
            dom_content_loaded_timeout: config.dom_content_loaded_timeout,
            event_trigger_mode: config.event_trigger_mode,
            event_trigger_interval: config.event_trigger_interval,
            before_exit_delay: config.before_exit_delay,
            ignore_keywords: config.ignore_keywords.clone(),
            custom_form_values: config.custom_form_values.clone(),
            custom_form_keyword_values: config.custom_form_keyword_values.clone(),
        }
    }
}

#[async_trait]
pub trait Browser: Send + Sync {
    /// Loads `req` in a fresh tab and returns every request observed, in
    /// discovery order. Hitting `opts.timeout` is not an error: whatever was
    /// collected up to that point is returned.
    async fn run_tab(&self, req: &Request, opts: &TabOptions) -> Result<Vec<Request>, BrowserError>;

    /// Releases every browser resource. Called once per crawl.
    async fn close(&self);
}
