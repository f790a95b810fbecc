//! Crawl scheduler.
//!
//! A crawl moves through `Seeding -> Running -> Draining -> Finished`. Each
//! unit of work runs one browser tab for one request; survivors of the filter
//! are fed back into the same pool until nothing is outstanding or a budget
//! (crawl count, wall time) stops admission.

pub mod pool;
pub mod result;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TaskConfig;
use crate::engine::{Browser, TabOptions};
use crate::error::{ConfigError, Error};
use crate::filter::{Filter, build_filter, is_ignored_by_keyword};
use crate::model::{Request, Source};
use crate::seeds::SeedGenerator;

pub use self::pool::{PoolRunner, WorkerPool};
pub use self::result::{CrawlResult, Reduced, reduce};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Seeding,
    Running,
    Draining,
    Finished,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrawlState::Seeding => "seeding",
            CrawlState::Running => "running",
            CrawlState::Draining => "draining",
            CrawlState::Finished => "finished",
        })
    }
}

pub struct CrawlerTask {
    targets: Vec<Request>,
    config: Arc<TaskConfig>,
    browser: Arc<dyn Browser>,
    cancel: CancellationToken,
    filter: Arc<dyn Filter>,
    root_domain: String,
    generators: Vec<Box<dyn SeedGenerator>>,
    state: watch::Sender<CrawlState>,
}

/// State every unit of work reaches through one `Arc`.
struct Shared {
    config: Arc<TaskConfig>,
    browser: Arc<dyn Browser>,
    filter: Arc<dyn Filter>,
    pool: Arc<WorkerPool>,
    cancel: CancellationToken,
    result: Mutex<CrawlResult>,
    crawled_count: Mutex<usize>,
    started: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl CrawlerTask {
    /// Prepares a crawl over `targets`, which must share one host. A lone
    /// target is also tried with the other web scheme.
    pub fn new(
        mut targets: Vec<Request>,
        config: TaskConfig,
        browser: Arc<dyn Browser>,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        if targets.is_empty() {
            return Err(ConfigError::NoValidTargets.into());
        }

        if targets.len() == 1 {
            let mut flipped = targets[0].clone();
            flipped.url = flipped.url.with_flipped_scheme();
            targets.push(flipped);
        }
        for req in &mut targets {
            req.source = Source::Target;
        }

        let host_limit = targets[0].url.host();
        let root_domain = targets[0].url.root_domain().to_string();
        let filter = build_filter(config.filter_mode, Some(&host_limit), &config);
        let (state, _) = watch::channel(CrawlState::Seeding);

        info!(
            host = %host_limit,
            max_tabs = config.max_tabs_count,
            max_crawl_count = config.max_crawl_count,
            max_run_time = ?config.max_run_time,
            filter_mode = %config.filter_mode,
            "init crawler task"
        );

        Ok(Self {
            targets,
            config: Arc::new(config),
            browser,
            cancel,
            filter,
            root_domain,
            generators: Vec::new(),
            state,
        })
    }

    pub fn add_seed_generator(&mut self, generator: Box<dyn SeedGenerator>) {
        self.generators.push(generator);
    }

    pub fn with_seed_generators(mut self, generators: Vec<Box<dyn SeedGenerator>>) -> Self {
        self.generators.extend(generators);
        self
    }

    pub fn targets(&self) -> &[Request] {
        &self.targets
    }

    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }

    pub fn state(&self) -> CrawlState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition of this crawl.
    pub fn subscribe_state(&self) -> watch::Receiver<CrawlState> {
        self.state.subscribe()
    }

    fn transition(&self, next: CrawlState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "crawl state");
    }

    /// Runs the crawl to completion (or cancellation) and returns the frozen result.
    pub async fn run(self) -> CrawlResult {
        let started = Instant::now();
        let mut result = CrawlResult::new(Utc::now());

        let mut seeds = self.targets.clone();
        for generator in &self.generators {
            let generated = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(generator = generator.name(), "seeding cancelled");
                    break;
                }
                generated = generator.generate(&self.targets[0]) => generated,
            };
            debug!(generator = generator.name(), count = generated.len(), "seeds generated");
            seeds.extend(generated);
        }

        result.all_req_list = seeds.clone();
        let mut initial = Vec::new();
        for req in seeds {
            if self.filter.do_filter(&req) {
                debug!(uri = %req.url.request_uri(), "filter req");
                continue;
            }
            result.req_list.push(req.clone());
            initial.push(req);
        }
        info!(count = initial.len(), "filter repeat, target count");

        let (pool, runner) = WorkerPool::new(self.config.max_tabs_count);
        let shared = Arc::new(Shared {
            config: self.config.clone(),
            browser: self.browser.clone(),
            filter: self.filter.clone(),
            pool: pool.clone(),
            cancel: self.cancel.clone(),
            result: Mutex::new(result),
            crawled_count: Mutex::new(0),
            started,
        });

        self.transition(CrawlState::Running);
        for req in initial {
            if !is_ignored_by_keyword(&req, &self.config.ignore_keywords) {
                shared.add_task(req);
            }
        }
        runner.run(&self.cancel).await;
        pool.close();
        if self.cancel.is_cancelled() {
            warn!("crawl cancelled, in-flight tabs drained");
        }

        self.transition(CrawlState::Draining);
        let mut result = std::mem::replace(&mut *lock(&shared.result), CrawlResult::new(Utc::now()));
        let reduced = reduce(std::mem::take(&mut result.all_req_list), &self.root_domain);
        result.all_req_list = reduced.all_req_list;
        result.all_domain_list = reduced.all_domain_list;
        result.sub_domain_list = reduced.sub_domain_list;

        self.browser.close().await;
        result.finished_at = Some(Utc::now());
        self.transition(CrawlState::Finished);

        info!(
            results = result.req_list.len(),
            requests = result.all_req_list.len(),
            subdomains = result.sub_domain_list.len(),
            domains = result.all_domain_list.len(),
            runtime_secs = result.runtime_secs(),
            "task finished"
        );
        result
    }
}

impl Shared {
    /// Admission under one lock: the run-time budget, then the crawl count.
    fn add_task(self: &Arc<Self>, req: Request) {
        if self.cancel.is_cancelled() {
            self.pool.close();
        }
        {
            let mut crawled = lock(&self.crawled_count);
            if self.started.elapsed() >= self.config.max_run_time {
                debug!(url = %req.url, "run time budget exhausted");
                return;
            }
            if *crawled >= self.config.max_crawl_count {
                debug!(url = %req.url, "crawl count budget exhausted");
                return;
            }
            *crawled += 1;
        }

        let shared = self.clone();
        let url = req.url.to_string();
        if let Err(err) = self.pool.submit(async move { shared.run_unit(req).await }) {
            error!(%url, error = %err, "add task to pool failed");
        }
    }

    async fn run_unit(self: Arc<Self>, req: Request) {
        let remaining = self
            .config
            .max_run_time
            .saturating_sub(self.started.elapsed());
        let tab_timeout = self.config.tab_run_timeout.min(remaining);
        if tab_timeout.is_zero() {
            debug!(url = %req.url, "no run time left for tab");
            return;
        }

        let opts = TabOptions::from_config(&self.config, tab_timeout);
        let discovered = match self.browser.run_tab(&req, &opts).await {
            Ok(found) => found,
            Err(err) => {
                warn!(url = %req.url, error = %err, "tab failed");
                Vec::new()
            }
        };
        debug!(url = %req.url, found = discovered.len(), "tab finished");

        lock(&self.result)
            .all_req_list
            .extend(discovered.iter().cloned());

        for found in discovered {
            if self.filter.do_filter(&found) {
                continue;
            }
            lock(&self.result).req_list.push(found.clone());
            if !is_ignored_by_keyword(&found, &self.config.ignore_keywords) {
                self.add_task(found);
            }
        }
    }
}
