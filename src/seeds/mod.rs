//! Extra starting points added before the crawl runs.

pub mod fuzz;
pub mod robots;

use async_trait::async_trait;
use tracing::warn;

use crate::config::TaskConfig;
use crate::model::{Request, RequestOptions};

pub use self::fuzz::FuzzSeeds;
pub use self::robots::RobotsSeeds;

#[async_trait]
pub trait SeedGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidate requests derived from `target`. Failures are logged and
    /// yield an empty list; seeding never aborts a crawl.
    async fn generate(&self, target: &Request) -> Vec<Request>;
}

/// Generators enabled by `config`. A fuzz dictionary replaces the built-in
/// fuzz list when both are requested.
pub fn from_config(config: &TaskConfig) -> Vec<Box<dyn SeedGenerator>> {
    let mut generators: Vec<Box<dyn SeedGenerator>> = Vec::new();
    if config.path_from_robots {
        generators.push(Box::new(RobotsSeeds::new()));
    }
    match &config.fuzz_dict_path {
        Some(path) => {
            if config.path_by_fuzz {
                warn!("--fuzz-path is ignored, using --fuzz-path-dict instead");
            }
            generators.push(Box::new(FuzzSeeds::from_dict(path.clone())));
        }
        None if config.path_by_fuzz => generators.push(Box::new(FuzzSeeds::builtin())),
        None => {}
    }
    generators
}

/// `scheme://host[:port]` of the target, without a trailing slash.
pub(crate) fn origin(target: &Request) -> String {
    format!("{}://{}", target.url.scheme(), target.url.host())
}

/// Builds a GET for `path` on the target's origin, carrying the target's headers.
pub(crate) fn request_for_path(target: &Request, path: &str) -> Option<Request> {
    let path = path.trim();
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    Request::with_options(
        crate::model::Method::Get,
        &format!("{}{path}", origin(target)),
        RequestOptions {
            headers: target.headers.clone(),
            post_data: String::new(),
        },
    )
    .ok()
}
