use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{SeedGenerator, request_for_path};
use crate::model::{Request, Source};

const CHECK_CONCURRENCY: usize = 10;

const BUILTIN_PATHS: &[&str] = &[
    "admin", "admin/login", "administrator", "manager", "manage", "console", "dashboard",
    "login", "user", "users", "member", "account", "register", "api", "api/v1", "api/v2",
    "swagger-ui.html", "swagger", "docs", "graphql", "upload", "uploads", "files",
    "download", "backup", "backups", "bak", "old", "test", "tmp", "temp", "dev", "debug",
    "config", "include", "includes", "static", "assets", "js", "css", "images", "img",
    "search", "cgi-bin", "phpmyadmin", "wp-admin", "wp-login.php", "server-status",
    "status", "health", "actuator", "actuator/env", "web.config", "robots.txt",
    "sitemap.xml", ".git/config", ".svn/entries", ".env",
];

#[derive(Debug, Clone)]
enum PathSource {
    Builtin,
    Dict(PathBuf),
}

/// Guesses common paths on the target and keeps the ones that exist.
pub struct FuzzSeeds {
    paths: PathSource,
    client: reqwest::Client,
}

impl FuzzSeeds {
    pub fn builtin() -> Self {
        Self {
            paths: PathSource::Builtin,
            client: check_client(),
        }
    }

    /// One path per line; blank lines and `#` comments are skipped.
    pub fn from_dict(path: PathBuf) -> Self {
        Self {
            paths: PathSource::Dict(path),
            client: check_client(),
        }
    }

    async fn candidate_paths(&self) -> Vec<String> {
        match &self.paths {
            PathSource::Builtin => BUILTIN_PATHS.iter().map(|p| p.to_string()).collect(),
            PathSource::Dict(path) => match tokio::fs::read_to_string(path).await {
                Ok(text) => parse_dictionary(&text),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "fuzz dictionary unreadable");
                    Vec::new()
                }
            },
        }
    }
}

fn check_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_default()
}

pub fn parse_dictionary(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Anything other than a missing page or a server error counts as present.
fn path_exists(status: u16) -> bool {
    status != 404 && status != 410 && status < 500
}

#[async_trait]
impl SeedGenerator for FuzzSeeds {
    fn name(&self) -> &'static str {
        match self.paths {
            PathSource::Builtin => "fuzz",
            PathSource::Dict(_) => "fuzz-dict",
        }
    }

    async fn generate(&self, target: &Request) -> Vec<Request> {
        let mut candidates = self
            .candidate_paths()
            .await
            .into_iter()
            .filter_map(|path| request_for_path(target, &path))
            .map(|req| req.with_source(Source::PathFuzz))
            .enumerate()
            .collect::<Vec<_>>();
        candidates.reverse();
        let total = candidates.len();
        let headers = Arc::new(target.headers.clone());

        let mut found = Vec::new();
        let mut set = JoinSet::new();
        loop {
            while set.len() < CHECK_CONCURRENCY {
                let Some((index, req)) = candidates.pop() else {
                    break;
                };
                let client = self.client.clone();
                let headers = headers.clone();
                set.spawn(async move {
                    let mut check = client.get(req.url.as_str());
                    for (name, value) in headers.iter() {
                        check = check.header(name.as_str(), value.as_str());
                    }
                    let status = check.send().await.map(|res| res.status().as_u16());
                    (index, req, status)
                });
            }

            if set.is_empty() {
                break;
            }

            if let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, req, Ok(status))) if path_exists(status) => found.push((index, req)),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "fuzz check failed"),
                }
            }
        }

        found.sort_by_key(|(index, _)| *index);
        info!(checked = total, found = found.len(), "paths by fuzzing");
        found.into_iter().map(|(_, req)| req).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::model::Method;

    #[test]
    fn test_parse_dictionary() {
        let text = "# common\n/admin\n\n  backup/ \n#skip\n";
        assert_eq!(parse_dictionary(text), vec!["/admin", "backup/"]);
    }

    #[test]
    fn test_path_exists() {
        assert!(path_exists(200));
        assert!(path_exists(302));
        assert!(path_exists(403));
        assert!(!path_exists(404));
        assert!(!path_exists(503));
    }

    #[tokio::test]
    async fn test_dictionary_check_keeps_existing_paths_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin"))
            .respond_with(ResponseTemplate::new(302))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/backup"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut dict = tempfile::NamedTempFile::new().unwrap();
        writeln!(dict, "admin\nmissing\n# note\nbackup").unwrap();

        let target = Request::new(Method::Get, &server.uri()).unwrap();
        let seeds = FuzzSeeds::from_dict(dict.path().to_path_buf())
            .generate(&target)
            .await;
        let paths = seeds.iter().map(|r| r.url.path()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["/admin", "/backup"]);
        assert!(seeds.iter().all(|r| r.source == Source::PathFuzz));
    }

    #[tokio::test]
    async fn test_unreadable_dictionary_yields_nothing() {
        let target = Request::new(Method::Get, "http://127.0.0.1:9/").unwrap();
        let seeds = FuzzSeeds::from_dict(PathBuf::from("/nonexistent/reqhound/dict.txt"))
            .generate(&target)
            .await;
        assert!(seeds.is_empty());
    }
}
