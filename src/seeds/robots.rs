use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{SeedGenerator, origin, request_for_path};
use crate::model::{Request, Source};

/// Paths named by `Allow`/`Disallow` rules in the target's robots.txt.
pub struct RobotsSeeds {
    client: reqwest::Client,
}

impl RobotsSeeds {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for RobotsSeeds {
    fn default() -> Self {
        Self::new()
    }
}

/// Rule paths in file order, without wildcard patterns or duplicates.
pub fn parse_robots_paths(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_ascii_lowercase();
        if field != "allow" && field != "disallow" {
            continue;
        }
        let value = value.trim();
        if value.is_empty() || value == "/" || value.contains('*') || value.contains('$') {
            continue;
        }
        if seen.insert(value.to_string()) {
            paths.push(value.to_string());
        }
    }
    paths
}

#[async_trait]
impl SeedGenerator for RobotsSeeds {
    fn name(&self) -> &'static str {
        "robots.txt"
    }

    async fn generate(&self, target: &Request) -> Vec<Request> {
        let robots_url = format!("{}/robots.txt", origin(target));
        let text = match self.client.get(&robots_url).send().await {
            Ok(res) if res.status().is_success() => res.text().await.unwrap_or_default(),
            Ok(res) => {
                debug!(url = %robots_url, status = res.status().as_u16(), "no robots.txt");
                return Vec::new();
            }
            Err(err) => {
                debug!(url = %robots_url, error = %err, "robots.txt fetch failed");
                return Vec::new();
            }
        };

        let seeds = parse_robots_paths(&text)
            .iter()
            .filter_map(|path| request_for_path(target, path))
            .map(|req| req.with_source(Source::Robots))
            .collect::<Vec<_>>();
        info!(count = seeds.len(), "paths from robots.txt");
        seeds
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::model::Method;

    #[test]
    fn test_parse_robots_paths_skips_wildcards() {
        let text = "User-agent: *\nDisallow: /admin/ # private\nAllow: /public\n\
                    Disallow: /*.php$\nDisallow: /\nDISALLOW: /admin/\nSitemap: /sitemap.xml\n";
        assert_eq!(parse_robots_paths(text), vec!["/admin/", "/public"]);
    }

    #[tokio::test]
    async fn test_generate_from_served_robots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /backup/\n"),
            )
            .mount(&server)
            .await;

        let target = Request::new(Method::Get, &format!("{}/index.html", server.uri())).unwrap();
        let seeds = RobotsSeeds::new().generate(&target).await;
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].url.path(), "/backup/");
        assert_eq!(seeds[0].source, Source::Robots);
    }

    #[tokio::test]
    async fn test_missing_robots_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let target = Request::new(Method::Get, &server.uri()).unwrap();
        assert!(RobotsSeeds::new().generate(&target).await.is_empty());
    }
}
