//! Turns what a tab observed (rendered DOM, hooked network calls, resource
//! timing entries) into [`Request`] records.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;

use super::form::FormFiller;
use crate::model::{Method, Request, RequestOptions, RequestUrl, Source};

static COMMENT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(?:https?:)?//[-A-Za-z0-9+&@#/%?=~_|!:,.;]+[-A-Za-z0-9+&@#/%=~_|])|(?:(?:href|src|action)\s*=\s*[\x22']([^\x22']+)[\x22'])")
        .expect("valid regex")
});
static SCRIPT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']((?:/|\./|\.\./)[A-Za-z0-9_\-./]{2,}(?:\?[^"'\s<>]*)?)["']"#)
        .expect("valid regex")
});

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Network call recorded by the in-page hooks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookedRequest {
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub source: String,
}

/// One `performance.getEntriesByType("resource")` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(rename = "initiatorType", default)]
    pub initiator_type: String,
}

/// Everything read back from the tab at the end of its run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub hooked: Vec<HookedRequest>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

/// Accumulates discovered requests for one tab, resolving relative URLs
/// against the page and dropping exact repeats.
pub struct Collector<'a> {
    base: RequestUrl,
    extra_headers: &'a BTreeMap<String, String>,
    filler: FormFiller<'a>,
    seen: HashSet<String>,
    found: Vec<Request>,
}

impl<'a> Collector<'a> {
    pub fn new(
        base: RequestUrl,
        extra_headers: &'a BTreeMap<String, String>,
        filler: FormFiller<'a>,
    ) -> Self {
        Self {
            base,
            extra_headers,
            filler,
            seen: HashSet::new(),
            found: Vec::new(),
        }
    }

    pub fn base(&self) -> &RequestUrl {
        &self.base
    }

    /// Rebases relative resolution onto the URL the tab actually ended up on.
    pub fn set_base(&mut self, base: RequestUrl) {
        self.base = base;
    }

    pub fn len(&self) -> usize {
        self.found.len()
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    pub fn into_requests(self) -> Vec<Request> {
        self.found
    }

    pub fn push(&mut self, method: Method, raw: &str, post_data: String, source: Source) {
        self.push_with(method, raw, post_data, source, None);
    }

    fn push_with(
        &mut self,
        method: Method,
        raw: &str,
        post_data: String,
        source: Source,
        content_type: Option<&str>,
    ) {
        let Some(href) = usable_href(raw) else {
            return;
        };
        let href = websocket_as_http(href);
        let Ok(url) = RequestUrl::join(&self.base, &href) else {
            return;
        };

        let mut headers = self.extra_headers.clone();
        headers.insert("Referer".to_string(), self.base.to_string());
        if let Some(content_type) = content_type {
            headers.insert("Content-Type".to_string(), content_type.to_string());
        }

        let req = Request::from_url(method, url, RequestOptions { headers, post_data })
            .with_source(source);
        if self.seen.insert(req.unique_id()) {
            self.found.push(req);
        }
    }

    pub fn add_hooked(&mut self, hooked: &[HookedRequest]) {
        for entry in hooked {
            let method = entry.method.parse::<Method>().unwrap_or(Method::Get);
            let source = match entry.source.to_ascii_lowercase().as_str() {
                "fetch" => Source::Fetch,
                "websocket" => Source::WebSocket,
                "eventsource" => Source::EventSource,
                "history" => Source::HistoryApi,
                "open" => Source::OpenWindow,
                "hashchange" => Source::HashChange,
                "navigation" => Source::Navigation,
                _ => Source::Xhr,
            };
            let content_type = body_content_type(&entry.data);
            self.push_with(method, &entry.url, entry.data.clone(), source, content_type);
        }
    }

    /// Only script-initiated entries: static assets are left to the DOM pass.
    pub fn add_resources(&mut self, resources: &[ResourceEntry]) {
        for entry in resources {
            let source = match entry.initiator_type.as_str() {
                "xmlhttprequest" => Source::Xhr,
                "fetch" | "beacon" => Source::Fetch,
                _ => continue,
            };
            self.push(Method::Get, &entry.name, String::new(), source);
        }
    }

    pub fn add_dom(&mut self, html: &str) {
        let doc = Html::parse_document(html);

        for (selector, attr, source) in [
            ("a[href], area[href]", "href", Source::Dom),
            ("iframe[src], frame[src]", "src", Source::Dom),
            ("script[src]", "src", Source::StaticResource),
            ("meta[http-equiv][content]", "content", Source::Navigation),
        ] {
            let selector = match Selector::parse(selector) {
                Ok(s) => s,
                Err(_) => continue,
            };
            for el in doc.select(&selector) {
                let Some(value) = el.value().attr(attr) else {
                    continue;
                };
                if attr == "content" {
                    if let Some(target) = meta_refresh_target(&el, value) {
                        self.push(Method::Get, &target, String::new(), source);
                    }
                    continue;
                }
                self.push(Method::Get, value, String::new(), source);
            }
        }

        self.add_forms(&doc);
        self.add_comments(&doc);
        self.add_inline_scripts(&doc);
    }

    fn add_forms(&mut self, doc: &Html) {
        let form_selector = match Selector::parse("form") {
            Ok(s) => s,
            Err(_) => return,
        };
        let field_selector = match Selector::parse("input[name], select[name], textarea[name]") {
            Ok(s) => s,
            Err(_) => return,
        };
        let option_selector = match Selector::parse("option") {
            Ok(s) => s,
            Err(_) => return,
        };

        for form in doc.select(&form_selector) {
            let action = form
                .value()
                .attr("action")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .unwrap_or(self.base.as_str())
                .to_string();
            let method = form
                .value()
                .attr("method")
                .and_then(|m| m.parse::<Method>().ok())
                .unwrap_or(Method::Get);

            let mut pairs = Vec::new();
            for field in form.select(&field_selector) {
                let Some(name) = field.value().attr("name").filter(|n| !n.is_empty()) else {
                    continue;
                };
                if let Some(value) = self.field_value(&field, name, &option_selector) {
                    pairs.push((name.to_string(), value));
                }
            }
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter())
                .finish();

            if method == Method::Get {
                let Some(action) = usable_href(&action) else {
                    continue;
                };
                let Ok(mut url) = RequestUrl::join(&self.base, &action) else {
                    continue;
                };
                if !encoded.is_empty() {
                    let mut raw = url.as_url().clone();
                    raw.set_query(Some(&encoded));
                    let Ok(with_query) = RequestUrl::from_url(raw) else {
                        continue;
                    };
                    url = with_query;
                }
                self.push(Method::Get, url.as_str(), String::new(), Source::Dom);
            } else {
                self.push_with(method, &action, encoded, Source::Dom, Some(FORM_URLENCODED));
            }
        }
    }

    fn field_value(&self, field: &ElementRef<'_>, name: &str, options: &Selector) -> Option<String> {
        let element = field.value();
        match element.name() {
            "select" => {
                let first = field
                    .select(options)
                    .find_map(|o| o.value().attr("value").map(str::to_string))
                    .unwrap_or_default();
                Some(first)
            }
            "textarea" => {
                let text = field.text().collect::<String>();
                if text.trim().is_empty() {
                    Some(self.filler.value_for(name, "textarea"))
                } else {
                    Some(text)
                }
            }
            _ => {
                let input_type = element
                    .attr("type")
                    .unwrap_or("text")
                    .to_ascii_lowercase();
                let current = element.attr("value").unwrap_or_default();
                match input_type.as_str() {
                    "submit" | "button" | "reset" | "image" => {
                        (!current.is_empty()).then(|| current.to_string())
                    }
                    "file" => None,
                    "hidden" => Some(current.to_string()),
                    "checkbox" | "radio" => Some(if current.is_empty() {
                        "on".to_string()
                    } else {
                        current.to_string()
                    }),
                    _ if !current.is_empty() => Some(current.to_string()),
                    other => Some(self.filler.value_for(name, other)),
                }
            }
        }
    }

    fn add_comments(&mut self, doc: &Html) {
        let comments = doc
            .tree
            .values()
            .filter_map(|node| match node {
                Node::Comment(comment) => Some(comment.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>();
        for comment in comments {
            let found = COMMENT_URL_RE
                .captures_iter(&comment)
                .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| m.as_str().to_string())
                .collect::<Vec<_>>();
            for raw in found {
                self.push(Method::Get, &raw, String::new(), Source::Comment);
            }
        }
    }

    fn add_inline_scripts(&mut self, doc: &Html) {
        let selector = match Selector::parse("script:not([src])") {
            Ok(s) => s,
            Err(_) => return,
        };
        let scripts = doc
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .collect::<Vec<_>>();
        for script in scripts {
            let found = SCRIPT_PATH_RE
                .captures_iter(&script)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .collect::<Vec<_>>();
            for raw in found {
                self.push(Method::Get, &raw, String::new(), Source::StaticRegex);
            }
        }
    }
}

/// Drops links that never lead to an HTTP request. Plain in-page anchors go,
/// client-side routes (`#/...`, `#!/...`) stay.
fn usable_href(raw: &str) -> Option<&str> {
    let href = raw.trim();
    if href.is_empty() {
        return None;
    }
    if let Some(fragment) = href.strip_prefix('#') {
        if !(fragment.starts_with('/') || fragment.starts_with("!/")) {
            return None;
        }
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:", "blob:", "about:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }
    Some(href)
}

fn websocket_as_http(href: &str) -> String {
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("wss://") {
        format!("https://{}", &href[6..])
    } else if lower.starts_with("ws://") {
        format!("http://{}", &href[5..])
    } else {
        href.to_string()
    }
}

fn body_content_type(data: &str) -> Option<&'static str> {
    let trimmed = data.trim_start();
    if trimmed.is_empty() {
        None
    } else if trimmed.starts_with('{') || trimmed.starts_with('[') {
        Some("application/json")
    } else {
        Some(FORM_URLENCODED)
    }
}

fn meta_refresh_target(el: &ElementRef<'_>, content: &str) -> Option<String> {
    let equiv = el.value().attr("http-equiv")?;
    if !equiv.eq_ignore_ascii_case("refresh") {
        return None;
    }
    let (_, rest) = content.split_once(';')?;
    let rest = rest.trim();
    let target = rest
        .strip_prefix("url=")
        .or_else(|| rest.strip_prefix("URL="))
        .unwrap_or(rest)
        .trim_matches(|c| c == '\'' || c == '"');
    (!target.is_empty()).then(|| target.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn collect(html: &str) -> Vec<Request> {
        let headers = BTreeMap::from([("Cookie".to_string(), "sid=1".to_string())]);
        let empty = HashMap::new();
        let mut collector = Collector::new(
            RequestUrl::parse("http://h/dir/page.php").unwrap(),
            &headers,
            FormFiller::new(&empty, &empty),
        );
        collector.add_dom(html);
        collector.into_requests()
    }

    #[test]
    fn test_anchors_resolve_and_skip_pseudo_links() {
        let found = collect(
            r##"<a href="/a?id=1">a</a><a href="b.php">b</a><a href="#top">t</a>
                <a href="javascript:void(0)">j</a><a href="#/route">r</a>"##,
        );
        let urls = found.iter().map(|r| r.url.as_str()).collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec!["http://h/a?id=1", "http://h/dir/b.php", "http://h/dir/page.php#/route"]
        );
        assert!(found.iter().all(|r| r.source == Source::Dom));
        assert_eq!(found[0].headers["Referer"], "http://h/dir/page.php");
        assert_eq!(found[0].headers["Cookie"], "sid=1");
    }

    #[test]
    fn test_post_form_is_serialized_with_filled_values() {
        let found = collect(
            r#"<form action="/login" method="post">
                 <input name="email" type="email">
                 <input name="token" type="hidden" value="abc">
                 <input type="submit" name="go">
                 <select name="lang"><option value="en">en</option></select>
               </form>"#,
        );
        assert_eq!(found.len(), 1);
        let form = &found[0];
        assert_eq!(form.method, Method::Post);
        assert_eq!(form.url.as_str(), "http://h/login");
        assert_eq!(
            form.post_data,
            "email=reqhound%40example.com&token=abc&lang=en"
        );
        assert_eq!(form.headers["Content-Type"], FORM_URLENCODED);
    }

    #[test]
    fn test_get_form_uses_query() {
        let found = collect(r#"<form action="/search"><input name="q"></form>"#);
        assert_eq!(found[0].method, Method::Get);
        assert_eq!(found[0].url.as_str(), "http://h/search?q=reqhound");
    }

    #[test]
    fn test_comments_and_inline_scripts() {
        let found = collect(
            r#"<!-- old admin: <a href="/admin/old.php">x</a> see http://h/backup -->
               <script>var api = "/api/v1/users?page=2";</script>"#,
        );
        let by_source = |source| {
            found
                .iter()
                .filter(|r| r.source == source)
                .map(|r| r.url.as_str().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            by_source(Source::Comment),
            vec!["http://h/admin/old.php", "http://h/backup"]
        );
        assert_eq!(by_source(Source::StaticRegex), vec!["http://h/api/v1/users?page=2"]);
    }

    #[test]
    fn test_hooked_requests_map_sources() {
        let headers = BTreeMap::new();
        let empty = HashMap::new();
        let mut collector = Collector::new(
            RequestUrl::parse("https://h/").unwrap(),
            &headers,
            FormFiller::new(&empty, &empty),
        );
        collector.add_hooked(&[
            HookedRequest {
                url: "/api/save".into(),
                method: "post".into(),
                data: r#"{"a":1}"#.into(),
                source: "xhr".into(),
            },
            HookedRequest {
                url: "wss://h/socket".into(),
                source: "websocket".into(),
                ..Default::default()
            },
        ]);
        collector.add_resources(&[
            ResourceEntry {
                name: "https://h/api/list".into(),
                initiator_type: "fetch".into(),
            },
            ResourceEntry {
                name: "https://h/logo.png".into(),
                initiator_type: "img".into(),
            },
        ]);
        let found = collector.into_requests();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].method, Method::Post);
        assert_eq!(found[0].headers["Content-Type"], "application/json");
        assert_eq!(found[1].source, Source::WebSocket);
        assert_eq!(found[1].url.as_str(), "https://h/socket");
        assert_eq!(found[2].source, Source::Fetch);
    }
}
