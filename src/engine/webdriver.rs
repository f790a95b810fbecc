//! [`Browser`] backed by a W3C WebDriver endpoint.
//!
//! Every tab gets its own session against one shared driver, so concurrent
//! tabs never fight over window handles. Requests are gathered three ways:
//! in-page hooks on XHR/fetch/WebSocket/history, resource timing entries, and
//! a parse of the rendered DOM.

use std::collections::{BTreeMap, HashSet};
use std::process::Child;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method as HttpMethod;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::collect::{Collector, PageSnapshot};
use super::driver::{self, DriverOptions};
use super::form::FormFiller;
use super::{Browser, TabOptions};
use crate::config::EventTriggerMode;
use crate::error::BrowserError;
use crate::model::{Method, Request, RequestUrl, Source};

const HOOK_SCRIPT: &str = r#"
if (window.__reqhound) { return true; }
const seen = [];
window.__reqhound = seen;
const record = (url, method, data, source) => {
  try {
    seen.push({
      url: String(url),
      method: String(method || 'GET').toUpperCase(),
      data: typeof data === 'string' ? data : '',
      source: source
    });
  } catch (e) {}
};
const origOpen = XMLHttpRequest.prototype.open;
const origSend = XMLHttpRequest.prototype.send;
XMLHttpRequest.prototype.open = function (method, url) {
  this.__reqhound = { method: method, url: url };
  return origOpen.apply(this, arguments);
};
XMLHttpRequest.prototype.send = function (body) {
  if (this.__reqhound) { record(this.__reqhound.url, this.__reqhound.method, body, 'xhr'); }
  return origSend.apply(this, arguments);
};
if (window.fetch) {
  const origFetch = window.fetch;
  window.fetch = function (input, init) {
    const url = typeof input === 'string' ? input : (input && input.url) || '';
    const method = (init && init.method) || (input && input.method) || 'GET';
    record(url, method, init && init.body, 'fetch');
    return origFetch.apply(this, arguments);
  };
}
if (window.WebSocket) {
  const OrigWebSocket = window.WebSocket;
  window.WebSocket = function (url, protocols) {
    record(url, 'GET', '', 'websocket');
    return new OrigWebSocket(url, protocols);
  };
  window.WebSocket.prototype = OrigWebSocket.prototype;
}
if (window.EventSource) {
  const OrigEventSource = window.EventSource;
  window.EventSource = function (url, config) {
    record(url, 'GET', '', 'eventsource');
    return new OrigEventSource(url, config);
  };
  window.EventSource.prototype = OrigEventSource.prototype;
}
for (const name of ['pushState', 'replaceState']) {
  const orig = history[name];
  history[name] = function (state, title, url) {
    if (url) { record(new URL(url, location.href).href, 'GET', '', 'history'); }
    return orig.apply(this, arguments);
  };
}
window.open = function (url) { if (url) { record(url, 'GET', '', 'open'); } return null; };
window.close = function () {};
window.addEventListener('hashchange', () => record(location.href, 'GET', '', 'hashchange'));
return true;
"#;

const TRIGGER_PRELUDE: &str = r#"
const keywords = (arguments[0] || []).map(k => String(k).toLowerCase());
const skip = el => {
  const html = (el.outerHTML || '').toLowerCase();
  return keywords.some(k => k && html.includes(k));
};
const nodes = Array.from(document.querySelectorAll('*')).filter(el =>
  Array.from(el.attributes).some(a => a.name.startsWith('on')) && !skip(el));
const fire = el => {
  for (const attr of Array.from(el.attributes)) {
    if (!attr.name.startsWith('on')) { continue; }
    try { el.dispatchEvent(new Event(attr.name.slice(2), { bubbles: true })); } catch (e) {}
  }
};
"#;

const TRIGGER_SYNC_BODY: &str = r#"
nodes.forEach(fire);
return nodes.length;
"#;

const TRIGGER_ASYNC_BODY: &str = r#"
const done = arguments[arguments.length - 1];
const interval = Number(arguments[1]) || 0;
let i = 0;
const step = () => {
  if (i >= nodes.length) { done(i); return; }
  fire(nodes[i++]);
  setTimeout(step, interval);
};
step();
"#;

const SNAPSHOT_SCRIPT: &str = r#"
const entries = performance.getEntriesByType ? performance.getEntriesByType('resource') : [];
return {
  url: window.location.href || '',
  html: document.documentElement ? document.documentElement.outerHTML : '',
  hooked: window.__reqhound || [],
  resources: entries.map(e => ({ name: e.name, initiatorType: e.initiatorType }))
};
"#;

const FORM_SUBMIT_SCRIPT: &str = r#"
const [action, method, pairs] = arguments;
const form = document.createElement('form');
form.action = action;
form.method = method;
for (const [name, value] of pairs) {
  const input = document.createElement('input');
  input.type = 'hidden';
  input.name = name;
  input.value = value;
  form.appendChild(input);
}
(document.body || document.documentElement).appendChild(form);
HTMLFormElement.prototype.submit.call(form);
return true;
"#;

const READY_STATE_SCRIPT: &str = "return document.readyState;";

const SNAPSHOT_GRACE: Duration = Duration::from_secs(2);

pub struct WebDriverBrowser {
    client: reqwest::Client,
    endpoint: String,
    options: DriverOptions,
    extra_headers: BTreeMap<String, String>,
    driver: Mutex<Option<Child>>,
    sessions: Mutex<HashSet<String>>,
    closed: AtomicBool,
}

impl WebDriverBrowser {
    /// Resolves the driver endpoint (spawning a driver when allowed) and
    /// returns a browser ready to open tabs.
    pub async fn launch(
        mut options: DriverOptions,
        extra_headers: BTreeMap<String, String>,
    ) -> Result<Self, BrowserError> {
        if options.user_agent.is_none() {
            options.user_agent = header_value(&extra_headers, "User-Agent").map(str::to_string);
        }
        let (endpoint, child) = driver::ensure_driver(&options).await?;
        let browser = Self::connect(&endpoint, options, extra_headers)?;
        if let Ok(mut slot) = browser.driver.lock() {
            *slot = child;
        }
        info!(%endpoint, "browser ready");
        Ok(browser)
    }

    /// Uses an already running endpoint without managing any driver process.
    pub fn connect(
        endpoint: &str,
        options: DriverOptions,
        extra_headers: BTreeMap<String, String>,
    ) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            options,
            extra_headers,
            driver: Mutex::new(None),
            sessions: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn webdriver_call(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let url = format!("{}{path}", self.endpoint);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let res = request.send().await?;
        let status = res.status();
        let text = res.text().await?;
        let value: Value = serde_json::from_str(&text).unwrap_or_default();

        if let Some(name) = value.pointer("/value/error").and_then(|v| v.as_str()) {
            let message = value
                .pointer("/value/message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown webdriver error");
            return Err(BrowserError::WebDriver {
                name: name.to_string(),
                message: truncate_for_log(message, 260),
            });
        }
        if !status.is_success() {
            return Err(BrowserError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text, 260),
            });
        }
        Ok(value.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn create_session(&self) -> Result<String, BrowserError> {
        let caps = driver::capabilities(&self.options);
        let value = self
            .webdriver_call(HttpMethod::POST, "/session", Some(caps))
            .await?;
        let session_id = value
            .get("sessionId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                BrowserError::Protocol(format!(
                    "session id missing in response: {}",
                    truncate_for_log(&value.to_string(), 220)
                ))
            })?;
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session_id.clone());
        }
        Ok(session_id)
    }

    async fn delete_session(&self, session_id: &str) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(session_id);
        }
        let path = format!("/session/{session_id}");
        if let Err(err) = self.webdriver_call(HttpMethod::DELETE, &path, None).await {
            debug!(session = session_id, error = %err, "delete session failed");
        }
    }

    async fn navigate(&self, session_id: &str, url: &str) -> Result<(), BrowserError> {
        let path = format!("/session/{session_id}/url");
        self.webdriver_call(HttpMethod::POST, &path, Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn execute_sync(
        &self,
        session_id: &str,
        script: &str,
        args: Value,
    ) -> Result<Value, BrowserError> {
        let path = format!("/session/{session_id}/execute/sync");
        self.webdriver_call(
            HttpMethod::POST,
            &path,
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn execute_async(
        &self,
        session_id: &str,
        script: &str,
        args: Value,
    ) -> Result<Value, BrowserError> {
        let path = format!("/session/{session_id}/execute/async");
        self.webdriver_call(
            HttpMethod::POST,
            &path,
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn set_timeouts(&self, session_id: &str, budget: Duration) -> Result<(), BrowserError> {
        let ms = budget.as_millis().max(1) as u64;
        let path = format!("/session/{session_id}/timeouts");
        self.webdriver_call(
            HttpMethod::POST,
            &path,
            Some(json!({ "script": ms, "pageLoad": ms })),
        )
        .await
        .map(|_| ())
    }

    /// Seeds `Cookie` header values into the session. WebDriver only accepts
    /// cookies for the current document, so the origin is loaded first.
    async fn install_cookies(&self, session_id: &str, target: &RequestUrl) -> Result<(), BrowserError> {
        let Some(raw) = header_value(&self.extra_headers, "Cookie") else {
            return Ok(());
        };
        let cookies = parse_cookie_header(raw);
        if cookies.is_empty() {
            return Ok(());
        }
        self.navigate(session_id, &origin_of(target)).await?;
        let path = format!("/session/{session_id}/cookie");
        for (name, value) in cookies {
            let body = json!({ "cookie": { "name": name, "value": value } });
            if let Err(err) = self.webdriver_call(HttpMethod::POST, &path, Some(body)).await {
                debug!(cookie = %name, error = %err, "add cookie failed");
            }
        }
        Ok(())
    }

    /// Loads the request. Form-encoded POSTs are replayed through a generated
    /// form on the origin page; everything else is a plain navigation.
    async fn open(&self, session_id: &str, req: &Request) -> Result<(), BrowserError> {
        let form_post = req.method == Method::Post
            && !req.post_data.trim_start().starts_with('{')
            && !req.post_data.is_empty();
        if !form_post {
            if req.method != Method::Get {
                debug!(method = %req.method, url = %req.url, "loading non-GET request as navigation");
            }
            return self.navigate(session_id, req.url.as_str()).await;
        }

        self.navigate(session_id, &origin_of(&req.url)).await?;
        let pairs = url::form_urlencoded::parse(req.post_data.as_bytes())
            .map(|(k, v)| json!([k, v]))
            .collect::<Vec<_>>();
        self.execute_sync(
            session_id,
            FORM_SUBMIT_SCRIPT,
            json!([req.url.as_str(), "post", pairs]),
        )
        .await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    async fn wait_dom_ready(&self, session_id: &str, limit: Duration) {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            match self
                .execute_sync(session_id, READY_STATE_SCRIPT, json!([]))
                .await
            {
                Ok(Value::String(state)) if state != "loading" => return,
                Ok(_) => {}
                Err(err) => {
                    debug!(error = %err, "readyState check failed");
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        debug!(session = session_id, "DOMContentLoaded wait timed out");
    }

    async fn trigger_events(&self, session_id: &str, opts: &TabOptions) {
        let outcome = match opts.event_trigger_mode {
            EventTriggerMode::Sync => {
                let script = format!("{TRIGGER_PRELUDE}{TRIGGER_SYNC_BODY}");
                self.execute_sync(session_id, &script, json!([opts.ignore_keywords]))
                    .await
            }
            EventTriggerMode::Async => {
                let script = format!("{TRIGGER_PRELUDE}{TRIGGER_ASYNC_BODY}");
                let interval = opts.event_trigger_interval.as_millis() as u64;
                self.execute_async(session_id, &script, json!([opts.ignore_keywords, interval]))
                    .await
            }
        };
        match outcome {
            Ok(fired) => debug!(session = session_id, fired = %fired, "inline events triggered"),
            Err(err) => debug!(session = session_id, error = %err, "event trigger failed"),
        }
    }

    async fn snapshot_into(
        &self,
        session_id: &str,
        collector: &mut Collector<'_>,
    ) -> Result<(), BrowserError> {
        let value = self
            .execute_sync(session_id, SNAPSHOT_SCRIPT, json!([]))
            .await?;
        let snapshot: PageSnapshot = serde_json::from_value(value)
            .map_err(|e| BrowserError::Protocol(format!("snapshot parse failed: {e}")))?;

        if let Ok(landed) = RequestUrl::parse(&snapshot.url) {
            if landed.normalized() != collector.base().normalized() {
                collector.push(Method::Get, landed.as_str(), String::new(), Source::Navigation);
                collector.set_base(landed);
            }
        }
        collector.add_hooked(&snapshot.hooked);
        collector.add_resources(&snapshot.resources);
        collector.add_dom(&snapshot.html);
        Ok(())
    }

    async fn drive_tab(
        &self,
        session_id: &str,
        req: &Request,
        opts: &TabOptions,
        collector: &mut Collector<'_>,
    ) -> Result<(), BrowserError> {
        self.set_timeouts(session_id, opts.timeout).await?;
        self.install_cookies(session_id, &req.url).await?;
        self.open(session_id, req).await?;
        self.wait_dom_ready(session_id, opts.dom_content_loaded_timeout)
            .await;
        self.execute_sync(session_id, HOOK_SCRIPT, json!([])).await?;
        self.trigger_events(session_id, opts).await;
        tokio::time::sleep(opts.before_exit_delay).await;
        self.snapshot_into(session_id, collector).await
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn run_tab(&self, req: &Request, opts: &TabOptions) -> Result<Vec<Request>, BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        let session_id = self.create_session().await?;
        let filler = FormFiller::new(&opts.custom_form_values, &opts.custom_form_keyword_values);
        let mut collector = Collector::new(req.url.clone(), &self.extra_headers, filler);

        let outcome = tokio::time::timeout(
            opts.timeout,
            self.drive_tab(&session_id, req, opts, &mut collector),
        )
        .await;

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if collector.is_empty() => Err(err),
            Ok(Err(err)) => {
                warn!(url = %req.url, error = %err, "tab ended early, keeping partial results");
                Ok(())
            }
            Err(_) => {
                debug!(url = %req.url, timeout = ?opts.timeout, "tab timed out");
                let grace =
                    tokio::time::timeout(SNAPSHOT_GRACE, self.snapshot_into(&session_id, &mut collector))
                        .await;
                if let Ok(Err(err)) = grace {
                    debug!(url = %req.url, error = %err, "late snapshot failed");
                }
                Ok(())
            }
        };

        self.delete_session(&session_id).await;
        result.map(|()| collector.into_requests())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let sessions = match self.sessions.lock() {
            Ok(mut guard) => guard.drain().collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for session_id in sessions {
            self.delete_session(&session_id).await;
        }
        let child = self.driver.lock().ok().and_then(|mut slot| slot.take());
        driver::stop_driver(child);
        info!("browser closed");
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.driver.lock() {
            driver::stop_driver(slot.take());
        }
    }
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn origin_of(url: &RequestUrl) -> String {
    format!("{}://{}/", url.scheme(), url.host())
}

fn parse_cookie_header(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "..."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_header() {
        assert_eq!(
            parse_cookie_header("sid=abc; theme=dark;  =x; flag"),
            vec![
                ("sid".to_string(), "abc".to_string()),
                ("theme".to_string(), "dark".to_string())
            ]
        );
    }

    #[test]
    fn test_header_value_is_case_insensitive() {
        let headers = BTreeMap::from([("user-agent".to_string(), "reqhound".to_string())]);
        assert_eq!(header_value(&headers, "User-Agent"), Some("reqhound"));
        assert_eq!(header_value(&headers, "Cookie"), None);
    }

    #[test]
    fn test_origin_of_keeps_explicit_port() {
        let url = RequestUrl::parse("http://h:8080/a/b?x=1").unwrap();
        assert_eq!(origin_of(&url), "http://h:8080/");
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("abcdef", 3), "abc...");
        assert_eq!(truncate_for_log("abc", 3), "abc");
    }
}
