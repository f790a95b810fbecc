//! WebDriver endpoint lifecycle: locate or spawn a driver binary, wait until
//! it accepts connections, build session capabilities and stop it again.

use std::fs::{self, File};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use clap::ValueEnum;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::BrowserError;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

const DEFAULT_DRIVER_PORT: u16 = 4444;
const READY_POLL: Duration = Duration::from_millis(200);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq, Default)]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
    Edge,
}

impl BrowserKind {
    fn default_driver_binary(self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chromedriver",
            BrowserKind::Firefox => "geckodriver",
            BrowserKind::Edge => "msedgedriver",
        }
    }
}

/// How to reach (or start) the WebDriver endpoint and what every session asks for.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub browser: BrowserKind,
    pub endpoint: String,
    pub driver_binary: Option<String>,
    pub autostart: bool,
    pub start_timeout: Duration,
    pub headless: bool,
    pub browser_binary: Option<PathBuf>,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            browser: BrowserKind::default(),
            endpoint: DEFAULT_WEBDRIVER_URL.to_string(),
            driver_binary: None,
            autostart: true,
            start_timeout: Duration::from_secs(12),
            headless: true,
            browser_binary: None,
            proxy: None,
            user_agent: None,
        }
    }
}

/// Resolves a usable endpoint. With autostart on, a driver is spawned on a free
/// local port first; the configured endpoint is the fallback.
pub async fn ensure_driver(options: &DriverOptions) -> Result<(String, Option<Child>), BrowserError> {
    let requested = normalize_local_endpoint(&options.endpoint);

    if options.autostart {
        let mut endpoints = Vec::new();
        if let Ok(port) = find_free_local_port() {
            endpoints.push(format!("http://127.0.0.1:{port}"));
        }
        if !endpoints.contains(&requested) && !webdriver_reachable(&requested) {
            endpoints.push(requested.clone());
        }

        let mut last_err = None;
        for endpoint in endpoints {
            match start_driver(options, &endpoint).await {
                Ok(child) => {
                    info!(%endpoint, browser = ?options.browser, "webdriver autostarted");
                    return Ok((endpoint, Some(child)));
                }
                Err(err) => {
                    warn!(%endpoint, error = %err, "webdriver autostart failed");
                    last_err = Some(err);
                }
            }
        }
        if !webdriver_reachable(&requested) {
            return Err(last_err.unwrap_or_else(|| {
                BrowserError::Launch("no webdriver endpoint candidates".to_string())
            }));
        }
    }

    if webdriver_reachable(&requested) {
        info!(endpoint = %requested, "using running webdriver endpoint");
        return Ok((requested, None));
    }

    Err(BrowserError::Launch(format!(
        "endpoint {requested} unreachable and autostart is disabled"
    )))
}

async fn start_driver(options: &DriverOptions, endpoint: &str) -> Result<Child, BrowserError> {
    let (host, port) = endpoint_addr(endpoint)
        .ok_or_else(|| BrowserError::Launch(format!("invalid webdriver url: {endpoint}")))?;
    if !is_loopback(&host) {
        return Err(BrowserError::Launch(
            "autostart only supports localhost endpoints".to_string(),
        ));
    }

    let binary = options
        .driver_binary
        .clone()
        .unwrap_or_else(|| options.browser.default_driver_binary().to_string());
    let Some(program) = locate_binary(&binary) else {
        return Err(BrowserError::Launch(format!("{binary} not found")));
    };

    let log_path = std::env::temp_dir().join(format!("reqhound-webdriver-{port}.log"));
    let log = File::create(&log_path)
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| BrowserError::Launch(format!("driver log {}: {e}", log_path.display())))?;

    let mut child = Command::new(&program)
        .args(driver_args(&binary, port))
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.0))
        .stderr(Stdio::from(log.1))
        .spawn()
        .map_err(|e| BrowserError::Launch(format!("failed to spawn {binary}: {e}")))?;

    let deadline = tokio::time::Instant::now() + options.start_timeout;
    while tokio::time::Instant::now() < deadline {
        if webdriver_reachable(endpoint) {
            return Ok(child);
        }
        if let Ok(Some(status)) = child.try_wait() {
            return Err(BrowserError::Launch(with_log_tail(
                format!("{binary} exited with {status}"),
                &log_path,
            )));
        }
        tokio::time::sleep(READY_POLL).await;
    }

    stop_driver(Some(child));
    Err(BrowserError::Launch(with_log_tail(
        format!("{binary} not ready after {:?}", options.start_timeout),
        &log_path,
    )))
}

/// Command-line flags for the driver flavour named by `binary`.
fn driver_args(binary: &str, port: u16) -> Vec<String> {
    let flavour = binary.to_ascii_lowercase();
    if flavour.contains("geckodriver") {
        return vec!["--port".to_string(), port.to_string()];
    }
    let mut args = vec![format!("--port={port}"), "--allowed-origins=*".to_string()];
    if flavour.contains("chromedriver") {
        args.push("--log-level=SEVERE".to_string());
    }
    args
}

pub fn stop_driver(child: Option<Child>) {
    let Some(mut process) = child else {
        return;
    };
    if let Err(err) = process.kill() {
        debug!(error = %err, "webdriver kill failed");
    }
    if let Err(err) = process.wait() {
        debug!(error = %err, "webdriver wait failed");
    }
    debug!("webdriver process stopped");
}

fn endpoint_addr(endpoint: &str) -> Option<(String, u16)> {
    let url = Url::parse(endpoint).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some((host, url.port_or_known_default().unwrap_or(DEFAULT_DRIVER_PORT)))
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1"
}

/// True when something accepts TCP connections at the endpoint's address.
pub fn webdriver_reachable(endpoint: &str) -> bool {
    endpoint_addr(endpoint)
        .and_then(|(host, port)| (host.as_str(), port).to_socket_addrs().ok())
        .is_some_and(|mut addrs| {
            addrs.any(|addr| TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok())
        })
}

pub fn find_free_local_port() -> std::io::Result<u16> {
    TcpListener::bind("127.0.0.1:0")?
        .local_addr()
        .map(|addr| addr.port())
}

/// `localhost` and `127.0.0.1` collapse to one form so autostart can detect
/// that the configured endpoint is the one it just tried.
pub fn normalize_local_endpoint(endpoint: &str) -> String {
    match (Url::parse(endpoint), endpoint_addr(endpoint)) {
        (Ok(url), Some((host, port))) if is_loopback(&host) => {
            format!("{}://127.0.0.1:{port}", url.scheme())
        }
        _ => endpoint.trim_end_matches('/').to_string(),
    }
}

/// Resolves `binary` to something spawnable: explicit paths must exist, bare
/// names are looked up on `PATH`.
fn locate_binary(binary: &str) -> Option<PathBuf> {
    let path = Path::new(binary);
    if path.is_absolute() || path.components().count() > 1 {
        return path.exists().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| {
            let plain = dir.join(binary);
            let exe = dir.join(format!("{binary}.exe"));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

fn with_log_tail(message: String, path: &Path) -> String {
    let Ok(text) = fs::read_to_string(path) else {
        return message;
    };
    let lines = text.lines().collect::<Vec<_>>();
    let tail = lines[lines.len().saturating_sub(LOG_TAIL_LINES)..].join(" | ");
    if tail.is_empty() {
        message
    } else {
        format!("{message}; driver log: {tail}")
    }
}

/// `host:port` from a proxy URL, the form W3C manual proxy capabilities expect.
fn proxy_host_port(proxy: &str) -> Option<String> {
    let url = Url::parse(proxy).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}

/// New-session payload for the configured browser.
pub fn capabilities(options: &DriverOptions) -> Value {
    let mut always_match = match options.browser {
        BrowserKind::Firefox => {
            let mut args = Vec::<String>::new();
            if options.headless {
                args.push("-headless".to_string());
            }
            let mut prefs = json!({
                "browser.cache.disk.enable": false,
                "browser.cache.memory.enable": false,
                "network.http.use-cache": false
            });
            if let Some(ua) = &options.user_agent {
                prefs["general.useragent.override"] = json!(ua);
            }
            let mut firefox_options = json!({ "args": args, "prefs": prefs });
            if let Some(binary) = &options.browser_binary {
                firefox_options["binary"] = json!(binary.to_string_lossy());
            }
            json!({
                "browserName": "firefox",
                "acceptInsecureCerts": true,
                "moz:firefoxOptions": firefox_options
            })
        }
        BrowserKind::Chrome | BrowserKind::Edge => {
            let mut args = Vec::<String>::new();
            if options.headless {
                args.push("--headless=new".to_string());
            }
            args.extend(
                [
                    "--window-size=1400,1200",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    "--no-first-run",
                    "--no-default-browser-check",
                    "--disable-crash-reporter",
                    "--disable-popup-blocking",
                    "--ignore-certificate-errors",
                    "--disk-cache-size=0",
                ]
                .map(String::from),
            );
            if !cfg!(target_os = "macos") {
                args.push("--no-sandbox".to_string());
            }
            if let Some(ua) = &options.user_agent {
                args.push(format!("--user-agent={ua}"));
            }
            let mut browser_options = json!({ "args": args });
            if let Some(binary) = &options.browser_binary {
                browser_options["binary"] = json!(binary.to_string_lossy());
            }
            if options.browser == BrowserKind::Edge {
                json!({
                    "browserName": "MicrosoftEdge",
                    "acceptInsecureCerts": true,
                    "ms:edgeOptions": browser_options
                })
            } else {
                json!({
                    "browserName": "chrome",
                    "acceptInsecureCerts": true,
                    "goog:chromeOptions": browser_options
                })
            }
        }
    };

    if let Some(proxy) = options.proxy.as_deref().and_then(proxy_host_port) {
        always_match["proxy"] = json!({
            "proxyType": "manual",
            "httpProxy": proxy,
            "sslProxy": proxy
        });
    }

    json!({ "capabilities": { "alwaysMatch": always_match } })
}
