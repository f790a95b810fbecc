use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};

use crate::config::{
    self, BEFORE_EXIT_DELAY, DEFAULT_IGNORE_KEYWORDS, DOM_CONTENT_LOADED_TIMEOUT,
    EVENT_TRIGGER_INTERVAL, EventTriggerMode, FilterMode, MAX_CRAWL_COUNT, MAX_RUN_TIME,
    MAX_TABS_COUNT, TAB_RUN_TIMEOUT, TaskConfig,
};
use crate::engine::driver::DEFAULT_WEBDRIVER_URL;
use crate::engine::{BrowserKind, DriverOptions};
use crate::error::ConfigError;

pub const DEFAULT_PUSH_POOL_MAX: usize = 10;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "reqhound",
    version,
    about = "Browser crawler that collects requests for web vulnerability scanners",
    override_usage = "reqhound [OPTIONS] <URL>... (all URLs must share one host)"
)]
pub struct Cli {
    #[arg(value_name = "URL", required = true)]
    pub urls: Vec<String>,

    #[arg(short = 'm', long, value_name = "N", default_value_t = MAX_CRAWL_COUNT)]
    pub max_crawled_count: usize,

    #[arg(short = 'f', long, value_enum, default_value_t = FilterMode::Smart)]
    pub filter_mode: FilterMode,

    #[arg(short = 'o', long, value_enum, default_value_t = OutputMode::Console)]
    pub output_mode: OutputMode,

    #[arg(long, value_name = "FILE")]
    pub output_json: Option<PathBuf>,

    #[arg(short = 't', long, value_name = "N", default_value_t = MAX_TABS_COUNT)]
    pub max_tab_count: usize,

    #[arg(long, value_name = "SECS", default_value_t = TAB_RUN_TIMEOUT.as_secs())]
    pub tab_run_timeout: u64,

    #[arg(long, value_name = "SECS", default_value_t = MAX_RUN_TIME.as_secs())]
    pub max_run_time: u64,

    #[arg(long, value_name = "SECS", default_value_t = DOM_CONTENT_LOADED_TIMEOUT.as_secs())]
    pub wait_dom_content_loaded_timeout: u64,

    #[arg(long, value_enum, default_value_t = EventTriggerMode::Async)]
    pub event_trigger_mode: EventTriggerMode,

    #[arg(long, value_name = "MS", default_value_t = EVENT_TRIGGER_INTERVAL.as_millis() as u64)]
    pub event_trigger_interval: u64,

    #[arg(long, value_name = "MS", default_value_t = BEFORE_EXIT_DELAY.as_millis() as u64)]
    pub before_exit_delay: u64,

    #[arg(
        long = "ignore-url-keywords",
        short = 'i',
        value_name = "KEYWORD",
        value_delimiter = ',',
        default_values_t = DEFAULT_IGNORE_KEYWORDS.map(String::from)
    )]
    pub ignore_url_keywords: Vec<String>,

    /// Form values by input category, e.g. `mail=admin@example.com`.
    #[arg(long = "form-values", short = 'F', value_name = "TYPE=VALUE", action = ArgAction::Append)]
    pub form_values: Vec<String>,

    /// Form values by field-name keyword, e.g. `passwd=hunter2`.
    #[arg(long = "form-keyword-values", value_name = "KEYWORD=VALUE", action = ArgAction::Append)]
    pub form_keyword_values: Vec<String>,

    /// JSON object of headers sent with every request.
    #[arg(long, value_name = "JSON")]
    pub custom_headers: Option<String>,

    /// Body for the seed requests; switches them to POST.
    #[arg(short = 'd', long, value_name = "DATA")]
    pub post_data: Option<String>,

    #[arg(long, value_name = "URL")]
    pub request_proxy: Option<String>,

    /// Replays every found request through this HTTP proxy once crawling ends.
    #[arg(long, value_name = "URL")]
    pub push_to_proxy: Option<String>,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_PUSH_POOL_MAX)]
    pub push_pool_max: usize,

    #[arg(long = "robots-path", default_value_t = false)]
    pub robots_path: bool,

    #[arg(long = "fuzz-path", default_value_t = false)]
    pub fuzz_path: bool,

    #[arg(long = "fuzz-path-dict", value_name = "FILE")]
    pub fuzz_path_dict: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, default_value_t = false)]
    pub no_headless: bool,

    #[arg(long, value_enum, default_value_t = BrowserKind::Chrome)]
    pub browser: BrowserKind,

    #[arg(long, value_name = "PATH")]
    pub browser_binary: Option<PathBuf>,

    #[arg(long, value_name = "URL", default_value = DEFAULT_WEBDRIVER_URL)]
    pub webdriver_url: String,

    #[arg(long, value_name = "PATH")]
    pub webdriver_binary: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_webdriver_autostart: bool,

    #[arg(long, value_name = "MS", default_value_t = 12000)]
    pub webdriver_start_timeout_ms: u64,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum OutputMode {
    Console,
    Json,
    None,
}

impl Cli {
    /// Maps the flags onto a [`TaskConfig`], parsing every operator-supplied value.
    pub fn task_config(&self) -> Result<TaskConfig, ConfigError> {
        let extra_headers = match &self.custom_headers {
            Some(raw) => config::parse_extra_headers(raw)?,
            None => Default::default(),
        };

        let config = TaskConfig {
            max_crawl_count: self.max_crawled_count,
            max_run_time: Duration::from_secs(self.max_run_time),
            max_tabs_count: self.max_tab_count,
            tab_run_timeout: Duration::from_secs(self.tab_run_timeout),
            dom_content_loaded_timeout: Duration::from_secs(self.wait_dom_content_loaded_timeout),
            event_trigger_mode: self.event_trigger_mode,
            event_trigger_interval: Duration::from_millis(self.event_trigger_interval),
            before_exit_delay: Duration::from_millis(self.before_exit_delay),
            filter_mode: self.filter_mode,
            ignore_keywords: self
                .ignore_url_keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            custom_form_values: config::parse_custom_form_values(&self.form_values)?,
            custom_form_keyword_values: config::parse_keyword_values(&self.form_keyword_values)?,
            extra_headers,
            path_from_robots: self.robots_path,
            path_by_fuzz: self.fuzz_path,
            fuzz_dict_path: self.fuzz_path_dict.clone(),
            proxy: self.request_proxy.clone().filter(|p| !p.trim().is_empty()),
            ..TaskConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            browser: self.browser,
            endpoint: self.webdriver_url.clone(),
            driver_binary: self.webdriver_binary.clone(),
            autostart: !self.no_webdriver_autostart,
            start_timeout: Duration::from_millis(self.webdriver_start_timeout_ms.max(1)),
            headless: !self.no_headless,
            browser_binary: self.browser_binary.clone(),
            proxy: self.request_proxy.clone().filter(|p| !p.trim().is_empty()),
            user_agent: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_task_config() {
        let cli = Cli::try_parse_from(["reqhound", "http://h/"]).unwrap();
        let config = cli.task_config().unwrap();
        let defaults = TaskConfig::default();
        assert_eq!(config.max_crawl_count, defaults.max_crawl_count);
        assert_eq!(config.max_run_time, defaults.max_run_time);
        assert_eq!(config.tab_run_timeout, defaults.tab_run_timeout);
        assert_eq!(config.event_trigger_interval, defaults.event_trigger_interval);
        assert_eq!(config.ignore_keywords, defaults.ignore_keywords);
        assert_eq!(config.filter_mode, FilterMode::Smart);
        assert_eq!(cli.output_mode, OutputMode::Console);
        assert!(cli.driver_options().headless);
    }

    #[test]
    fn test_flags_reach_task_config() {
        let cli = Cli::try_parse_from([
            "reqhound",
            "-m",
            "5",
            "-f",
            "strict",
            "--ignore-url-keywords",
            "logout,delete",
            "--form-values",
            "mail=a@b.c",
            "--form-keyword-values",
            "passwd=secret",
            "--custom-headers",
            r#"{"Cookie": "sid=1"}"#,
            "--request-proxy",
            "http://127.0.0.1:8080",
            "--fuzz-path-dict",
            "/tmp/dict.txt",
            "http://h/",
            "http://h/b",
        ])
        .unwrap();
        let config = cli.task_config().unwrap();
        assert_eq!(cli.urls.len(), 2);
        assert_eq!(config.max_crawl_count, 5);
        assert_eq!(config.filter_mode, FilterMode::Strict);
        assert_eq!(config.ignore_keywords, vec!["logout", "delete"]);
        assert_eq!(config.custom_form_values["mail"], "a@b.c");
        assert_eq!(config.custom_form_keyword_values["passwd"], "secret");
        assert_eq!(config.extra_headers["Cookie"], "sid=1");
        assert_eq!(config.proxy.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(config.fuzz_dict_path, Some(PathBuf::from("/tmp/dict.txt")));
        assert_eq!(
            cli.driver_options().proxy.as_deref(),
            Some("http://127.0.0.1:8080")
        );
    }

    #[test]
    fn test_bad_form_key_is_rejected() {
        let cli = Cli::try_parse_from(["reqhound", "--form-values", "shoe=42", "http://h/"]).unwrap();
        assert!(matches!(
            cli.task_config(),
            Err(ConfigError::NotAllowedFormKey(key)) if key == "shoe"
        ));
    }

    #[test]
    fn test_zero_tabs_is_rejected() {
        let cli = Cli::try_parse_from(["reqhound", "-t", "0", "http://h/"]).unwrap();
        assert!(cli.task_config().is_err());
    }

    #[test]
    fn test_url_is_required() {
        assert!(Cli::try_parse_from(["reqhound"]).is_err());
    }
}
