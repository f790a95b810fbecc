use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{DEFAULT_INPUT_TEXT, TaskConfig};
use crate::engine::{Browser, WebDriverBrowser};
use crate::error::ConfigError;
use crate::model::{Method, Request, RequestOptions};
use crate::seeds;
use crate::task::CrawlerTask;

use super::data_io::emit_result;
use super::push::push_to_proxy;
use super::types::Cli;

/// Seed requests from the positional URLs. Unparseable URLs are skipped.
pub fn build_targets(cli: &Cli, config: &TaskConfig) -> Vec<Request> {
    let post_data = cli.post_data.clone().unwrap_or_default();
    let method = if post_data.is_empty() {
        Method::Get
    } else {
        Method::Post
    };

    cli.urls
        .iter()
        .filter_map(|raw| {
            let options = RequestOptions {
                headers: config.extra_headers.clone(),
                post_data: post_data.clone(),
            };
            match Request::with_options(method, raw, options) {
                Ok(mut req) => {
                    req.proxy = config.proxy.clone();
                    Some(req)
                }
                Err(err) => {
                    warn!(url = %raw, error = %err, "parse url failed");
                    None
                }
            }
        })
        .collect()
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping crawl");
            cancel.cancel();
        }
    });
}

pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    crate::logging::init(&cli.log_level);

    let config = cli.task_config().context("invalid options")?;
    let targets = build_targets(&cli, &config);
    if targets.is_empty() {
        return Err(ConfigError::NoValidTargets.into());
    }
    if let Some(proxy) = &config.proxy {
        info!(%proxy, "request with proxy");
    }
    if !config.custom_form_values.is_empty() {
        info!(values = ?config.custom_form_values, "custom form values");
    }
    if !config.custom_form_keyword_values.is_empty() {
        info!(values = ?config.custom_form_keyword_values, "custom form keyword values");
    }
    if !config.custom_form_values.contains_key("default") {
        info!(text = DEFAULT_INPUT_TEXT, "default form input text when nothing matches");
    }

    // An interrupt during launch lets the crawl start cancelled and finish
    // straight away with the driver shut down.
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let browser: Arc<dyn Browser> = Arc::new(
        WebDriverBrowser::launch(cli.driver_options(), config.extra_headers.clone())
            .await
            .context("browser launch failed")?,
    );

    let generators = seeds::from_config(&config);
    let task = match CrawlerTask::new(targets, config, browser.clone(), cancel) {
        Ok(task) => task.with_seed_generators(generators),
        Err(err) => {
            browser.close().await;
            return Err(err).context("create crawler task failed");
        }
    };

    info!("start crawling");
    let result = task.run().await;

    if let Some(proxy) = cli.push_to_proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        push_to_proxy(&result.req_list, proxy, cli.push_pool_max).await;
    }

    emit_result(&result, cli.output_mode, cli.output_json.as_deref())
        .context("writing results failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_build_targets_skips_bad_urls() {
        let cli = Cli::try_parse_from([
            "reqhound",
            "--custom-headers",
            r#"{"Cookie":"sid=1"}"#,
            "--request-proxy",
            "http://127.0.0.1:8080",
            "http://h/a",
            "ftp://h/b",
            "not a url",
        ])
        .unwrap();
        let config = cli.task_config().unwrap();
        let targets = build_targets(&cli, &config);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].method, Method::Get);
        assert_eq!(targets[0].headers["Cookie"], "sid=1");
        assert_eq!(targets[0].proxy.as_deref(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn test_post_data_makes_post_targets() {
        let cli = Cli::try_parse_from(["reqhound", "-d", "a=1", "http://h/form"]).unwrap();
        let config = cli.task_config().unwrap();
        let targets = build_targets(&cli, &config);
        assert_eq!(targets[0].method, Method::Post);
        assert_eq!(targets[0].post_data, "a=1");
    }
}
