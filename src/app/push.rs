use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::model::Request;

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Replays `req_list` through the passive proxy at `proxy`, at most
/// `pool_max` requests in flight. Returns how many the proxy answered.
pub async fn push_to_proxy(req_list: &[Request], proxy: &str, pool_max: usize) -> usize {
    let client = match build_client(proxy) {
        Ok(client) => client,
        Err(err) => {
            warn!(%proxy, error = %err, "push proxy unusable");
            return 0;
        }
    };
    info!(%proxy, pool_max, count = req_list.len(), "pushing results to proxy");

    let pool_max = pool_max.max(1);
    let mut pending = req_list.iter().rev().cloned().collect::<Vec<_>>();
    let mut set = JoinSet::new();
    let mut answered = 0usize;

    loop {
        while set.len() < pool_max {
            let Some(req) = pending.pop() else {
                break;
            };
            let client = client.clone();
            set.spawn(async move { replay(&client, &req).await });
        }

        if set.is_empty() {
            break;
        }

        if let Some(joined) = set.join_next().await {
            match joined {
                Ok(true) => answered += 1,
                Ok(false) => {}
                Err(err) => warn!(error = %err, "push task failed"),
            }
        }
    }

    info!(answered, "push finished");
    answered
}

fn build_client(proxy: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::all(proxy)?)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(PUSH_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()
}

async fn replay(client: &reqwest::Client, req: &Request) -> bool {
    let method = match reqwest::Method::from_bytes(req.method.as_str().as_bytes()) {
        Ok(method) => method,
        Err(_) => return false,
    };
    let mut builder = client.request(method, req.url.as_str());
    for (name, value) in &req.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if !req.post_data.is_empty() {
        builder = builder.body(req.post_data.clone());
    }
    match builder.send().await {
        Ok(_) => true,
        Err(err) => {
            debug!(url = %req.url, error = %err, "push failed");
            false
        }
    }
}
