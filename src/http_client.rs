use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// Outcome of one provider request that reached the server.
#[derive(Debug, Clone)]
pub enum Fetched {
    Json(Value),
    /// The provider refused service; the whole pass should stop.
    Blocked(StatusCode),
    /// Any other non-success status. Only this request is lost.
    Status(StatusCode),
}

pub fn is_block_status(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS
}

/// GETs `url` with a per-request timeout. Transport failures and unparsable
/// bodies are errors; HTTP statuses are classified into [`Fetched`].
pub fn fetch_json(url: &str, timeout: Duration) -> Result<Fetched> {
    let client = http_client()?;
    let resp = client
        .get(url)
        .timeout(timeout)
        .header(USER_AGENT, BROWSER_AGENT)
        .header(ACCEPT, "application/json")
        .send()
        .with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    if is_block_status(status) {
        return Ok(Fetched::Blocked(status));
    }
    if !status.is_success() {
        return Ok(Fetched::Status(status));
    }
    let body = resp.text().context("failed reading body")?;
    let value = serde_json::from_str(&body).with_context(|| format!("invalid json from {url}"))?;
    Ok(Fetched::Json(value))
}

/// Runs `action` on a dedicated rayon pool of `threads` workers, falling back
/// to the caller's pool if one cannot be built.
pub fn with_fetch_pool<T, F>(threads: usize, action: F) -> T
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads.clamp(1, 32))
        .build()
    {
        Ok(pool) => pool.install(action),
        Err(_) => action(),
    }
}
