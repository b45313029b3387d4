use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::guard::{BlockedRedirect, UrlGuard};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 10;

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

/// A fetched document body along with the final URL and status.
#[derive(Debug)]
pub struct Fetched {
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// Time- and size-bounded GET client. One instance is shared by all requests.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client,
    guard: UrlGuard,
    timeout: Duration,
    max_bytes: u64,
}

impl Fetcher {
    pub fn new(guard: UrlGuard, timeout: Duration, max_bytes: u64) -> Result<Self> {
        let client = client_builder(guard, timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Fetcher {
            client,
            guard,
            timeout,
            max_bytes,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            UrlGuard::new(config.allow_private_hosts),
            config.fetch_timeout,
            config.max_response_bytes,
        )
    }

    pub fn guard(&self) -> &UrlGuard {
        &self.guard
    }

    pub async fn fetch(&self, url: &Url) -> Result<Fetched> {
        self.guard.check(url)?;

        match tokio::time::timeout(self.timeout, self.fetch_unbounded(url)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%url, timeout = ?self.timeout, "fetch timed out");
                Err(AppError::Timeout)
            }
        }
    }

    async fn fetch_unbounded(&self, url: &Url) -> Result<Fetched> {
        let mut response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus(status.as_u16()));
        }

        if let Some(declared) = declared_length(response.headers()) {
            if declared > self.max_bytes {
                debug!(%url, declared, max = self.max_bytes, "declared length over limit");
                return Err(AppError::TooLarge);
            }
        }

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(AppError::TooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Fetched {
            url: response.url().clone(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

fn client_builder(guard: UrlGuard, timeout: Duration) -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

    ClientBuilder::new()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .connect_timeout(timeout)
        .pool_max_idle_per_host(10)
        .redirect(redirect_policy(guard))
}

/// Follows up to [`MAX_REDIRECTS`] hops, each one host-checked like the first request.
fn redirect_policy(guard: UrlGuard) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        if guard.check(attempt.url()).is_err() {
            let target = attempt.url().to_string();
            return attempt.error(BlockedRedirect(target));
        }
        attempt.follow()
    })
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
