use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use tokio_util::sync::CancellationToken;

use crate::error::{CigraphError, Result};

use super::config::Config;

/// Executes plain GET requests against the GitLab API.
///
/// The crawler only ever needs this one operation; keeping it behind a trait
/// lets tests script responses without a network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response>;
}

/// Rate-limited HTTP client shared by every worker.
///
/// Each request acquires one token from a token bucket with rate and burst
/// `gitlab_max_rps` before being handed to an inner client that retries
/// transient failures and 5xx responses with exponential backoff. Retries of
/// a single logical request do not re-acquire tokens.
#[derive(Debug)]
pub struct RateLimitedClient {
    inner: ClientWithMiddleware,
    limiter: DefaultDirectRateLimiter,
    cancel: CancellationToken,
}

impl RateLimitedClient {
    pub fn new(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let rps = NonZeroU32::new(config.gitlab_max_rps)
            .ok_or_else(|| CigraphError::Config("gitlab-max-rps must be at least 1".into()))?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                config.http_client_min_retry_wait,
                config.http_client_max_retry_wait,
            )
            .build_with_max_retries(config.http_client_max_retry);

        let client = reqwest::Client::builder()
            .user_agent(concat!("cigraph/", env!("CARGO_PKG_VERSION")))
            .timeout(config.http_client_timeout)
            .build()
            .map_err(|e| CigraphError::Config(format!("Failed to create HTTP client: {e}")))?;

        let inner = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_second(rps).allow_burst(rps)),
            cancel,
        })
    }
}

#[async_trait]
impl HttpClient for RateLimitedClient {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(CigraphError::Canceled),
            response = async {
                self.limiter.until_ready().await;
                self.inner.execute(request).await
            } => Ok(response?),
        }
    }
}
