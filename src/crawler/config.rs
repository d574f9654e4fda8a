use std::time::Duration;

use url::Url;

/// Runtime configuration for the crawl engine, assembled from the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the GitLab instance, e.g. `https://gitlab.example.com`.
    pub gitlab_host: Url,
    /// Personal or project access token sent as `PRIVATE-TOKEN`.
    pub gitlab_token: String,
    /// Token-bucket rate (and burst) for outgoing GitLab requests.
    pub gitlab_max_rps: u32,
    /// Wipe the graph store before crawling.
    pub storage_cleanup: bool,
    /// Fallback ref for includes and triggers that do not name one.
    pub default_ref_name: String,
    pub http_client_timeout: Duration,
    pub http_client_max_retry: u32,
    pub http_client_min_retry_wait: Duration,
    pub http_client_max_retry_wait: Duration,
    /// Number of concurrent project workers.
    pub workers: usize,
}
