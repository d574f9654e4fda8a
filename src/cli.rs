use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use url::Url;

use crate::crawler;
use crate::error::{CigraphError, Result};
use crate::storage::{Backend, Neo4jConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Command line and environment configuration of the crawler.
#[derive(Parser, Debug)]
#[command(name = "cigraph")]
#[command(author, version, about = "Crawls GitLab CI pipeline definitions into a dependency graph", long_about = None)]
pub struct Cli {
    /// Base URL of the GitLab instance, e.g. https://gitlab.example.com
    #[arg(long, env = "GITLAB_HOST")]
    pub gitlab_host: Url,

    /// Personal or project access token used for all API calls
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: String,

    /// Maximum GitLab API requests per second
    #[arg(long, env = "GITLAB_MAX_RPS", default_value_t = 1)]
    pub gitlab_max_rps: u32,

    /// Graph-store backend to write to
    #[arg(long, env = "STORAGE_BACKEND", value_enum)]
    pub storage: Backend,

    /// Wipe the graph store before crawling
    #[arg(long, env = "STORAGE_CLEANUP")]
    pub storage_cleanup: bool,

    /// Fallback git ref for includes and triggers that do not name one
    #[arg(long, env = "DEFAULT_REF_NAME", default_value = "HEAD")]
    pub default_ref_name: String,

    /// Connect and read timeout per HTTP request
    #[arg(long, env = "HTTP_CLIENT_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub http_client_timeout: Duration,

    /// How often transient HTTP failures are retried
    #[arg(long, env = "HTTP_CLIENT_MAX_RETRY", default_value_t = 2)]
    pub http_client_max_retry: u32,

    /// Lower bound of the HTTP retry backoff
    #[arg(long, env = "HTTP_CLIENT_MIN_RETRY_WAIT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub http_client_min_retry_wait: Duration,

    /// Upper bound of the HTTP retry backoff
    #[arg(long, env = "HTTP_CLIENT_MAX_RETRY_WAIT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub http_client_max_retry_wait: Duration,

    /// Number of concurrent project workers
    #[arg(long = "workers", env = "NUMBER_OF_WORKERS", default_value_t = 20)]
    pub workers: usize,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "json")]
    pub log_format: LogFormat,

    /// Bolt URL of the Neo4j instance
    #[arg(long, env = "NEO4J_HOST", default_value = "bolt://127.0.0.1:7687")]
    pub neo4j_host: String,

    #[arg(long, env = "NEO4J_USERNAME", default_value = "neo4j")]
    pub neo4j_username: String,

    /// Required when the neo4j backend is selected
    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    pub neo4j_password: Option<String>,
}

impl Cli {
    pub fn crawler_config(&self) -> crawler::Config {
        crawler::Config {
            gitlab_host: self.gitlab_host.clone(),
            gitlab_token: self.gitlab_token.clone(),
            gitlab_max_rps: self.gitlab_max_rps,
            storage_cleanup: self.storage_cleanup,
            default_ref_name: self.default_ref_name.clone(),
            http_client_timeout: self.http_client_timeout,
            http_client_max_retry: self.http_client_max_retry,
            http_client_min_retry_wait: self.http_client_min_retry_wait,
            http_client_max_retry_wait: self.http_client_max_retry_wait,
            workers: self.workers,
        }
    }

    pub fn neo4j_config(&self) -> Result<Neo4jConfig> {
        let password = self.neo4j_password.clone().ok_or_else(|| {
            CigraphError::Config("neo4j-password is required for the neo4j backend".into())
        })?;

        Ok(Neo4jConfig {
            host: self.neo4j_host.clone(),
            username: self.neo4j_username.clone(),
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "cigraph",
            "--gitlab-host",
            "https://gitlab.example.com",
            "--gitlab-token",
            "glpat-test",
            "--storage",
            "neo4j",
        ]
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(base_args()).unwrap();
        assert_eq!(cli.gitlab_max_rps, 1);
        assert_eq!(cli.workers, 20);
        assert_eq!(cli.default_ref_name, "HEAD");
        assert_eq!(cli.http_client_timeout, Duration::from_secs(5));
        assert_eq!(cli.http_client_max_retry, 2);
        assert_eq!(cli.http_client_min_retry_wait, Duration::from_secs(5));
        assert_eq!(cli.http_client_max_retry_wait, Duration::from_secs(30));
        assert_eq!(cli.log_level, LevelFilter::Info);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.neo4j_host, "bolt://127.0.0.1:7687");
        assert_eq!(cli.neo4j_username, "neo4j");
        assert!(!cli.storage_cleanup);
    }

    #[test]
    fn test_missing_required_flags() {
        assert!(Cli::try_parse_from(["cigraph"]).is_err());
        assert!(
            Cli::try_parse_from(["cigraph", "--gitlab-host", "https://gitlab.example.com"])
                .is_err()
        );
    }

    #[test]
    fn test_invalid_host_is_rejected() {
        let mut args = base_args();
        args[2] = "not a url";
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_duration_flags_accept_humantime() {
        let mut args = base_args();
        args.extend(["--http-client-timeout", "1500ms"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.http_client_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_neo4j_config_requires_password() {
        let cli = Cli::try_parse_from(base_args()).unwrap();
        assert!(matches!(
            cli.neo4j_config().unwrap_err(),
            CigraphError::Config(_)
        ));

        let mut args = base_args();
        args.extend(["--neo4j-password", "s3cret"]);
        let cli = Cli::try_parse_from(args).unwrap();
        let config = cli.neo4j_config().unwrap();
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.username, "neo4j");
    }
}
