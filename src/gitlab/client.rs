use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use log::debug;
use reqwest::header::{HeaderValue, LINK};
use reqwest::Method;
use tokio::sync::mpsc;
use url::Url;

use crate::crawler::HttpClient;
use crate::error::{CigraphError, Result};

use super::link_header;
use super::types::Project;

const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Client for the small slice of the GitLab REST API the crawler needs.
///
/// All requests are GETs authenticated with a `PRIVATE-TOKEN` header and go
/// through the shared rate-limited [`HttpClient`].
pub struct Client {
    api_url: Url,
    token: HeaderValue,
    http: Arc<dyn HttpClient>,
}

impl Client {
    pub fn new(host: &Url, token: &str, http: Arc<dyn HttpClient>) -> Result<Self> {
        let api_url = host
            .join("api/v4/")
            .map_err(|e| CigraphError::Config(format!("Invalid GitLab host URL: {e}")))?;

        let token = HeaderValue::from_str(token)
            .map_err(|_| CigraphError::Config("gitlab-token contains invalid characters".into()))?;

        Ok(Self {
            api_url,
            token,
            http,
        })
    }

    fn request(&self, url: Url) -> reqwest::Request {
        let mut request = reqwest::Request::new(Method::GET, url);
        request
            .headers_mut()
            .insert(PRIVATE_TOKEN_HEADER, self.token.clone());
        request
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        self.http.execute(self.request(url)).await
    }

    /// Checks that the configured host and token are usable at all before a
    /// crawl starts hammering the API.
    ///
    /// Retries transient failures with exponential backoff for up to 30
    /// seconds, but exits immediately on 401 or 403 since those will not fix
    /// themselves.
    pub async fn preflight(&self) -> Result<()> {
        let url = self.api_url.join("version")?;

        let op = || async {
            let url = url.clone();
            let url_str = url.to_string();

            let response = self.get(url).await.map_err(|e| match e {
                CigraphError::Canceled => backoff::Error::permanent(e),
                other => backoff::Error::transient(other),
            })?;

            match response.status().as_u16() {
                401 => Err(backoff::Error::permanent(CigraphError::Unauthorized)),
                403 => Err(backoff::Error::permanent(CigraphError::Forbidden)),
                status if status > 299 => Err(backoff::Error::transient(CigraphError::Api {
                    status,
                    url: url_str,
                })),
                _ => Ok(()),
            }
        };

        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            randomization_factor: 0.5,
            multiplier: 1.5,
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, op).await.map_err(|e| match e {
            CigraphError::Unauthorized | CigraphError::Forbidden | CigraphError::Canceled => e,
            _ => CigraphError::AuthCheckExhausted,
        })
    }

    /// Streams every project of the instance into `tx` using keyset
    /// pagination.
    ///
    /// The channel is expected to be bounded; a slow consumer backpressures
    /// the stream. The stream ends when a page carries no `Link` header or
    /// no `rel="next"` element.
    pub async fn stream_projects(&self, page_size: usize, tx: mpsc::Sender<Project>) -> Result<()> {
        let mut url = self.api_url.join("projects")?;
        url.query_pairs_mut()
            .append_pair("pagination", "keyset")
            .append_pair("order_by", "id")
            .append_pair("per_page", &page_size.to_string())
            .append_pair("simple", "true");

        let mut next = Some(url);
        while let Some(url) = next.take() {
            let url_str = url.to_string();
            let response = self.get(url).await?;

            let status = response.status().as_u16();
            if status > 299 {
                return Err(CigraphError::Api {
                    status,
                    url: url_str,
                });
            }

            let link = match response.headers().get(LINK) {
                Some(value) => Some(
                    value
                        .to_str()
                        .map_err(|_| CigraphError::InvalidLinkHeader {
                            header: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                        })?
                        .to_owned(),
                ),
                None => None,
            };

            let projects: Vec<Project> = response.json().await?;
            debug!("streaming {} projects from {url_str}", projects.len());

            for project in projects {
                if tx.send(project).await.is_err() {
                    // every worker is gone, the crawl is shutting down
                    return Err(CigraphError::Canceled);
                }
            }

            if let Some(link) = link {
                let headers = link_header::parse_link_headers(&link)?;
                next = link_header::next_link(&headers).map(|lh| lh.link.clone());
            }
        }

        Ok(())
    }

    /// Fetches the raw contents of a repository file at a given ref.
    ///
    /// A 404 maps to the typed [`CigraphError::RawFileNotFound`] so callers
    /// can treat missing pipeline files as a normal end of recursion.
    pub async fn raw_file(
        &self,
        project_id: u64,
        file_path: &str,
        ref_name: &str,
    ) -> Result<Vec<u8>> {
        let file = file_path.trim_start_matches('/');
        let mut url = self.api_url.join(&format!(
            "projects/{project_id}/repository/files/{}/raw",
            urlencoding::encode(file)
        ))?;
        url.query_pairs_mut().append_pair("ref", ref_name);

        let response = self.get(url).await?;
        let status = response.status().as_u16();
        if status == 404 {
            return Err(CigraphError::RawFileNotFound);
        }
        if status > 299 {
            return Err(CigraphError::RawFile {
                project_id,
                file: file.to_string(),
                ref_name: ref_name.to_string(),
                status,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Looks a single project up by its path with namespace.
    pub async fn project_by_path(&self, path: &str) -> Result<Project> {
        let url = self
            .api_url
            .join(&format!("projects/{}", urlencoding::encode(path)))?;
        let url_str = url.to_string();

        let response = self.get(url).await?;
        let status = response.status().as_u16();
        if status > 299 {
            return Err(CigraphError::Api {
                status,
                url: url_str,
            });
        }

        Ok(response.json().await?)
    }
}
