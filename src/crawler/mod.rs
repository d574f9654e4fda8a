mod config;
mod http;
mod includes;
mod triggers;

pub use config::Config;
pub use http::{HttpClient, RateLimitedClient};

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{CigraphError, Result};
use crate::gitlab::{self, Project};
use crate::storage::{Edge, Storage};

use includes::Include;
use triggers::Trigger;

const CI_FILE_NAME: &str = ".gitlab-ci.yml";
const PROJECT_PAGE_SIZE: usize = 100;
const PROJECT_CHANNEL_CAPACITY: usize = 200;

/// The crawl engine: streams every project of a GitLab instance through a
/// worker pool that parses pipeline files and writes the resulting
/// include/trigger graph into storage.
pub struct Crawler {
    config: Config,
    gitlab: gitlab::Client,
    storage: Arc<dyn Storage>,
    cancel: CancellationToken,
}

impl Crawler {
    /// Builds the crawler and its HTTP stack.
    ///
    /// The cancellation token is scoped to one crawl and shared with every
    /// HTTP and storage call.
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let http = Arc::new(RateLimitedClient::new(&config, cancel.clone())?);
        let gitlab = gitlab::Client::new(&config.gitlab_host, &config.gitlab_token, http)?;

        Ok(Self {
            config,
            gitlab,
            storage,
            cancel,
        })
    }

    /// Runs one full crawl to completion.
    ///
    /// A producer task streams projects into a bounded channel; the workers
    /// drain it. A failed stream still lets the workers finish what was
    /// already queued before the run is reported as failed.
    pub async fn crawl(self: Arc<Self>) -> Result<()> {
        // whatever way we leave this function, in-flight work must stop
        let _cancel_guard = self.cancel.clone().drop_guard();

        if self.config.storage_cleanup {
            info!("cleaning up storage before crawling");
            self.storage.remove_all().await?;
        }

        self.gitlab.preflight().await?;

        info!("starting to crawl");

        let (tx, rx) = mpsc::channel(PROJECT_CHANNEL_CAPACITY);

        let producer = {
            let crawler = Arc::clone(&self);
            tokio::spawn(async move {
                crawler
                    .gitlab
                    .stream_projects(PROJECT_PAGE_SIZE, tx)
                    .await
            })
        };

        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for _ in 0..self.config.workers {
            let crawler = Arc::clone(&self);
            let rx = Arc::clone(&rx);
            workers.spawn(async move { crawler.worker(rx).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!("worker task failed: {err}");
            }
        }

        match producer.await {
            Ok(Ok(())) => {
                info!("stopped crawling");
                Ok(())
            }
            Ok(Err(CigraphError::Canceled)) => Err(CigraphError::Canceled),
            Ok(Err(err)) => {
                error!("stopping crawler: error in project stream: {err}");
                Err(CigraphError::StreamFailed)
            }
            Err(err) => {
                error!("project stream task failed: {err}");
                Err(CigraphError::StreamFailed)
            }
        }
    }

    async fn worker(&self, rx: Arc<Mutex<mpsc::Receiver<Project>>>) {
        loop {
            let project = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => None,
                    project = rx.recv() => project,
                }
            };
            let Some(project) = project else { break };

            if let Err(err) = self.process_project(&project).await {
                if matches!(err, CigraphError::Canceled) {
                    break;
                }
                error!(
                    "failed to process project {} ({}): {err}",
                    project.path_with_namespace, project.id
                );
            }
        }
    }

    /// Writes a project's node and, if it has a default branch, traverses
    /// its pipeline file. A failing node write skips the project; traversal
    /// errors are logged here so the worker moves on to the next project.
    async fn process_project(&self, project: &Project) -> Result<()> {
        self.storage
            .create_project_node(&project.path_with_namespace)
            .await?;

        let Some(default_branch) = project.default_branch() else {
            debug!(
                "project {} has no default branch",
                project.path_with_namespace
            );
            return Ok(());
        };

        let mut visited = HashSet::new();
        if let Err(err) = self
            .handle_includes(project, CI_FILE_NAME, default_branch, &mut visited)
            .await
        {
            if matches!(err, CigraphError::Canceled) {
                return Err(err);
            }
            error!(
                "failed to handle all includes of {}: {err}",
                project.path_with_namespace
            );
        }

        Ok(())
    }

    /// Recursively follows a pipeline file's includes, emitting nodes and
    /// edges along the way.
    ///
    /// `visited` is shared along one traversal chain and keyed by
    /// `project--file`, which bounds the recursion even when projects
    /// include each other.
    fn handle_includes<'a>(
        &'a self,
        project: &'a Project,
        file_path: &'a str,
        ref_name: &'a str,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let key = format!("{}--{}", project.path_with_namespace, file_path);
            if !visited.insert(key) {
                let mut chain: Vec<String> = visited.iter().cloned().collect();
                chain.sort();
                return Err(CigraphError::CycleDetected {
                    chain: chain.join(","),
                });
            }

            let file = match self.gitlab.raw_file(project.id, file_path, ref_name).await {
                Ok(file) => file,
                // a missing file is a normal end of this branch
                Err(CigraphError::RawFileNotFound) => return Ok(()),
                Err(err) => return Err(err),
            };

            let parsed = triggers::parse_triggers(&file, &project.path_with_namespace)?;
            let parsed = triggers::enrich_triggers(
                parsed,
                &project.path_with_namespace,
                &self.config.default_ref_name,
            );
            for trigger in &parsed {
                debug!(
                    "trigger from {} to {}",
                    project.path_with_namespace,
                    trigger.project()
                );
                if let Err(err) = self.emit_trigger_edge(project, trigger).await {
                    if matches!(err, CigraphError::Canceled) {
                        return Err(err);
                    }
                    error!(
                        "failed to create trigger edge from {} to {}: {err}",
                        project.path_with_namespace,
                        trigger.project()
                    );
                }
            }

            let raw = includes::parse_includes(&file)?;
            let enriched = includes::enrich_includes(
                raw,
                project.default_branch().unwrap_or_default(),
                &project.path_with_namespace,
                &self.config.default_ref_name,
            );

            for include in enriched {
                let (target_path, include_ref, files) = match include {
                    Include::Remote { url } => {
                        debug!("skipping remote include {url}");
                        continue;
                    }
                    Include::Project {
                        project,
                        ref_name,
                        files,
                    } => (project, ref_name, files),
                };

                if include_ref.is_empty() {
                    warn!(
                        "got empty ref for include of {target_path} from {}",
                        project.path_with_namespace
                    );
                }

                let edge = Edge {
                    source_project: project.path_with_namespace.clone(),
                    target_project: target_path.clone(),
                    ref_name: include_ref.clone(),
                    files: files.clone(),
                };
                if let Err(err) = self.traverse_include(&edge).await {
                    if matches!(err, CigraphError::Canceled) {
                        return Err(err);
                    }
                    error!(
                        "failed to create include edge from {} to {target_path}: {err}",
                        project.path_with_namespace
                    );
                }

                let target = if target_path == project.path_with_namespace {
                    project.clone()
                } else {
                    self.gitlab.project_by_path(&target_path).await?
                };

                for file in &files {
                    self.handle_includes(&target, file, &include_ref, visited)
                        .await?;
                }
            }

            Ok(())
        }
        .boxed()
    }

    /// MERGEs the include target's node before the edge, so edges never
    /// dangle.
    async fn traverse_include(&self, edge: &Edge) -> Result<()> {
        self.storage.create_project_node(&edge.target_project).await?;
        self.storage.create_include_edge(edge).await
    }

    /// MERGEs the trigger target's node before the edge.
    async fn emit_trigger_edge(&self, project: &Project, trigger: &Trigger) -> Result<()> {
        self.storage.create_project_node(trigger.project()).await?;

        let edge = Edge {
            source_project: project.path_with_namespace.clone(),
            target_project: trigger.project().to_string(),
            ref_name: trigger
                .ref_name()
                .unwrap_or(&self.config.default_ref_name)
                .to_string(),
            files: Vec::new(),
        };
        self.storage.create_trigger_edge(&edge).await
    }
}
