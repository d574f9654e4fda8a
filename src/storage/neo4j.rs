use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{query, Graph, Query};
use tokio_util::sync::CancellationToken;

use crate::error::{CigraphError, Result};

use super::{Edge, Storage};

const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(15);
const WIPE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for the Neo4j backend.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Neo4j-backed [`Storage`] implementation.
///
/// `neo4rs::Graph` is a connection pool, so one instance is shared across
/// all workers. Every call is a single auto-commit transaction bounded by a
/// timeout and the crawl's cancellation token.
pub struct Neo4jStorage {
    graph: Graph,
    cancel: CancellationToken,
}

impl Neo4jStorage {
    pub async fn connect(config: &Neo4jConfig, cancel: CancellationToken) -> Result<Self> {
        let graph = Graph::new(&config.host, &config.username, &config.password).await?;
        Ok(Self { graph, cancel })
    }

    async fn run(&self, query: Query, timeout: Duration) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(CigraphError::Canceled),
            result = tokio::time::timeout(timeout, self.graph.run(query)) => match result {
                Err(_) => Err(CigraphError::StorageTimeout(timeout)),
                Ok(run) => Ok(run?),
            },
        }
    }
}

#[async_trait]
impl Storage for Neo4jStorage {
    async fn create_project_node(&self, project_path: &str) -> Result<()> {
        let cypher = "MERGE (p:Project {name: $projectPath})";
        self.run(
            query(cypher).param("projectPath", project_path),
            TRANSACTION_TIMEOUT,
        )
        .await
    }

    async fn create_include_edge(&self, edge: &Edge) -> Result<()> {
        let cypher = "MATCH (s:Project {name: $sourceProject})\n\
                      MATCH (t:Project {name: $targetProject})\n\
                      MERGE (s)-[rel:INCLUDES {ref: $ref, files: $files}]->(t)";
        self.run(
            query(cypher)
                .param("sourceProject", edge.source_project.as_str())
                .param("targetProject", edge.target_project.as_str())
                .param("ref", edge.ref_name.as_str())
                .param("files", edge.files.join(",")),
            TRANSACTION_TIMEOUT,
        )
        .await
    }

    async fn create_trigger_edge(&self, edge: &Edge) -> Result<()> {
        let cypher = "MATCH (s:Project {name: $sourceProject})\n\
                      MATCH (t:Project {name: $targetProject})\n\
                      MERGE (s)-[rel:TRIGGERS {ref: $ref}]->(t)";
        self.run(
            query(cypher)
                .param("sourceProject", edge.source_project.as_str())
                .param("targetProject", edge.target_project.as_str())
                .param("ref", edge.ref_name.as_str()),
            TRANSACTION_TIMEOUT,
        )
        .await
    }

    async fn remove_all(&self) -> Result<()> {
        self.run(query("MATCH (n) DETACH DELETE n"), WIPE_TIMEOUT)
            .await
    }
}
