mod neo4j;

pub use neo4j::{Neo4jConfig, Neo4jStorage};

use async_trait::async_trait;

use crate::error::Result;

/// All relevant information to create a meaningful edge inside the graph
/// store. `files` is only carried by `INCLUDES` edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source_project: String,
    pub target_project: String,
    pub ref_name: String,
    pub files: Vec<String>,
}

/// Graph-store abstraction the crawl engine writes through.
///
/// Every operation is an idempotent upsert so repeated crawls converge on
/// the same graph. Implementations are called from many workers at once and
/// must serialize at the backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upserts a project node keyed by its path with namespace.
    async fn create_project_node(&self, project_path: &str) -> Result<()>;

    /// Upserts an `INCLUDES` edge carrying the ref and file list, so the
    /// graph can be queried by what exactly is pulled in.
    async fn create_include_edge(&self, edge: &Edge) -> Result<()>;

    /// Upserts a `TRIGGERS` edge carrying the ref.
    async fn create_trigger_edge(&self, edge: &Edge) -> Result<()>;

    /// Wipes all nodes and edges.
    async fn remove_all(&self) -> Result<()>;
}

/// Supported graph-store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Neo4j,
}
