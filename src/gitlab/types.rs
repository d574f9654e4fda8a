use serde::Deserialize;

/// A minimalist representation of a GitLab project, deserialized from
/// <https://docs.gitlab.com/ee/api/projects.html>.
///
/// Only the fields the crawler needs are kept; `simple=true` listings and
/// single-project lookups both carry them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub id: u64,
    /// Empty repositories have no default branch; GitLab then omits the
    /// field or sends `null`.
    #[serde(default)]
    pub default_branch: Option<String>,
    pub path_with_namespace: String,
}

impl Project {
    /// The branch to crawl pipeline files on, if the project has one.
    pub fn default_branch(&self) -> Option<&str> {
        self.default_branch.as_deref().filter(|b| !b.is_empty())
    }
}
