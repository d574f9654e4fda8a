use log::{debug, warn};
use serde_yaml::{Mapping, Value};

use crate::error::{CigraphError, Result};

/// An `include:` entry as it appears in a pipeline file, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInclude {
    Local(String),
    Remote(String),
    Template(String),
    Project {
        project: String,
        ref_name: Option<String>,
        files: Vec<String>,
    },
}

/// An include resolved against its owning project and the configured
/// default ref. Remote includes point outside the instance and stay opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Include {
    Project {
        project: String,
        ref_name: String,
        files: Vec<String>,
    },
    Remote {
        url: String,
    },
}

/// Decodes a pipeline file into its top-level mapping.
pub(super) fn decode_pipeline(file: &[u8]) -> Result<Mapping> {
    Ok(serde_yaml::from_slice(file)?)
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

/// Extracts all `include:` entries from a pipeline file.
///
/// The `include` key accepts a bare string, a single mapping, or a list of
/// either; malformed entries are logged and skipped so one bad include does
/// not hide its siblings.
pub fn parse_includes(file: &[u8]) -> Result<Vec<RawInclude>> {
    let doc = decode_pipeline(file)?;

    let Some(raw) = doc.get("include") else {
        return Ok(Vec::new());
    };

    let items: Vec<&Value> = match raw {
        Value::Null => {
            debug!("ignoring nil include");
            Vec::new()
        }
        Value::String(_) | Value::Mapping(_) => vec![raw],
        Value::Sequence(seq) => seq.iter().collect(),
        other => {
            return Err(CigraphError::Parse(format!(
                "failed to process include of type {}",
                value_type(other)
            )))
        }
    };

    let mut includes = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(local) => includes.push(RawInclude::Local(local.clone())),
            Value::Mapping(map) => match parse_include_map(map) {
                Ok(include) => includes.push(include),
                Err(err) => warn!("failed to parse include entry: {err}"),
            },
            other => debug!(
                "ignoring include entry of unsupported type {}",
                value_type(other)
            ),
        }
    }

    Ok(includes)
}

/// Parses one include mapping. `local`, `remote` and `template` are
/// mutually exclusive short forms tried in that order; everything else must
/// be a cross-project include with `project` and `file` keys.
fn parse_include_map(map: &Mapping) -> Result<RawInclude> {
    for key in ["local", "remote", "template"] {
        let Some(value) = map.get(key) else { continue };
        match value.as_str() {
            Some(s) => {
                return Ok(match key {
                    "local" => RawInclude::Local(s.to_string()),
                    "remote" => RawInclude::Remote(s.to_string()),
                    _ => RawInclude::Template(s.to_string()),
                });
            }
            None => warn!("`{key}` include value is not a string, trying the next key"),
        }
    }

    let project = map
        .get("project")
        .and_then(Value::as_str)
        .ok_or_else(|| CigraphError::Parse("include is missing a `project` key".into()))?;

    let files = match map.get("file") {
        Some(Value::String(file)) => vec![file.clone()],
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|entry| match entry.as_str() {
                Some(s) => Some(s.to_string()),
                None => {
                    debug!("skipping non-string file entry in include of {project}");
                    None
                }
            })
            .collect(),
        _ => {
            return Err(CigraphError::Parse(format!(
                "include of {project} is missing a `file` key"
            )))
        }
    };

    let ref_name = map.get("ref").and_then(Value::as_str).map(str::to_string);

    Ok(RawInclude::Project {
        project: project.to_string(),
        ref_name,
        files,
    })
}

/// Resolves raw includes against the owning project.
///
/// Cross-project includes without a ref fall back to `default_ref_name`;
/// local and template includes become self-referential on the project's
/// default branch; remote includes are passed through untouched.
pub fn enrich_includes(
    raw: Vec<RawInclude>,
    default_branch: &str,
    project_path: &str,
    default_ref_name: &str,
) -> Vec<Include> {
    raw.into_iter()
        .map(|include| match include {
            RawInclude::Project {
                project,
                ref_name,
                files,
            } => {
                let ref_name = ref_name.unwrap_or_else(|| {
                    debug!("setting include ref of {project} to {default_ref_name} because it was not set");
                    default_ref_name.to_string()
                });
                Include::Project {
                    project,
                    ref_name,
                    files,
                }
            }
            RawInclude::Local(file) | RawInclude::Template(file) => Include::Project {
                project: project_path.to_string(),
                ref_name: default_branch.to_string(),
                files: vec![file],
            },
            RawInclude::Remote(url) => Include::Remote { url },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_include(project: &str, ref_name: Option<&str>, files: &[&str]) -> RawInclude {
        RawInclude::Project {
            project: project.to_string(),
            ref_name: ref_name.map(str::to_string),
            files: files.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_no_include_key() {
        let includes = parse_includes(b"job:\n  script: make").unwrap();
        assert!(includes.is_empty());
    }

    #[test]
    fn test_parse_nil_include() {
        let includes = parse_includes(b"include:\njob:\n  script: make").unwrap();
        assert!(includes.is_empty());
    }

    #[test]
    fn test_parse_string_include() {
        let includes = parse_includes(b"include: .common.yml").unwrap();
        assert_eq!(includes, [RawInclude::Local(".common.yml".to_string())]);
    }

    #[test]
    fn test_parse_single_mapping_include() {
        let includes = parse_includes(
            b"include:\n  project: g/lib\n  file: ci.yml",
        )
        .unwrap();
        assert_eq!(includes, [project_include("g/lib", None, &["ci.yml"])]);
    }

    #[test]
    fn test_parse_list_include_with_file_list_and_ref() {
        let includes = parse_includes(
            b"include:\n  - project: g/lib\n    ref: v1\n    file:\n      - a.yml\n      - b.yml",
        )
        .unwrap();
        assert_eq!(
            includes,
            [project_include("g/lib", Some("v1"), &["a.yml", "b.yml"])]
        );
    }

    #[test]
    fn test_parse_mixed_list_include() {
        let includes = parse_includes(
            b"include:\n  - .local.yml\n  - remote: https://example.com/ci.yml\n  - template: Auto-DevOps.gitlab-ci.yml",
        )
        .unwrap();
        assert_eq!(
            includes,
            [
                RawInclude::Local(".local.yml".to_string()),
                RawInclude::Remote("https://example.com/ci.yml".to_string()),
                RawInclude::Template("Auto-DevOps.gitlab-ci.yml".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_include_scalar_of_wrong_type_fails() {
        assert!(parse_includes(b"include: 42").is_err());
    }

    #[test]
    fn test_short_form_keys_win_over_project() {
        let includes = parse_includes(
            b"include:\n  - local: .a.yml\n    project: g/lib\n    file: ci.yml",
        )
        .unwrap();
        assert_eq!(includes, [RawInclude::Local(".a.yml".to_string())]);
    }

    #[test]
    fn test_exclusivity_order_local_remote_template() {
        let includes = parse_includes(
            b"include:\n  - remote: https://example.com/x.yml\n    template: T.yml",
        )
        .unwrap();
        assert_eq!(
            includes,
            [RawInclude::Remote("https://example.com/x.yml".to_string())]
        );
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        // first entry misses `file`, second is fine
        let includes = parse_includes(
            b"include:\n  - project: g/broken\n  - project: g/lib\n    file: ci.yml",
        )
        .unwrap();
        assert_eq!(includes, [project_include("g/lib", None, &["ci.yml"])]);
    }

    #[test]
    fn test_non_mapping_document_fails() {
        assert!(parse_includes(b"- a\n- b").is_err());
    }

    #[test]
    fn test_enrich_defaults_missing_ref() {
        let enriched = enrich_includes(
            vec![project_include("g/lib", None, &["ci.yml"])],
            "main",
            "g/p",
            "HEAD",
        );
        assert_eq!(
            enriched,
            [Include::Project {
                project: "g/lib".to_string(),
                ref_name: "HEAD".to_string(),
                files: vec!["ci.yml".to_string()],
            }]
        );
    }

    #[test]
    fn test_enrich_keeps_explicit_ref() {
        let enriched = enrich_includes(
            vec![project_include("g/lib", Some("v1"), &["ci.yml"])],
            "main",
            "g/p",
            "HEAD",
        );
        assert_eq!(
            enriched,
            [Include::Project {
                project: "g/lib".to_string(),
                ref_name: "v1".to_string(),
                files: vec!["ci.yml".to_string()],
            }]
        );
    }

    #[test]
    fn test_enrich_local_and_template_become_self_referential() {
        let enriched = enrich_includes(
            vec![
                RawInclude::Local(".common.yml".to_string()),
                RawInclude::Template("Security.gitlab-ci.yml".to_string()),
            ],
            "main",
            "g/p",
            "HEAD",
        );
        assert_eq!(
            enriched,
            [
                Include::Project {
                    project: "g/p".to_string(),
                    ref_name: "main".to_string(),
                    files: vec![".common.yml".to_string()],
                },
                Include::Project {
                    project: "g/p".to_string(),
                    ref_name: "main".to_string(),
                    files: vec!["Security.gitlab-ci.yml".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_enrich_leaves_remote_untouched() {
        let enriched = enrich_includes(
            vec![RawInclude::Remote("https://example.com/ci.yml".to_string())],
            "main",
            "g/p",
            "HEAD",
        );
        assert_eq!(
            enriched,
            [Include::Remote {
                url: "https://example.com/ci.yml".to_string(),
            }]
        );
    }
}
