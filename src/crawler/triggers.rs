use log::{debug, warn};
use serde_yaml::{Mapping, Value};

use crate::error::{CigraphError, Result};

use super::includes::decode_pipeline;

/// A downstream-pipeline reference extracted from a job's `trigger:` key.
///
/// `trigger: project` starts a pipeline in another project, while
/// `trigger: include` starts a child pipeline from one or more files. Each
/// child-pipeline source shape gets its own variant so nothing about the
/// reference is lost between parsing and edge emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Project {
        project: String,
        branch: Option<String>,
    },
    LocalInclude {
        project: String,
        file: String,
    },
    TemplateInclude {
        project: String,
        file: String,
    },
    ProjectInclude {
        project: String,
        ref_name: Option<String>,
        files: Vec<String>,
    },
    ArtifactInclude {
        project: String,
        artifact: String,
        job: String,
    },
}

impl Trigger {
    /// The project the resulting `TRIGGERS` edge points at.
    pub fn project(&self) -> &str {
        match self {
            Trigger::Project { project, .. }
            | Trigger::LocalInclude { project, .. }
            | Trigger::TemplateInclude { project, .. }
            | Trigger::ProjectInclude { project, .. }
            | Trigger::ArtifactInclude { project, .. } => project,
        }
    }

    /// The ref the trigger names, if its shape carries one.
    pub fn ref_name(&self) -> Option<&str> {
        match self {
            Trigger::Project { branch, .. } => branch.as_deref(),
            Trigger::ProjectInclude { ref_name, .. } => ref_name.as_deref(),
            _ => None,
        }
    }
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

/// Extracts all triggers from a pipeline file.
///
/// Every top-level key whose value is a mapping is treated as a job; jobs
/// without a `trigger` key are skipped. Unparseable triggers are logged and
/// dropped so sibling jobs still contribute their edges.
pub fn parse_triggers(file: &[u8], project_path: &str) -> Result<Vec<Trigger>> {
    let doc = decode_pipeline(file)?;

    let mut triggers = Vec::new();
    for (key, value) in &doc {
        let job_name = key.as_str().unwrap_or("<non-string key>");
        let Some(job) = value.as_mapping() else {
            debug!("skipping {job_name} since it is not a job mapping");
            continue;
        };

        let Some(raw_trigger) = job.get("trigger") else {
            continue;
        };

        match raw_trigger {
            Value::String(project) => triggers.push(Trigger::Project {
                project: project.clone(),
                branch: None,
            }),
            Value::Mapping(map) => match parse_trigger_map(map, project_path) {
                Ok(mut parsed) => triggers.append(&mut parsed),
                Err(err) => warn!("could not parse contents of trigger in {job_name}: {err}"),
            },
            other => debug!(
                "skipping trigger of unsupported type {} in {job_name}",
                value_type(other)
            ),
        }
    }

    Ok(triggers)
}

fn parse_trigger_map(map: &Mapping, project_path: &str) -> Result<Vec<Trigger>> {
    if let Some(project) = map.get("project").and_then(Value::as_str) {
        let branch = map
            .get("branch")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok(vec![Trigger::Project {
            project: project.to_string(),
            branch,
        }]);
    }

    let Some(include) = map.get("include") else {
        return Err(CigraphError::Parse(
            "trigger map has neither `project` nor `include`".into(),
        ));
    };

    match include {
        Value::String(file) => Ok(vec![Trigger::LocalInclude {
            project: project_path.to_string(),
            file: file.clone(),
        }]),
        Value::Sequence(seq) => {
            let mut triggers = Vec::with_capacity(seq.len());
            for item in seq {
                let Some(item_map) = item.as_mapping() else {
                    debug!(
                        "skipping trigger include entry of unsupported type {}",
                        value_type(item)
                    );
                    continue;
                };
                match parse_trigger_include_item(item_map, project_path) {
                    Ok(trigger) => triggers.push(trigger),
                    Err(err) => warn!("skipping trigger include entry: {err}"),
                }
            }
            Ok(triggers)
        }
        other => Err(CigraphError::Parse(format!(
            "trigger include of unsupported type {}",
            value_type(other)
        ))),
    }
}

/// Parses one entry of a `trigger: include:` list. The accepted shapes are
/// `local`, `template`, `artifact`+`job` and `project`+`file`(+`ref`),
/// tried in that order.
fn parse_trigger_include_item(map: &Mapping, project_path: &str) -> Result<Trigger> {
    if let Some(value) = map.get("local") {
        let file = value.as_str().ok_or_else(|| {
            CigraphError::Parse("`local` trigger include value is not a string".into())
        })?;
        return Ok(Trigger::LocalInclude {
            project: project_path.to_string(),
            file: file.to_string(),
        });
    }

    if let Some(value) = map.get("template") {
        let file = value.as_str().ok_or_else(|| {
            CigraphError::Parse("`template` trigger include value is not a string".into())
        })?;
        // templates live in a GitLab-hosted canonical project; the owning
        // project is filled in during enrichment
        return Ok(Trigger::TemplateInclude {
            project: String::new(),
            file: file.to_string(),
        });
    }

    if let (Some(artifact), Some(job)) = (map.get("artifact"), map.get("job")) {
        let artifact = artifact
            .as_str()
            .ok_or_else(|| CigraphError::Parse("`artifact` value is not a string".into()))?;
        let job = job
            .as_str()
            .ok_or_else(|| CigraphError::Parse("`job` value is not a string".into()))?;
        return Ok(Trigger::ArtifactInclude {
            project: project_path.to_string(),
            artifact: artifact.to_string(),
            job: job.to_string(),
        });
    }

    if let (Some(project), Some(file)) = (map.get("project"), map.get("file")) {
        let project = project
            .as_str()
            .ok_or_else(|| CigraphError::Parse("trigger include `project` is not a string".into()))?;
        let files = match file {
            Value::String(file) => vec![file.clone()],
            Value::Sequence(seq) => seq
                .iter()
                .filter_map(|entry| entry.as_str().map(str::to_string))
                .collect(),
            other => {
                return Err(CigraphError::Parse(format!(
                    "trigger include `file` of {project} has unsupported type {}",
                    value_type(other)
                )))
            }
        };
        let ref_name = map.get("ref").and_then(Value::as_str).map(str::to_string);
        return Ok(Trigger::ProjectInclude {
            project: project.to_string(),
            ref_name,
            files,
        });
    }

    Err(CigraphError::Parse(
        "did not find any valid trigger include values".into(),
    ))
}

/// Fills in the blanks the pipeline file left open: missing branches and
/// refs fall back to `default_ref_name`, include-kind triggers without an
/// owning project become self-referential.
pub fn enrich_triggers(
    triggers: Vec<Trigger>,
    project_path: &str,
    default_ref_name: &str,
) -> Vec<Trigger> {
    triggers
        .into_iter()
        .map(|trigger| match trigger {
            Trigger::Project { project, branch } => Trigger::Project {
                project,
                branch: branch.or_else(|| Some(default_ref_name.to_string())),
            },
            Trigger::ProjectInclude {
                project,
                ref_name,
                files,
            } => Trigger::ProjectInclude {
                project,
                ref_name: ref_name.or_else(|| Some(default_ref_name.to_string())),
                files,
            },
            Trigger::TemplateInclude { project, file } if project.is_empty() => {
                Trigger::TemplateInclude {
                    project: project_path.to_string(),
                    file,
                }
            }
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIGGER_FIXTURE: &[u8] = b"stages:
  - deploy

string-trigger:
  stage: deploy
  trigger: test/trigger

map-trigger:
  trigger:
    project: project/trigger

branch-trigger:
  trigger:
    project: project/trigger
    branch: branch

child-trigger:
  trigger:
    include: some-child/pipeline.yml
";

    #[test]
    fn test_parse_trigger_shapes() {
        let triggers = parse_triggers(TRIGGER_FIXTURE, "g/p").unwrap();
        assert_eq!(
            triggers,
            [
                Trigger::Project {
                    project: "test/trigger".to_string(),
                    branch: None,
                },
                Trigger::Project {
                    project: "project/trigger".to_string(),
                    branch: None,
                },
                Trigger::Project {
                    project: "project/trigger".to_string(),
                    branch: Some("branch".to_string()),
                },
                Trigger::LocalInclude {
                    project: "g/p".to_string(),
                    file: "some-child/pipeline.yml".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_trigger_include_list_variants() {
        let file = b"generate:
  trigger:
    include:
      - local: child.yml
      - template: Security.gitlab-ci.yml
      - artifact: generated.yml
        job: generate-config
      - project: g/lib
        ref: v2
        file:
          - a.yml
          - b.yml
";
        let triggers = parse_triggers(file, "g/p").unwrap();
        assert_eq!(
            triggers,
            [
                Trigger::LocalInclude {
                    project: "g/p".to_string(),
                    file: "child.yml".to_string(),
                },
                Trigger::TemplateInclude {
                    project: String::new(),
                    file: "Security.gitlab-ci.yml".to_string(),
                },
                Trigger::ArtifactInclude {
                    project: "g/p".to_string(),
                    artifact: "generated.yml".to_string(),
                    job: "generate-config".to_string(),
                },
                Trigger::ProjectInclude {
                    project: "g/lib".to_string(),
                    ref_name: Some("v2".to_string()),
                    files: vec!["a.yml".to_string(), "b.yml".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_parse_trigger_include_single_file() {
        let file = b"job:\n  trigger:\n    include:\n      - project: g/lib\n        file: one.yml\n";
        let triggers = parse_triggers(file, "g/p").unwrap();
        assert_eq!(
            triggers,
            [Trigger::ProjectInclude {
                project: "g/lib".to_string(),
                ref_name: None,
                files: vec!["one.yml".to_string()],
            }]
        );
    }

    #[test]
    fn test_unparseable_trigger_map_is_dropped() {
        let file = b"job:\n  trigger:\n    when: manual\nother:\n  trigger: g/downstream\n";
        let triggers = parse_triggers(file, "g/p").unwrap();
        assert_eq!(
            triggers,
            [Trigger::Project {
                project: "g/downstream".to_string(),
                branch: None,
            }]
        );
    }

    #[test]
    fn test_jobs_without_trigger_are_skipped() {
        let file = b"build:\n  script: make\nstages:\n  - build\n";
        let triggers = parse_triggers(file, "g/p").unwrap();
        assert!(triggers.is_empty());
    }

    #[test]
    fn test_enrich_defaults_branch_and_ref() {
        let triggers = vec![
            Trigger::Project {
                project: "g/downstream".to_string(),
                branch: None,
            },
            Trigger::ProjectInclude {
                project: "g/lib".to_string(),
                ref_name: None,
                files: vec!["a.yml".to_string()],
            },
        ];
        let enriched = enrich_triggers(triggers, "g/p", "HEAD");
        assert_eq!(enriched[0].ref_name(), Some("HEAD"));
        assert_eq!(enriched[1].ref_name(), Some("HEAD"));
    }

    #[test]
    fn test_enrich_keeps_explicit_branch() {
        let triggers = vec![Trigger::Project {
            project: "g/downstream".to_string(),
            branch: Some("release".to_string()),
        }];
        let enriched = enrich_triggers(triggers, "g/p", "HEAD");
        assert_eq!(enriched[0].ref_name(), Some("release"));
    }

    #[test]
    fn test_enrich_fills_template_owner() {
        let triggers = vec![Trigger::TemplateInclude {
            project: String::new(),
            file: "Security.gitlab-ci.yml".to_string(),
        }];
        let enriched = enrich_triggers(triggers, "g/p", "HEAD");
        assert_eq!(enriched[0].project(), "g/p");
    }
}
