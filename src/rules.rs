//! Rule files: filter definitions and policy assignments in YAML.
//!
//! ```yaml
//! filters:
//!   - { id: 10, op: mask, value: 0x40, mask: 0x40 }
//!   - { id: 11, op: apply, target: call.minor, predicate: 10, tag: creat }
//! policy:
//!   - { class: open, action: none, filter: 11 }
//! ```
//!
//! Files are loaded in path order. A filter can only reference filters
//! defined before it, in the same file or in a previous one. Policy entries
//! are applied once every filter has been created.

use std::{
    fs,
    path::{Path, PathBuf},
};

use audit_filter::{AuditEngine, FilterDefinition, FilterError, PolicySet};
use glob::glob;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const RULE_EXTENSION: &str = "yaml";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub policy: Vec<PolicySet>,
}

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Error listing rules: {0}")]
    RuleListing(#[from] glob::PatternError),
    #[error("Error reading rule: {name}")]
    RuleLoading {
        name: String,
        #[source]
        error: std::io::Error,
    },
    #[error("Error parsing rule file: {filename}")]
    RuleParsing {
        filename: String,
        #[source]
        error: serde_yaml::Error,
    },
    #[error("Error creating filter {definition} from {filename}")]
    FilterCreation {
        filename: String,
        definition: String,
        #[source]
        error: FilterError,
    },
    #[error("Error applying policy '{policy}' from {filename}")]
    PolicyAssignment {
        filename: String,
        policy: String,
        #[source]
        error: FilterError,
    },
}

/// Summary of a load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadedRules {
    pub files: usize,
    pub filters: usize,
    pub policies: usize,
}

/// Load every rule file found under `paths` into `engine`.
pub fn load_rules(engine: &AuditEngine, paths: &[PathBuf]) -> Result<LoadedRules, RulesError> {
    let mut rule_files = Vec::new();
    for path in paths {
        rule_files.extend(load_rule_files_from_dir(path)?);
    }

    let mut loaded = LoadedRules {
        files: rule_files.len(),
        ..Default::default()
    };

    for (filename, rules) in &rule_files {
        for definition in &rules.filters {
            engine
                .create_filter(definition)
                .map_err(|error| RulesError::FilterCreation {
                    filename: filename.clone(),
                    definition: definition.to_string(),
                    error,
                })?;
            loaded.filters += 1;
        }
    }

    for (filename, rules) in &rule_files {
        for set in &rules.policy {
            engine
                .set_policy(set)
                .map_err(|error| RulesError::PolicyAssignment {
                    filename: filename.clone(),
                    policy: set.to_string(),
                    error,
                })?;
            loaded.policies += 1;
        }
    }

    log::info!(
        "loaded {} filters and {} policy entries from {} rule files",
        loaded.filters,
        loaded.policies,
        loaded.files
    );

    Ok(loaded)
}

fn load_rule_files_from_dir(rules_path: &Path) -> Result<Vec<(String, RuleFile)>, RulesError> {
    let expr = format!("{}/**/*.{}", rules_path.display(), RULE_EXTENSION);
    let mut paths: Vec<PathBuf> = glob(&expr)?.flatten().collect();
    paths.sort();

    if paths.is_empty() {
        log::warn!("no rule files found in {}", rules_path.display());
    }

    paths
        .iter()
        .map(|path| {
            log::debug!("loading rules {}", path.display());
            let filename = path.display().to_string();
            let body = fs::read_to_string(path).map_err(|error| RulesError::RuleLoading {
                name: filename.clone(),
                error,
            })?;
            let rules = serde_yaml::from_str::<RuleFile>(&body).map_err(|error| {
                RulesError::RuleParsing {
                    filename: filename.clone(),
                    error,
                }
            })?;
            Ok((filename, rules))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use audit_filter::{CapturedArguments, fs::MemoryFileSystem};
    use vigil_core::{Actions, EventClass};

    use super::*;

    fn engine() -> AuditEngine {
        AuditEngine::new(Box::new(CapturedArguments), Box::new(MemoryFileSystem::new()))
    }

    fn write(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }

    #[test]
    fn load_across_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "00-base.yaml",
            "filters:\n  - { id: 1, op: prefix, path: /etc }\n",
        );
        write(
            dir.path(),
            "nested/10-open.yaml",
            r#"
filters:
  - { id: 2, op: apply, target: call.arg0, predicate: 1, tag: etc }
policy:
  - { class: open, action: none, filter: 2 }
  - { class: exit, action: log }
"#,
        );
        write(dir.path(), "README.md", "not a rule file");

        let engine = engine();
        let loaded = load_rules(&engine, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(
            loaded,
            LoadedRules {
                files: 2,
                filters: 2,
                policies: 2
            }
        );
        let open: EventClass = "open".parse().unwrap();
        assert_eq!(engine.policy(open).filter, Some(2));
        assert_eq!(engine.policy("exit".parse().unwrap()).action, Actions::LOG);
    }

    #[test]
    fn forward_reference_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "rules.yaml",
            "filters:\n  - { id: 2, op: not, inner: 3 }\n  - { id: 3, op: \"true\" }\n",
        );

        let err = load_rules(&engine(), &[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(
            err,
            RulesError::FilterCreation {
                error: FilterError::InvalidReference(3),
                ..
            }
        ));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.yaml", "filters:\n  - { id: 1, op: sometimes }\n");

        let err = load_rules(&engine(), &[dir.path().to_path_buf()]).unwrap_err();
        match err {
            RulesError::RuleParsing { filename, .. } => assert!(filename.ends_with("broken.yaml")),
            other => panic!("unexpected error {other}"),
        }
    }
}
