//! # Workflow File Schema and Parsing
//!
//! A workflow is a JSON document declaring tasks. The engine executes the
//! `"sync"` tasks; any other task kind belongs to the surrounding tooling
//! and is logged and skipped here rather than treated as an error.
//!
//! ```json
//! {
//!   "name": "pull shared docs",
//!   "variables": { "org": "octo" },
//!   "tasks": [
//!     {
//!       "type": "sync",
//!       "name": "docs",
//!       "repos": [
//!         {
//!           "repo": "{{org}}/repo1",
//!           "branch": "main",
//!           "forkRepo": "me/repo1-fork",
//!           "files": [ { "source": "docs", "local": "out" } ]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `{{var}}` references in string fields are substituted in a single pass
//! from the `variables` map. Unknown variables warn and stay intact so a
//! typo surfaces in the output instead of silently vanishing.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use log::warn;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::oracle::OracleSettings;
use crate::tracker::PathMapping;

/// One repository group inside a sync task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoGroup {
    /// Repository full name, `owner/repo`.
    pub repo: String,
    /// Branch to ingest from.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// When true (the default), skip the repo if the tracked commit already
    /// matches the remote tip. When false, always fetch and reconcile.
    #[serde(default = "default_true")]
    pub sync: bool,
    /// Overwrite local files regardless of their state.
    #[serde(default)]
    pub force: bool,
    /// Fork used for contributing back, `owner/repo`.
    #[serde(default)]
    pub fork_repo: Option<String>,
    /// Declared source/local path pairs.
    pub files: Vec<PathMapping>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

/// A sync task: the repo groups to ingest plus optional oracle overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTask {
    #[serde(default)]
    pub name: Option<String>,
    pub repos: Vec<RepoGroup>,
    /// Per-task merge oracle settings; highest precedence in the
    /// file < environment < task resolution chain.
    #[serde(default)]
    pub merge: Option<OracleSettings>,
}

impl SyncTask {
    /// Display label for prompts and logs.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("sync task #{}", index + 1),
        }
    }
}

/// A parsed workflow: the sync tasks, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    pub name: Option<String>,
    pub tasks: Vec<SyncTask>,
}

/// Parse a workflow document from a JSON string.
pub fn parse(raw: &str, origin: &Path) -> Result<Workflow> {
    let doc: Value = serde_json::from_str(raw).map_err(|e| Error::Workflow {
        path: origin.to_path_buf(),
        message: format!("invalid JSON: {}", e),
    })?;

    let variables: HashMap<String, String> = doc
        .get("variables")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let raw_tasks = doc
        .get("tasks")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Workflow {
            path: origin.to_path_buf(),
            message: "missing 'tasks' array".to_string(),
        })?;

    let mut tasks = Vec::new();
    for (index, raw_task) in raw_tasks.iter().enumerate() {
        let kind = raw_task
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if kind != "sync" {
            warn!(
                "skipping task #{} of type '{}' (only sync tasks run here)",
                index + 1,
                if kind.is_empty() { "<none>" } else { kind }
            );
            continue;
        }

        let mut task: SyncTask =
            serde_json::from_value(raw_task.clone()).map_err(|e| Error::Workflow {
                path: origin.to_path_buf(),
                message: format!("sync task #{}: {}", index + 1, e),
            })?;
        substitute_task(&mut task, &variables);

        if task.repos.is_empty() {
            warn!("sync task #{} declares no repos", index + 1);
        }
        tasks.push(task);
    }

    Ok(Workflow {
        name: doc
            .get("name")
            .and_then(Value::as_str)
            .map(|s| substitute(s, &variables)),
        tasks,
    })
}

/// Read and parse a workflow file.
pub fn from_file(path: &Path) -> Result<Workflow> {
    let raw = fs::read_to_string(path).map_err(|e| Error::Workflow {
        path: path.to_path_buf(),
        message: format!("cannot read: {}", e),
    })?;
    parse(&raw, path)
}

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").unwrap())
}

/// One-pass `{{var}}` substitution. Unknown variables warn and are left
/// intact; there is no recursive expansion.
pub fn substitute(text: &str, variables: &HashMap<String, String>) -> String {
    var_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            let key = &caps[1];
            match variables.get(key) {
                Some(value) => value.clone(),
                None => {
                    warn!("unknown workflow variable '{{{{{}}}}}'", key);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

fn substitute_task(task: &mut SyncTask, variables: &HashMap<String, String>) {
    if let Some(name) = &task.name {
        task.name = Some(substitute(name, variables));
    }
    for group in &mut task.repos {
        group.repo = substitute(&group.repo, variables);
        group.branch = substitute(&group.branch, variables);
        if let Some(fork) = &group.fork_repo {
            group.fork_repo = Some(substitute(fork, variables));
        }
        for mapping in &mut group.files {
            mapping.source = substitute(&mapping.source, variables);
            mapping.local = substitute(&mapping.local, variables);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn origin() -> PathBuf {
        PathBuf::from("workflow.json")
    }

    #[test]
    fn test_parse_minimal_sync_task() {
        let raw = r#"{
            "tasks": [
                {
                    "type": "sync",
                    "repos": [
                        { "repo": "octo/repo1", "files": [ { "source": "docs", "local": "out" } ] }
                    ]
                }
            ]
        }"#;

        let workflow = parse(raw, &origin()).unwrap();
        assert_eq!(workflow.tasks.len(), 1);
        let group = &workflow.tasks[0].repos[0];
        assert_eq!(group.repo, "octo/repo1");
        assert_eq!(group.branch, "main");
        assert!(group.sync);
        assert!(!group.force);
        assert_eq!(group.files[0].source, "docs");
    }

    #[test]
    fn test_non_sync_tasks_are_skipped() {
        let raw = r#"{
            "tasks": [
                { "type": "shell", "command": "echo hi" },
                { "type": "sync", "repos": [] },
                { "type": "npm", "script": "build" }
            ]
        }"#;

        let workflow = parse(raw, &origin()).unwrap();
        assert_eq!(workflow.tasks.len(), 1);
    }

    #[test]
    fn test_variable_substitution() {
        let raw = r#"{
            "variables": { "org": "octo", "team": "docs" },
            "tasks": [
                {
                    "type": "sync",
                    "name": "{{team}} pull",
                    "repos": [
                        {
                            "repo": "{{org}}/repo1",
                            "forkRepo": "{{org}}-bot/repo1",
                            "files": [ { "source": "{{team}}", "local": "out/{{team}}" } ]
                        }
                    ]
                }
            ]
        }"#;

        let workflow = parse(raw, &origin()).unwrap();
        let task = &workflow.tasks[0];
        assert_eq!(task.name.as_deref(), Some("docs pull"));
        assert_eq!(task.repos[0].repo, "octo/repo1");
        assert_eq!(task.repos[0].fork_repo.as_deref(), Some("octo-bot/repo1"));
        assert_eq!(task.repos[0].files[0].local, "out/docs");
    }

    #[test]
    fn test_unknown_variable_left_intact() {
        let vars = HashMap::new();
        assert_eq!(substitute("{{missing}}/x", &vars), "{{missing}}/x");
    }

    #[test]
    fn test_no_recursive_expansion() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), "{{b}}".to_string());
        vars.insert("b".to_string(), "deep".to_string());
        // Single pass: the replacement text is not expanded again.
        assert_eq!(substitute("{{a}}", &vars), "{{b}}");
    }

    #[test]
    fn test_invalid_json_is_workflow_error() {
        let err = parse("{nope", &origin()).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_missing_tasks_is_workflow_error() {
        let err = parse(r#"{"name": "x"}"#, &origin()).unwrap_err();
        assert!(err.to_string().contains("'tasks'"));
    }

    #[test]
    fn test_task_label() {
        let raw = r#"{"tasks": [
            { "type": "sync", "name": "named", "repos": [] },
            { "type": "sync", "repos": [] }
        ]}"#;
        let workflow = parse(raw, &origin()).unwrap();
        assert_eq!(workflow.tasks[0].label(0), "named");
        assert_eq!(workflow.tasks[1].label(1), "sync task #2");
    }
}
