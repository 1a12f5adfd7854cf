//! # Merge Oracle
//!
//! When the decision engine commits to a merge, the executor hands the local
//! and source contents to an oracle and writes back whatever it returns. The
//! engine does not care how the reconciliation happens; [`MergeOracle`] is
//! the seam, and tests substitute a deterministic implementation.
//!
//! The default oracle posts a chat-completion request to OpenRouter.
//! Credentials and model resolve from three layers, lowest precedence
//! first: a persisted config file in the user's config area, environment
//! variables (`OPENROUTER_API_KEY`, `OPENROUTER_MODEL`,
//! `OPENROUTER_BASE_URL`), then per-task settings from the workflow file.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.5";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = "You are a code synchronization assistant. You will receive two \
     versions of the same file: the TARGET (carrying local modifications) and the SOURCE \
     (the updated upstream version). Produce a single merged file that applies the upstream \
     changes while preserving the intent of the local modifications. Respond with the merged \
     file content only, no commentary and no code fences.";

/// Produces merged content from a local and a source version of a file.
pub trait MergeOracle {
    /// Merge `target` (local, possibly edited) with `source` (upstream).
    /// Returns the merged content, or an error when no usable result was
    /// produced; the caller then leaves the file untouched.
    fn merge(&self, target: &str, source: &str) -> Result<String>;
}

/// Oracle connection settings, as they appear in config layers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl OracleSettings {
    /// Overlay `higher` onto `self`: present fields win.
    fn overlay(mut self, higher: OracleSettings) -> Self {
        if higher.model.is_some() {
            self.model = higher.model;
        }
        if higher.api_key.is_some() {
            self.api_key = higher.api_key;
        }
        if higher.base_url.is_some() {
            self.base_url = higher.base_url;
        }
        self
    }
}

fn settings_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("forge-sync").join("openrouter.json"))
}

fn settings_from_file() -> OracleSettings {
    let Some(path) = settings_file_path() else {
        return OracleSettings::default();
    };
    let Ok(raw) = fs::read_to_string(&path) else {
        return OracleSettings::default();
    };
    match serde_json::from_str(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("ignoring malformed {}: {}", path.display(), e);
            OracleSettings::default()
        }
    }
}

fn settings_from_env() -> OracleSettings {
    OracleSettings {
        model: std::env::var("OPENROUTER_MODEL").ok(),
        api_key: std::env::var("OPENROUTER_API_KEY").ok(),
        base_url: std::env::var("OPENROUTER_BASE_URL").ok(),
    }
}

/// Resolve the effective oracle settings: config file, then environment,
/// then the per-task overrides, later layers winning per field.
pub fn resolve_settings(task: Option<&OracleSettings>) -> OracleSettings {
    let mut settings = settings_from_file().overlay(settings_from_env());
    if let Some(task) = task {
        settings = settings.overlay(task.clone());
    }
    settings
}

/// Build the default oracle from resolved settings, or `None` when no API
/// key is available. Merges then fail file-scoped rather than aborting.
pub fn from_settings(settings: &OracleSettings) -> Option<OpenRouterOracle> {
    let api_key = settings.api_key.clone()?;
    Some(OpenRouterOracle {
        api_key,
        model: settings
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        base_url: settings
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    })
}

/// OpenRouter-backed merge oracle.
pub struct OpenRouterOracle {
    api_key: String,
    model: String,
    base_url: String,
}

impl MergeOracle for OpenRouterOracle {
    fn merge(&self, target: &str, source: &str) -> Result<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "TARGET (local version):\n\n{}\n\nSOURCE (upstream version):\n\n{}",
                        target, source
                    )
                }
            ]
        });

        debug!("requesting merge from {} via {}", self.model, self.base_url);
        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(Error::Generic(format!(
                "merge request failed with {}: {}",
                status, detail
            )));
        }

        let payload: Value = response.json()?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        if content.is_empty() {
            return Err(Error::Generic(
                "merge response contained no content".to_string(),
            ));
        }

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_later_fields_win() {
        let base = OracleSettings {
            model: Some("base-model".to_string()),
            api_key: Some("base-key".to_string()),
            base_url: None,
        };
        let top = OracleSettings {
            model: Some("top-model".to_string()),
            api_key: None,
            base_url: Some("https://example.test".to_string()),
        };

        let merged = base.overlay(top);
        assert_eq!(merged.model.as_deref(), Some("top-model"));
        assert_eq!(merged.api_key.as_deref(), Some("base-key"));
        assert_eq!(merged.base_url.as_deref(), Some("https://example.test"));
    }

    #[test]
    fn test_no_api_key_means_no_oracle() {
        let settings = OracleSettings {
            model: Some("m".to_string()),
            api_key: None,
            base_url: None,
        };
        assert!(from_settings(&settings).is_none());
    }

    #[test]
    fn test_defaults_filled_in() {
        let settings = OracleSettings {
            model: None,
            api_key: Some("sk-test".to_string()),
            base_url: None,
        };
        let oracle = from_settings(&settings).unwrap();
        assert_eq!(oracle.model, DEFAULT_MODEL);
        assert_eq!(oracle.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_settings_parse_camel_case() {
        let settings: OracleSettings = serde_json::from_str(
            r#"{ "apiKey": "sk-x", "model": "m", "baseUrl": "https://b" }"#,
        )
        .unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-x"));
        assert_eq!(settings.base_url.as_deref(), Some("https://b"));
    }
}
