use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use mission_core::{ModelConfig, SettingsDocument, ToolConfig};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{FileStore, SETTINGS_DOCUMENT};

const DEFAULT_TIMEOUT_SECONDS: u64 = 3600;
const DEFAULT_MAX_CONCURRENT: u64 = 4;
const DEFAULT_SUBAGENT_MAX_CONCURRENT: u64 = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalModel {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub context_window: u64,
    pub max_tokens: u64,
    pub reasoning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAgent {
    pub id: String,
    pub alias: Option<String>,
    pub primary: bool,
}

/// External tool configuration joined with the operator's settings document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedSettings {
    pub workspace: String,
    pub timeout_seconds: u64,
    pub max_concurrent: u64,
    pub subagent_max_concurrent: u64,
    pub models: Vec<ExternalModel>,
    pub agents: Vec<ExternalAgent>,
    pub primary_model: Option<String>,
    pub routing: Vec<ModelConfig>,
    pub tools: Vec<ToolConfig>,
}

impl FileStore {
    pub fn settings(&self) -> Result<SettingsDocument> {
        self.load_document(SETTINGS_DOCUMENT, SettingsDocument::default, || {
            SettingsDocument {
                models: Vec::new(),
                tools: Vec::new(),
            }
        })
    }

    /// Overwrites the whole settings document.
    pub fn save_settings(&self, doc: &SettingsDocument) -> Result<()> {
        self.save_document(SETTINGS_DOCUMENT, doc)
    }
}

/// Reads the external tool's JSON config. Missing or malformed ⇒ `{}`.
pub fn read_external_config(path: &Path) -> Result<Value> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Value::Object(Map::new())),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "external config is malformed");
            Ok(Value::Object(Map::new()))
        }
    }
}

fn positive_u64(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_u64).filter(|v| *v > 0)
}

pub fn merge_settings(external: &Value, doc: SettingsDocument, default_workspace: &str) -> MergedSettings {
    let defaults = external.pointer("/agents/defaults");
    let primary_model = external
        .pointer("/agents/defaults/model/primary")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut models = Vec::new();
    if let Some(providers) = external.pointer("/models/providers").and_then(Value::as_object) {
        for (provider, pdata) in providers {
            let Some(entries) = pdata.get("models").and_then(Value::as_array) else {
                continue;
            };
            for entry in entries {
                let Some(id) = entry.get("id").and_then(Value::as_str) else {
                    continue;
                };
                models.push(ExternalModel {
                    id: id.to_string(),
                    name: entry
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or(id)
                        .to_string(),
                    provider: provider.clone(),
                    context_window: entry.get("contextWindow").and_then(Value::as_u64).unwrap_or(0),
                    max_tokens: entry.get("maxTokens").and_then(Value::as_u64).unwrap_or(0),
                    reasoning: entry.get("reasoning").and_then(Value::as_bool).unwrap_or(false),
                });
            }
        }
    }

    let mut agents = Vec::new();
    if let Some(entries) = defaults.and_then(|d| d.get("models")).and_then(Value::as_object) {
        for (model_id, mdata) in entries {
            agents.push(ExternalAgent {
                id: model_id.clone(),
                alias: mdata.get("alias").and_then(Value::as_str).map(str::to_string),
                primary: primary_model.as_deref() == Some(model_id.as_str()),
            });
        }
    }

    MergedSettings {
        workspace: defaults
            .and_then(|d| d.get("workspace"))
            .and_then(Value::as_str)
            .unwrap_or(default_workspace)
            .to_string(),
        timeout_seconds: positive_u64(defaults.and_then(|d| d.get("timeoutSeconds")))
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        max_concurrent: positive_u64(defaults.and_then(|d| d.get("maxConcurrent")))
            .unwrap_or(DEFAULT_MAX_CONCURRENT),
        subagent_max_concurrent: positive_u64(
            defaults.and_then(|d| d.pointer("/subagents/maxConcurrent")),
        )
        .unwrap_or(DEFAULT_SUBAGENT_MAX_CONCURRENT),
        models,
        agents,
        primary_model,
        routing: doc.models,
        tools: doc.tools,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn merge_reads_providers_and_agent_defaults() {
        let external = json!({
            "models": {"providers": {
                "ollama": {"models": [{"id": "llama3.2", "contextWindow": 8192}]},
                "nvidia-nim": {"models": [{"id": "nemotron", "name": "Nemotron", "reasoning": true}]}
            }},
            "agents": {"defaults": {
                "workspace": "/srv/ws",
                "maxConcurrent": 2,
                "subagents": {"maxConcurrent": 3},
                "model": {"primary": "ollama/llama3.2"},
                "models": {"ollama/llama3.2": {"alias": "local"}, "nvidia-nim/nemotron": {}}
            }}
        });
        let merged = merge_settings(&external, SettingsDocument::default(), "/default");
        assert_eq!(merged.workspace, "/srv/ws");
        assert_eq!(merged.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert_eq!(merged.max_concurrent, 2);
        assert_eq!(merged.subagent_max_concurrent, 3);
        assert_eq!(merged.models.len(), 2);
        let llama = merged.models.iter().find(|m| m.id == "llama3.2").expect("llama");
        assert_eq!(llama.name, "llama3.2");
        assert_eq!(llama.context_window, 8192);
        let primary: Vec<_> = merged.agents.iter().filter(|a| a.primary).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].alias.as_deref(), Some("local"));
        assert_eq!(merged.tools.len(), SettingsDocument::default().tools.len());
    }

    #[test]
    fn empty_external_config_uses_defaults() {
        let merged = merge_settings(&json!({}), SettingsDocument::default(), "/default");
        assert_eq!(merged.workspace, "/default");
        assert_eq!(merged.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert!(merged.models.is_empty());
        assert!(merged.primary_model.is_none());
    }

    #[test]
    fn external_config_read_is_lenient() {
        let tmp = tempdir().expect("tempdir");
        let missing = read_external_config(&tmp.path().join("absent.json")).expect("missing");
        assert_eq!(missing, json!({}));
        let bad = tmp.path().join("bad.json");
        std::fs::write(&bad, "{oops").expect("write");
        assert_eq!(read_external_config(&bad).expect("bad"), json!({}));
    }

    #[test]
    fn settings_save_replaces_whole_document() {
        let store = FileStore::in_memory();
        let mut doc = store.settings().expect("seeded");
        assert!(!doc.tools.is_empty());
        doc.tools.truncate(1);
        doc.models.clear();
        store.save_settings(&doc).expect("save");
        let reread = store.settings().expect("reread");
        assert_eq!(reread, doc);
    }
}
