use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Safe,
    Moderate,
    Critical,
}

/// Task-type to model routing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub task_type: String,
    pub selected_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_approval: bool,
}

/// The operator-editable settings document. Saved by whole-document replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

impl SettingsDocument {
    pub fn tool(&self, id: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|tool| tool.id == id)
    }

    /// Duplicate ids would make the allow-list ambiguous.
    pub fn duplicate_tool_id(&self) -> Option<&str> {
        self.tools.iter().enumerate().find_map(|(idx, tool)| {
            self.tools[..idx]
                .iter()
                .any(|prev| prev.id == tool.id)
                .then_some(tool.id.as_str())
        })
    }
}

fn route(task_type: &str, selected: &str, fallback: &str) -> ModelConfig {
    ModelConfig {
        task_type: task_type.to_string(),
        selected_model: selected.to_string(),
        fallback_model: Some(fallback.to_string()),
    }
}

fn tool(
    id: &str,
    name: &str,
    description: &str,
    enabled: bool,
    risk_level: RiskLevel,
    requires_approval: bool,
) -> ToolConfig {
    ToolConfig {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        enabled,
        risk_level,
        requires_approval,
    }
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            models: vec![
                route("Strategic Planning", "Claude 3 Opus", "GPT-4"),
                route("Coding Implementation", "Claude 3.5 Sonnet", "CodeLlama 70B"),
                route("Data Research", "Perplexity Online", "Gemini Pro"),
                route("Creative Writing", "Gemini 1.5 Flash", "GPT-3.5"),
            ],
            tools: vec![
                tool("t1", "Web Search", "Access live internet data.", true, RiskLevel::Safe, false),
                tool("t2", "File System Write", "Create and modify local files.", true, RiskLevel::Moderate, false),
                tool("t3", "Git Commit & Push", "Push code to remote repositories.", true, RiskLevel::Moderate, true),
                tool("t4", "Twitter/X Posting", "Post content to social media.", false, RiskLevel::Critical, true),
                tool("t5", "Execute Shell Command", "Run arbitrary shell commands.", false, RiskLevel::Critical, true),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_gate_critical_tools() {
        let doc = SettingsDocument::default();
        assert!(
            doc.tools
                .iter()
                .filter(|t| t.risk_level == RiskLevel::Critical)
                .all(|t| t.requires_approval && !t.enabled)
        );
        assert_eq!(doc.duplicate_tool_id(), None);
    }

    #[test]
    fn duplicate_tool_ids_are_detected() {
        let mut doc = SettingsDocument::default();
        let copy = doc.tools[0].clone();
        doc.tools.push(copy);
        assert_eq!(doc.duplicate_tool_id(), Some("t1"));
    }
}
