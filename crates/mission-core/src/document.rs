use serde::{Deserialize, Serialize};

/// A Markdown or JSON document found by scanning the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryFile {
    pub name: String,
    /// Client-facing path, `/workspace/<name>` or `/memory/<name>`.
    pub path: String,
    pub preview: String,
    pub last_modified: String,
    pub size: u64,
    pub folder: String,
}
