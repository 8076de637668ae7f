use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use mission_common::path_guard::{
    DocumentRoot, PathError, resolve_existing_path_within, resolve_write_path_within,
    split_document_path,
};
use mission_common::validate::{clamp_text, limits};
use mission_core::MemoryFile;
use thiserror::Error;
use walkdir::WalkDir;

const DOCUMENT_EXTENSIONS: [&str; 2] = ["md", "json"];
const PREVIEW_CHARS: usize = 160;
const PREVIEW_READ_BYTES: u64 = 4096;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
    #[error("document exceeds {max} bytes")]
    TooLarge { max: usize },
    #[error("document is not valid UTF-8")]
    NotText,
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Markdown/JSON documents in the workspace root and its `memory/` folder.
#[derive(Debug, Clone)]
pub struct DocumentLibrary {
    workspace: PathBuf,
    memory: PathBuf,
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn preview_of(path: &Path) -> String {
    let Ok(file) = fs::File::open(path) else {
        return String::new();
    };
    let mut head = Vec::new();
    if file.take(PREVIEW_READ_BYTES).read_to_end(&mut head).is_err() {
        return String::new();
    }
    let text = String::from_utf8_lossy(&head);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    clamp_text(&collapsed, PREVIEW_CHARS)
}

impl DocumentLibrary {
    pub fn new(workspace: &Path, memory: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            memory: memory.to_path_buf(),
        }
    }

    fn root_dir(&self, root: DocumentRoot) -> &Path {
        match root {
            DocumentRoot::Workspace => &self.workspace,
            DocumentRoot::Memory => &self.memory,
        }
    }

    /// Non-recursive scan of both roots, newest first.
    pub fn list(&self) -> Result<Vec<MemoryFile>, DocumentError> {
        let mut files = Vec::new();
        for root in [DocumentRoot::Workspace, DocumentRoot::Memory] {
            let dir = self.root_dir(root);
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
                let Ok(entry) = entry else {
                    continue;
                };
                if !entry.file_type().is_file() || !is_document(entry.path()) {
                    continue;
                }
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                let name = entry.file_name().to_string_lossy().to_string();
                let modified: DateTime<Utc> = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                files.push(MemoryFile {
                    path: format!("{}{}", root.url_prefix(), name),
                    preview: preview_of(entry.path()),
                    last_modified: modified.to_rfc3339_opts(SecondsFormat::Secs, true),
                    size: meta.len(),
                    folder: root.as_str().to_string(),
                    name,
                });
            }
        }
        files.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(files)
    }

    pub fn read(&self, raw_path: &str) -> Result<String, DocumentError> {
        let (root, relative) = split_document_path(raw_path)?;
        let path = resolve_existing_path_within(self.root_dir(root), &relative)?;
        if !path.is_file() {
            return Err(PathError::NotFound(path).into());
        }
        let bytes = fs::read(&path).map_err(|source| DocumentError::Io {
            path: path.clone(),
            source,
        })?;
        String::from_utf8(bytes).map_err(|_| DocumentError::NotText)
    }

    pub fn write(&self, raw_path: &str, content: &str) -> Result<(), DocumentError> {
        let (root, relative) = split_document_path(raw_path)?;
        if !is_document(Path::new(&relative)) {
            return Err(DocumentError::UnsupportedType(relative));
        }
        if content.len() > limits::FILE_CONTENT_BYTES {
            return Err(DocumentError::TooLarge {
                max: limits::FILE_CONTENT_BYTES,
            });
        }
        let dir = self.root_dir(root);
        fs::create_dir_all(dir).map_err(|source| DocumentError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = resolve_write_path_within(dir, &relative)?;
        fs::write(&path, content).map_err(|source| DocumentError::Io { path, source })
    }
}
