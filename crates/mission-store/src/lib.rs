pub mod approvals;
pub mod console;
pub mod documents;
pub mod seed;
pub mod settings;
pub mod tasks;

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use mission_core::{ApprovalItem, ChatMessage, Record, Task, now_epoch_ms};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

pub use approvals::{NewApproval, ResolveOutcome};
pub use console::ChatDraft;
pub use documents::{DocumentError, DocumentLibrary};
pub use settings::{ExternalAgent, ExternalModel, MergedSettings, merge_settings, read_external_config};
pub use tasks::{NewTask, TaskPatch};

/// Raw document storage: one named blob per resource.
pub trait DocumentBackend: Send + Sync {
    /// `Ok(None)` when the document has never been written.
    fn load(&self, name: &str) -> Result<Option<String>>;
    fn save(&self, name: &str, raw: &str) -> Result<()>;
}

/// One JSON file per document under the workspace root.
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create workspace {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl DocumentBackend for FsBackend {
    fn load(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_of(name);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn save(&self, name: &str, raw: &str) -> Result<()> {
        let path = self.path_of(name);
        // Write-then-rename so a crash never leaves a half-written document.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .with_context(|| format!("failed to stage {}", path.display()))?;
        tmp.write_all(raw.as_bytes())?;
        tmp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err.error))?;
        Ok(())
    }
}

/// Keeps documents in process memory. Stands in for browser local storage
/// when exercising handlers without a workspace.
#[derive(Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plants a raw (possibly malformed) document.
    pub fn insert_raw(&self, name: &str, raw: &str) {
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(name.to_string(), raw.to_string());
        }
    }
}

impl DocumentBackend for MemoryBackend {
    fn load(&self, name: &str) -> Result<Option<String>> {
        let docs = self
            .docs
            .lock()
            .map_err(|_| anyhow!("memory backend poisoned"))?;
        Ok(docs.get(name).cloned())
    }

    fn save(&self, name: &str, raw: &str) -> Result<()> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| anyhow!("memory backend poisoned"))?;
        docs.insert(name.to_string(), raw.to_string());
        Ok(())
    }
}

/// A collection stored as one JSON array document.
pub trait Resource {
    type Item: Record + Serialize + DeserializeOwned;
    const DOCUMENT: &'static str;

    fn seed(_demo: bool) -> Vec<Self::Item> {
        Vec::new()
    }
}

pub struct Tasks;
pub struct Approvals;
pub struct ConsoleHistory;

impl Resource for Tasks {
    type Item = Task;
    const DOCUMENT: &'static str = "kanban_tasks.json";

    fn seed(demo: bool) -> Vec<Task> {
        if demo { seed::demo_tasks() } else { Vec::new() }
    }
}

impl Resource for Approvals {
    type Item = ApprovalItem;
    const DOCUMENT: &'static str = "approvals.json";

    fn seed(demo: bool) -> Vec<ApprovalItem> {
        if demo { seed::demo_approvals() } else { Vec::new() }
    }
}

impl Resource for ConsoleHistory {
    type Item = ChatMessage;
    const DOCUMENT: &'static str = "console_history.json";

    fn seed(demo: bool) -> Vec<ChatMessage> {
        if demo { seed::demo_console() } else { Vec::new() }
    }
}

pub const SETTINGS_DOCUMENT: &str = "mission_settings.json";

/// Flat-file store. Every write persists the full document; concurrent
/// writers race and the last one wins.
#[derive(Clone)]
pub struct FileStore {
    backend: Arc<dyn DocumentBackend>,
    seed_demo: bool,
    history_limit: usize,
}

impl FileStore {
    pub fn open(workspace: &Path) -> Result<Self> {
        Ok(Self::with_backend(Arc::new(FsBackend::new(workspace)?)))
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            seed_demo: false,
            history_limit: console::DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_demo_seed(mut self, seed_demo: bool) -> Self {
        self.seed_demo = seed_demo;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Decodes a document. Absent ⇒ seeded and persisted; malformed ⇒ empty.
    pub(crate) fn load_document<T>(
        &self,
        name: &str,
        seed: impl FnOnce() -> T,
        empty: impl FnOnce() -> T,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let Some(raw) = self.backend.load(name)? else {
            let seeded = seed();
            self.save_document(name, &seeded)?;
            return Ok(seeded);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(document = name, error = %err, "malformed document treated as empty");
                Ok(empty())
            }
        }
    }

    pub(crate) fn save_document<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string_pretty(value)
            .with_context(|| format!("failed to encode {name}"))?;
        self.backend.save(name, &raw)
    }

    pub fn list<R: Resource>(&self) -> Result<Vec<R::Item>> {
        let demo = self.seed_demo;
        self.load_document(R::DOCUMENT, || R::seed(demo), Vec::new)
    }

    pub fn read<R: Resource>(&self, key: &str) -> Result<Option<R::Item>> {
        Ok(self.list::<R>()?.into_iter().find(|item| item.key() == key))
    }

    /// Replaces the record with the same key (refreshing its modification
    /// stamp) or appends it. Returns the record as stored.
    pub fn write<R: Resource>(&self, mut record: R::Item) -> Result<R::Item> {
        let mut items = self.list::<R>()?;
        let now = now_epoch_ms();
        match items.iter_mut().find(|item| item.key() == record.key()) {
            Some(existing) => {
                if let Some(prev) = existing.modified_at_ms() {
                    record.set_modified_at_ms(prev);
                }
                record.touch(now);
                *existing = record.clone();
            }
            None => {
                record.touch(now);
                items.push(record.clone());
            }
        }
        self.save_document(R::DOCUMENT, &items)?;
        Ok(record)
    }

    /// Returns whether a record was removed.
    pub fn remove<R: Resource>(&self, key: &str) -> Result<bool> {
        let items = self.list::<R>()?;
        let before = items.len();
        let remaining: Vec<R::Item> = items.into_iter().filter(|item| item.key() != key).collect();
        if remaining.len() == before {
            return Ok(false);
        }
        self.save_document(R::DOCUMENT, &remaining)?;
        Ok(true)
    }

    pub fn replace_all<R: Resource>(&self, items: &[R::Item]) -> Result<()> {
        self.save_document(R::DOCUMENT, items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mission_core::TaskStatus;

    #[test]
    fn absent_document_is_seeded_and_persisted() {
        let backend = Arc::new(MemoryBackend::new());
        let store = FileStore::with_backend(backend.clone()).with_demo_seed(true);
        let tasks = store.list::<Tasks>().expect("list");
        assert!(!tasks.is_empty());
        let raw = backend.load(Tasks::DOCUMENT).expect("load").expect("persisted");
        assert!(raw.contains("Refactor Auth Module"));
    }

    #[test]
    fn malformed_document_reads_as_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw(Tasks::DOCUMENT, "{ not json");
        let store = FileStore::with_backend(backend);
        assert!(store.list::<Tasks>().expect("list").is_empty());
    }

    #[test]
    fn write_replaces_in_place_and_advances_stamp() {
        let store = FileStore::in_memory();
        let first = store.write::<Tasks>(Task::new("t1", "draft")).expect("write");
        let mut changed = first.clone();
        changed.status = TaskStatus::Review;
        let second = store.write::<Tasks>(changed).expect("rewrite");
        let all = store.list::<Tasks>().expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, TaskStatus::Review);
        assert!(second.updated_at_ms > first.updated_at_ms);
    }

    #[test]
    fn repeated_list_is_stable() {
        let backend = Arc::new(MemoryBackend::new());
        let store = FileStore::with_backend(backend.clone()).with_demo_seed(true);
        let first = store.list::<Tasks>().expect("first");
        let raw = backend.load(Tasks::DOCUMENT).expect("load");
        let second = store.list::<Tasks>().expect("second");
        assert_eq!(first, second);
        assert_eq!(backend.load(Tasks::DOCUMENT).expect("reload"), raw);
    }

    #[test]
    fn remove_filters_record_out() {
        let store = FileStore::in_memory();
        store.write::<Tasks>(Task::new("t1", "a")).expect("write");
        store.write::<Tasks>(Task::new("t2", "b")).expect("write");
        assert!(store.remove::<Tasks>("t1").expect("remove"));
        assert!(!store.remove::<Tasks>("t1").expect("remove again"));
        let ids: Vec<_> = store
            .list::<Tasks>()
            .expect("list")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["t2".to_string()]);
    }
}
