use crate::error::{IndexerError, Result};
use crate::module::Metadata;
use crate::ontology::{FieldDef, ServiceDescriptor};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Kind of an event-log row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Create => "Create",
            EventKind::Update => "Update",
            EventKind::Delete => "Delete",
        };
        f.write_str(name)
    }
}

/// Relational side of the index: documents, their fields and text, and
/// the event log.
///
/// Writes issued between `start_transaction` and `end_transaction` become
/// visible together; `rollback_transaction` discards them. Identifier
/// allocation is not transactional: an identifier is never handed out twice.
pub trait MetadataStore {
    fn new_document_id(&mut self) -> u64;

    fn new_event_id(&mut self) -> u64;

    fn start_transaction(&mut self) -> Result<()>;

    fn end_transaction(&mut self) -> Result<()>;

    fn rollback_transaction(&mut self);

    /// Create the document row. Returns `false` when the row already exists.
    fn create_document(
        &mut self,
        id: u64,
        service: &ServiceDescriptor,
        path: &Path,
        metadata: &Metadata,
    ) -> Result<bool>;

    fn create_event(&mut self, id: u64, document_id: u64, kind: EventKind) -> Result<()>;

    fn increment_stats(&mut self, service: &ServiceDescriptor) -> Result<()>;

    fn set_text(&mut self, document_id: u64, text: &str) -> Result<()>;

    fn set_field(
        &mut self,
        document_id: u64,
        field: &FieldDef,
        raw_value: &str,
        parsed_value: &str,
    ) -> Result<()>;

    /// Make committed rows durable
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub raw: String,
    pub parsed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub service_id: u32,
    pub path: PathBuf,
    pub metadata: Metadata,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub document_id: u64,
    pub kind: EventKind,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    version: u32,
    next_document_id: u64,
    next_event_id: u64,
    documents: BTreeMap<u64, DocumentRecord>,
    events: Vec<EventRecord>,
    stats: BTreeMap<String, u64>,
}

enum StagedWrite {
    Document(u64, DocumentRecord),
    Event(EventRecord),
    Stats(String),
    Text(u64, String),
    Field(u64, String, FieldValue),
}

/// Metadata store kept in memory and saved as a single JSON snapshot
pub struct JsonMetadataStore {
    path: Option<PathBuf>,
    snapshot: StoreSnapshot,
    staged: Option<Vec<StagedWrite>>,
    dirty: bool,
}

impl JsonMetadataStore {
    const CURRENT_VERSION: u32 = 1;

    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            snapshot: StoreSnapshot {
                version: Self::CURRENT_VERSION,
                ..Default::default()
            },
            staged: None,
            dirty: false,
        }
    }

    /// Open the store saved at `path`, starting empty when there is none
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = Self::in_memory();
        store.path = Some(path.to_path_buf());

        if !path.exists() {
            return Ok(store);
        }

        let content = fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
        if snapshot.version != Self::CURRENT_VERSION {
            warn!(
                "Metadata store version mismatch: {} vs {}. Starting empty.",
                snapshot.version,
                Self::CURRENT_VERSION
            );
            return Ok(store);
        }

        store.snapshot = snapshot;
        Ok(store)
    }

    pub fn document(&self, id: u64) -> Option<&DocumentRecord> {
        self.snapshot.documents.get(&id)
    }

    pub fn documents(&self) -> impl Iterator<Item = (u64, &DocumentRecord)> {
        self.snapshot.documents.iter().map(|(id, doc)| (*id, doc))
    }

    /// Committed document stored for `path`, if any
    pub fn document_by_path(&self, path: &Path) -> Option<(u64, &DocumentRecord)> {
        self.documents().find(|(_, doc)| doc.path == path)
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.snapshot.events
    }

    pub fn stats(&self, service: &str) -> u64 {
        self.snapshot.stats.get(service).copied().unwrap_or(0)
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    fn document_exists(&self, id: u64) -> bool {
        self.snapshot.documents.contains_key(&id)
            || self.staged.as_ref().is_some_and(|writes| {
                writes
                    .iter()
                    .any(|w| matches!(w, StagedWrite::Document(staged, _) if *staged == id))
            })
    }

    fn write(&mut self, write: StagedWrite) -> Result<()> {
        if let Some(staged) = self.staged.as_mut() {
            staged.push(write);
            return Ok(());
        }
        self.validate(std::slice::from_ref(&write))?;
        self.apply(write);
        Ok(())
    }

    /// Every text or field write must target a document that is committed
    /// or created earlier in the same batch.
    fn validate(&self, writes: &[StagedWrite]) -> Result<()> {
        let mut created = HashSet::new();
        for write in writes {
            match write {
                StagedWrite::Document(id, _) => {
                    created.insert(*id);
                }
                StagedWrite::Text(id, _) | StagedWrite::Field(id, _, _)
                    if !created.contains(id) && !self.snapshot.documents.contains_key(id) =>
                {
                    return Err(IndexerError::Store(format!("no document with id {id}")));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, write: StagedWrite) {
        match write {
            StagedWrite::Document(id, record) => {
                self.snapshot.documents.insert(id, record);
            }
            StagedWrite::Event(event) => self.snapshot.events.push(event),
            StagedWrite::Stats(service) => {
                *self.snapshot.stats.entry(service).or_default() += 1;
            }
            StagedWrite::Text(id, text) => {
                if let Some(document) = self.snapshot.documents.get_mut(&id) {
                    document.text = Some(text);
                }
            }
            StagedWrite::Field(id, name, value) => {
                if let Some(document) = self.snapshot.documents.get_mut(&id) {
                    document.fields.insert(name, value);
                }
            }
        }
        self.dirty = true;
    }

    fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec(&self.snapshot)?;
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        debug!(
            "Saved {} documents to {}",
            self.snapshot.documents.len(),
            path.display()
        );
        self.dirty = false;
        Ok(())
    }
}

impl MetadataStore for JsonMetadataStore {
    fn new_document_id(&mut self) -> u64 {
        self.snapshot.next_document_id += 1;
        self.dirty = true;
        self.snapshot.next_document_id
    }

    fn new_event_id(&mut self) -> u64 {
        self.snapshot.next_event_id += 1;
        self.dirty = true;
        self.snapshot.next_event_id
    }

    fn start_transaction(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(IndexerError::Store(
                "transaction already in progress".to_string(),
            ));
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        let writes = self
            .staged
            .take()
            .ok_or_else(|| IndexerError::Store("no transaction in progress".to_string()))?;
        // A rejected batch is dropped whole; nothing reaches the snapshot.
        self.validate(&writes)?;
        for write in writes {
            self.apply(write);
        }
        Ok(())
    }

    fn rollback_transaction(&mut self) {
        if let Some(writes) = self.staged.take() {
            debug!("Rolled back {} staged writes", writes.len());
        }
    }

    fn create_document(
        &mut self,
        id: u64,
        service: &ServiceDescriptor,
        path: &Path,
        metadata: &Metadata,
    ) -> Result<bool> {
        if self.document_exists(id) {
            return Ok(false);
        }
        self.write(StagedWrite::Document(
            id,
            DocumentRecord {
                service_id: service.id,
                path: path.to_path_buf(),
                metadata: metadata.clone(),
                fields: BTreeMap::new(),
                text: None,
            },
        ))?;
        Ok(true)
    }

    fn create_event(&mut self, id: u64, document_id: u64, kind: EventKind) -> Result<()> {
        self.write(StagedWrite::Event(EventRecord {
            id,
            document_id,
            kind,
        }))
    }

    fn increment_stats(&mut self, service: &ServiceDescriptor) -> Result<()> {
        self.write(StagedWrite::Stats(service.name.clone()))
    }

    fn set_text(&mut self, document_id: u64, text: &str) -> Result<()> {
        if !self.document_exists(document_id) {
            return Err(IndexerError::Store(format!(
                "no document with id {document_id}"
            )));
        }
        self.write(StagedWrite::Text(document_id, text.to_string()))
    }

    fn set_field(
        &mut self,
        document_id: u64,
        field: &FieldDef,
        raw_value: &str,
        parsed_value: &str,
    ) -> Result<()> {
        if !self.document_exists(document_id) {
            return Err(IndexerError::Store(format!(
                "no document with id {document_id}"
            )));
        }
        self.write(StagedWrite::Field(
            document_id,
            field.name.clone(),
            FieldValue {
                raw: raw_value.to_string(),
                parsed: parsed_value.to_string(),
            },
        ))
    }

    fn sync(&mut self) -> Result<()> {
        if self.dirty {
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn files_service() -> ServiceDescriptor {
        ServiceDescriptor {
            id: 1,
            name: "files".to_string(),
        }
    }

    fn write_document(store: &mut JsonMetadataStore, path: &str) -> u64 {
        let id = store.new_document_id();
        let created = store
            .create_document(id, &files_service(), Path::new(path), &Metadata::new())
            .expect("create");
        assert!(created);
        id
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut store = JsonMetadataStore::in_memory();
        assert_eq!(store.new_document_id(), 1);
        assert_eq!(store.new_document_id(), 2);
        assert_eq!(store.new_event_id(), 1);
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let mut store = JsonMetadataStore::in_memory();
        store.start_transaction().expect("start");
        let id = write_document(&mut store, "/docs/a.txt");
        let eid = store.new_event_id();
        store.create_event(eid, id, EventKind::Create).expect("event");
        store.increment_stats(&files_service()).expect("stats");
        store.set_text(id, "body").expect("text");
        store
            .set_field(id, &FieldDef::new("File:Name", 5, false, true), "a.txt", "a.txt")
            .expect("field");
        assert!(store.document(id).is_none());

        store.end_transaction().expect("commit");
        let doc = store.document(id).expect("document");
        assert_eq!(doc.text.as_deref(), Some("body"));
        assert_eq!(doc.fields["File:Name"].raw, "a.txt");
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.stats("files"), 1);
    }

    #[test]
    fn test_rollback_discards_staged_writes() {
        let mut store = JsonMetadataStore::in_memory();
        store.start_transaction().expect("start");
        let id = write_document(&mut store, "/docs/b.txt");
        store.increment_stats(&files_service()).expect("stats");
        store.rollback_transaction();

        assert!(store.document(id).is_none());
        assert_eq!(store.stats("files"), 0);
        assert!(!store.in_transaction());
        assert!(store.end_transaction().is_err());
    }

    #[test]
    fn test_rejected_commit_applies_nothing() {
        let mut store = JsonMetadataStore::in_memory();
        store.start_transaction().expect("start");
        let id = write_document(&mut store, "/docs/e.txt");
        store.increment_stats(&files_service()).expect("stats");
        store.set_text(id, "body").expect("text");
        store
            .staged
            .as_mut()
            .expect("staged writes")
            .push(StagedWrite::Text(id + 100, "orphan".to_string()));

        assert!(store.end_transaction().is_err());
        assert!(!store.in_transaction());
        assert!(store.document(id).is_none());
        assert_eq!(store.stats("files"), 0);
        assert!(store.events().is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown_documents() {
        let mut store = JsonMetadataStore::in_memory();
        let id = write_document(&mut store, "/docs/c.txt");

        let again = store
            .create_document(id, &files_service(), Path::new("/docs/c.txt"), &Metadata::new())
            .expect("create");
        assert!(!again);
        assert!(store.set_text(id + 100, "orphan").is_err());
        assert!(store.start_transaction().is_ok());
        assert!(store.start_transaction().is_err());
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("metadata.json");

        let mut store = JsonMetadataStore::open(&path).expect("open");
        let id = write_document(&mut store, "/docs/d.txt");
        store.sync().expect("sync");
        assert!(!path.with_extension("tmp").exists());

        let mut reopened = JsonMetadataStore::open(&path).expect("reopen");
        let (found, _) = reopened
            .document_by_path(Path::new("/docs/d.txt"))
            .expect("document");
        assert_eq!(found, id);
        assert_eq!(reopened.new_document_id(), id + 1);
    }
}
