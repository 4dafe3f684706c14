#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use trove_index::{BucketIndex, BucketRange};
use trove_indexer::{
    Activation, EventKind, EventReceiver, FieldDef, Indexer, IndexerConfig, IndexerError,
    IndexerEvent, IndexerModule, JsonMetadataStore, Metadata, MetadataStore, ModuleRegistry,
    Ontology, ServiceDescriptor, WorkItem,
};

pub const MODULE: &str = "notes";
pub const SERVICE_ID: u32 = 10;

pub type Processed = Arc<Mutex<Vec<PathBuf>>>;

/// Module whose behaviour is scripted per path
#[derive(Default)]
pub struct ScriptedModule {
    pub roots: Vec<PathBuf>,
    pub ignored: HashSet<PathBuf>,
    pub metadata: HashMap<PathBuf, Metadata>,
    pub texts: HashMap<PathBuf, String>,
    pub nested: HashMap<PathBuf, usize>,
    pub processed: Processed,
}

impl ScriptedModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: &Path) -> Self {
        self.roots.push(root.to_path_buf());
        self
    }

    pub fn with_title(mut self, path: &str, title: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("Doc:Title".to_string(), title.to_string());
        self.metadata.insert(PathBuf::from(path), metadata);
        self
    }

    pub fn with_text(mut self, path: &str, text: &str) -> Self {
        self.texts.insert(PathBuf::from(path), text.to_string());
        self
    }

    pub fn processed(&self) -> Processed {
        Arc::clone(&self.processed)
    }
}

impl IndexerModule for ScriptedModule {
    fn name(&self) -> &str {
        MODULE
    }

    fn root_paths(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    fn ignore_list(&self) -> HashSet<PathBuf> {
        self.ignored.clone()
    }

    fn extract_metadata(&mut self, item: &WorkItem) -> Option<Metadata> {
        self.processed
            .lock()
            .expect("Failed to lock processed log")
            .push(item.path.clone());

        if let Some(metadata) = self.metadata.get(&item.path) {
            return Some(metadata.clone());
        }
        let mut metadata = Metadata::new();
        if let Some(name) = item.path.file_name() {
            metadata.insert("File:Name".to_string(), name.to_string_lossy().into_owned());
        }
        Some(metadata)
    }

    fn extract_text(&mut self, item: &WorkItem) -> Option<String> {
        self.texts.get(&item.path).cloned()
    }

    fn has_more_content(&mut self, item: &WorkItem) -> bool {
        match self.nested.get_mut(&item.path) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Store that refuses any text containing "poison"
pub struct PoisonedTextStore {
    pub inner: JsonMetadataStore,
}

impl MetadataStore for PoisonedTextStore {
    fn new_document_id(&mut self) -> u64 {
        self.inner.new_document_id()
    }

    fn new_event_id(&mut self) -> u64 {
        self.inner.new_event_id()
    }

    fn start_transaction(&mut self) -> trove_indexer::Result<()> {
        self.inner.start_transaction()
    }

    fn end_transaction(&mut self) -> trove_indexer::Result<()> {
        self.inner.end_transaction()
    }

    fn rollback_transaction(&mut self) {
        self.inner.rollback_transaction();
    }

    fn create_document(
        &mut self,
        id: u64,
        service: &ServiceDescriptor,
        path: &Path,
        metadata: &Metadata,
    ) -> trove_indexer::Result<bool> {
        self.inner.create_document(id, service, path, metadata)
    }

    fn create_event(
        &mut self,
        id: u64,
        document_id: u64,
        kind: EventKind,
    ) -> trove_indexer::Result<()> {
        self.inner.create_event(id, document_id, kind)
    }

    fn increment_stats(&mut self, service: &ServiceDescriptor) -> trove_indexer::Result<()> {
        self.inner.increment_stats(service)
    }

    fn set_text(&mut self, document_id: u64, text: &str) -> trove_indexer::Result<()> {
        if text.contains("poison") {
            return Err(IndexerError::Store("text rejected".to_string()));
        }
        self.inner.set_text(document_id, text)
    }

    fn set_field(
        &mut self,
        document_id: u64,
        field: &FieldDef,
        raw_value: &str,
        parsed_value: &str,
    ) -> trove_indexer::Result<()> {
        self.inner.set_field(document_id, field, raw_value, parsed_value)
    }

    fn sync(&mut self) -> trove_indexer::Result<()> {
        self.inner.sync()
    }
}

pub fn config(data_dir: &Path) -> IndexerConfig {
    IndexerConfig {
        data_dir: data_dir.to_path_buf(),
        index_modules: vec![MODULE.to_string()],
        flush_interval_secs: 1,
        ..Default::default()
    }
}

pub fn ontology() -> Ontology {
    let mut ontology = Ontology::default();
    ontology.register_service(ServiceDescriptor {
        id: SERVICE_ID,
        name: MODULE.to_string(),
    });
    ontology
}

pub fn open_index(data_dir: &TempDir) -> BucketIndex {
    let range = BucketRange::new(10, 20).expect("Failed to build bucket range");
    BucketIndex::open(&data_dir.path().join("file-index.db"), range)
}

pub fn build_with_store<S: MetadataStore>(
    data_dir: &TempDir,
    module: ScriptedModule,
    store: S,
) -> (Indexer<S, BucketIndex>, EventReceiver) {
    let mut modules = ModuleRegistry::new();
    modules.register(Box::new(module));
    Indexer::new(
        &config(data_dir.path()),
        modules,
        ontology(),
        store,
        open_index(data_dir),
    )
    .expect("Failed to create indexer")
}

pub fn build(
    data_dir: &TempDir,
    module: ScriptedModule,
) -> (Indexer<JsonMetadataStore, BucketIndex>, EventReceiver) {
    let store = JsonMetadataStore::open(&data_dir.path().join("metadata.json"))
        .expect("Failed to open metadata store");
    build_with_store(data_dir, module, store)
}

/// Step until the run finishes or stops, returning every activation
pub fn run_to_end<S: MetadataStore>(indexer: &mut Indexer<S, BucketIndex>) -> Vec<Activation> {
    let mut activations = Vec::new();
    for _ in 0..10_000 {
        let activation = indexer.step();
        activations.push(activation);
        if matches!(activation, Activation::Finished { .. } | Activation::Idle) {
            return activations;
        }
    }
    panic!("indexer did not finish");
}

pub fn drain(events: &mut EventReceiver) -> Vec<IndexerEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

pub fn processed(log: &Processed) -> Vec<PathBuf> {
    log.lock().expect("Failed to lock processed log").clone()
}
