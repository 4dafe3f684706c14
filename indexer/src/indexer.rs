use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::events::{self, EventReceiver, EventSender, IndexerEvent};
use crate::flush::FlushScheduler;
use crate::metadata_indexer::{MetadataIndexer, StagedPostings};
use crate::module::{Metadata, ModuleRegistry, WorkItem, WorkKind};
use crate::ontology::{Ontology, ServiceDescriptor};
use crate::parser::TermParser;
use crate::store::{EventKind, JsonMetadataStore, MetadataStore};
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use trove_index::{BucketIndex, IndexStore};
use walkdir::WalkDir;

/// What a single call to [`Indexer::step`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The scheduling slot is disarmed; nothing was done
    Idle,
    /// Processed the head of the files queue
    File,
    /// Expanded one directory
    Directory,
    /// Queued the roots of one module
    Module,
    /// All queues were empty; the run is complete and the slot disarmed
    Finished { items_indexed: u64 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueLengths {
    pub files: usize,
    pub directories: usize,
    pub modules: usize,
}

#[derive(Debug, Default)]
struct RunTimer {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl RunTimer {
    fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
            self.elapsed = None;
        }
    }

    fn stop(&mut self) -> Duration {
        let elapsed = match self.started.take() {
            Some(started) => started.elapsed(),
            None => Duration::ZERO,
        };
        self.elapsed = Some(elapsed);
        elapsed
    }
}

/// The indexing state machine.
///
/// Work sits in three FIFO queues served in strict priority order: files,
/// then directories, then modules. Each call to [`Indexer::step`] performs
/// exactly one unit of work and returns, so the host decides when the next
/// one runs. Directory expansion appends to the queues instead of
/// recursing, which makes a crawl breadth-first.
pub struct Indexer<S: MetadataStore = JsonMetadataStore, I: IndexStore = BucketIndex> {
    modules: ModuleRegistry,
    ontology: Ontology,
    parser: TermParser,
    store: S,
    index: I,
    files_queue: VecDeque<WorkItem>,
    dirs_queue: VecDeque<WorkItem>,
    modules_queue: VecDeque<String>,
    flush: FlushScheduler,
    running: bool,
    timer: RunTimer,
    events: EventSender,
    shut_down: bool,
}

impl<S: MetadataStore, I: IndexStore> Indexer<S, I> {
    /// Create an idle indexer. Every registered module needs a service in
    /// `ontology`.
    pub fn new(
        config: &IndexerConfig,
        modules: ModuleRegistry,
        ontology: Ontology,
        store: S,
        index: I,
    ) -> Result<(Self, EventReceiver)> {
        config.validate()?;

        if let Some(name) = modules
            .names()
            .iter()
            .find(|name| ontology.resolve_service(name).is_none())
        {
            return Err(IndexerError::UnknownService(name.clone()));
        }

        let (events, receiver) = events::channel();
        let indexer = Self {
            modules,
            ontology,
            parser: TermParser::new(config.min_word_length, config.max_word_length),
            store,
            index,
            files_queue: VecDeque::new(),
            dirs_queue: VecDeque::new(),
            modules_queue: VecDeque::new(),
            flush: FlushScheduler::new(config.flush_interval()),
            running: false,
            timer: RunTimer::default(),
            events,
            shut_down: false,
        };
        Ok((indexer, receiver))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Postings flushed since the indexer was created
    pub fn items_indexed(&self) -> u64 {
        self.flush.items_indexed()
    }

    /// Duration of the last completed run
    pub fn last_run_duration(&self) -> Option<Duration> {
        self.timer.elapsed
    }

    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.flush.deadline()
    }

    pub fn queue_lengths(&self) -> QueueLengths {
        QueueLengths {
            files: self.files_queue.len(),
            directories: self.dirs_queue.len(),
            modules: self.modules_queue.len(),
        }
    }

    pub fn queued_files(&self) -> impl Iterator<Item = &WorkItem> {
        self.files_queue.iter()
    }

    pub fn queued_directories(&self) -> impl Iterator<Item = &WorkItem> {
        self.dirs_queue.iter()
    }

    /// Queue every registered module for a full run
    pub fn process_all_sources(&mut self) {
        self.modules_queue
            .extend(self.modules.names().iter().cloned());
        info!("Queued {} modules for indexing", self.modules.len());
    }

    /// Queue `paths` of `module` for (re)indexing
    pub fn check_files<P: Into<PathBuf>>(
        &mut self,
        module: &str,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<()> {
        self.enqueue_files(module, paths, EventKind::Create, "check")
    }

    /// Queue `paths` of `module`, recording their commit as an update
    pub fn update_files<P: Into<PathBuf>>(
        &mut self,
        module: &str,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<()> {
        self.enqueue_files(module, paths, EventKind::Update, "update")
    }

    /// Queue tombstones for `paths` of `module`
    pub fn delete_files<P: Into<PathBuf>>(
        &mut self,
        module: &str,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<()> {
        self.enqueue_files(module, paths, EventKind::Delete, "delete")
    }

    fn enqueue_files<P: Into<PathBuf>>(
        &mut self,
        module_name: &str,
        paths: impl IntoIterator<Item = P>,
        event: EventKind,
        request: &str,
    ) -> Result<()> {
        let Some(module) = self.modules.get(module_name) else {
            warn!("Request to {request} files for unknown module '{module_name}'");
            return Err(IndexerError::UnknownSource(module_name.to_string()));
        };

        let items: Vec<WorkItem> = paths
            .into_iter()
            .map(|path| {
                module
                    .new_work_item(path.into(), WorkKind::File)
                    .with_event(event)
            })
            .collect();
        info!(
            "Request to {request} {} files for module '{module_name}'",
            items.len()
        );
        self.files_queue.extend(items);
        Ok(())
    }

    /// Arm or disarm the scheduling slot. Returns whether anything changed.
    pub fn set_running(&mut self, should_run: bool) -> bool {
        if self.running == should_run {
            return false;
        }
        self.running = should_run;
        info!(
            "Indexer {}",
            if should_run { "started" } else { "stopped" }
        );
        self.emit(IndexerEvent::RunningChanged(should_run));
        true
    }

    /// Perform one unit of work
    pub fn step(&mut self) -> Activation {
        if !self.running {
            return Activation::Idle;
        }
        self.timer.start();

        if let Some(item) = self.files_queue.pop_front() {
            if !self.process_file(&item) {
                self.files_queue.push_front(item);
            }
            Activation::File
        } else if let Some(item) = self.dirs_queue.pop_front() {
            self.process_directory(&item);
            Activation::Directory
        } else if let Some(name) = self.modules_queue.pop_front() {
            self.process_module(&name);
            self.emit(IndexerEvent::IndexUpdated);
            Activation::Module
        } else {
            self.finish()
        }
    }

    /// Fire the deferred flush if it is due, returning the postings flushed
    pub fn poll_flush(&mut self, now: Instant) -> Option<u64> {
        let flushed = self.flush.poll(now, &mut self.index)?;
        self.sync_store();
        Some(flushed)
    }

    /// Flush buffered postings and committed metadata right away
    pub fn flush_now(&mut self) -> u64 {
        let flushed = self.flush.flush_now(&mut self.index);
        self.sync_store();
        flushed
    }

    /// Stop the indexer and persist everything still buffered. Safe to call
    /// more than once; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.set_running(false);
        let armed = self.flush.cancel();
        if armed || self.index.pending() > 0 {
            self.flush.flush_now(&mut self.index);
        }
        self.sync_store();
    }

    /// Returns `true` once `item` is fully consumed
    fn process_file(&mut self, item: &WorkItem) -> bool {
        debug!("Processing file: {}", item.path.display());

        let Some(module) = self.modules.get_mut(&item.module) else {
            warn!(
                "No module '{}' for {}, dropping it",
                item.module,
                item.path.display()
            );
            return true;
        };

        let extracted = if item.event == EventKind::Delete {
            Some((Metadata::new(), None))
        } else {
            module.extract_metadata(item).map(|metadata| {
                let text = module.extract_text(item);
                (metadata, text)
            })
        };
        let consumed = !module.has_more_content(item);

        match extracted {
            Some((metadata, text)) => {
                if let Err(e) = self.commit_document(item, &metadata, text.as_deref()) {
                    warn!("Failed to index {}: {e}", item.path.display());
                }
            }
            None => debug!("No metadata for {}", item.path.display()),
        }

        consumed
    }

    fn commit_document(
        &mut self,
        item: &WorkItem,
        metadata: &Metadata,
        text: Option<&str>,
    ) -> Result<()> {
        let service = self
            .ontology
            .resolve_service(&item.module)
            .cloned()
            .ok_or_else(|| IndexerError::UnknownService(item.module.to_string()))?;
        let document_id = self.store.new_document_id();
        let mut postings = StagedPostings::new();

        self.store.start_transaction()?;
        let written = match self.write_document(
            document_id,
            &service,
            item,
            metadata,
            text,
            &mut postings,
        ) {
            Ok(written) => written,
            Err(e) => {
                self.store.rollback_transaction();
                return Err(e);
            }
        };
        if let Err(e) = self.store.end_transaction() {
            self.store.rollback_transaction();
            return Err(e);
        }

        if !written {
            debug!("Document {document_id} already exists, nothing written");
            return Ok(());
        }

        let added = postings.apply(&mut self.index);
        debug!(
            "Committed {} as document {document_id} with {added} postings",
            item.path.display()
        );
        self.flush.schedule(Instant::now());
        Ok(())
    }

    fn write_document(
        &mut self,
        document_id: u64,
        service: &ServiceDescriptor,
        item: &WorkItem,
        metadata: &Metadata,
        text: Option<&str>,
        postings: &mut StagedPostings,
    ) -> Result<bool> {
        if !self
            .store
            .create_document(document_id, service, &item.path, metadata)?
        {
            return Ok(false);
        }

        let event_id = self.store.new_event_id();
        self.store.create_event(event_id, document_id, item.event)?;
        self.store.increment_stats(service)?;

        MetadataIndexer::new(&self.ontology, &self.parser).index_metadata(
            document_id,
            service,
            metadata,
            &mut self.store,
            postings,
        )?;

        if let Some(text) = text {
            self.store.set_text(document_id, text)?;
        }
        Ok(true)
    }

    fn process_directory(&mut self, item: &WorkItem) {
        info!("Processing directory: {}", item.path.display());

        let Some(module) = self.modules.get(&item.module) else {
            warn!(
                "No module '{}' for {}, dropping it",
                item.module,
                item.path.display()
            );
            return;
        };
        let ignored = module.ignore_list();

        let mut files = Vec::new();
        let mut directories = Vec::new();
        for entry in WalkDir::new(&item.path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Could not read {}: {e}", item.path.display());
                    continue;
                }
            };

            let path = entry.path().to_path_buf();
            if entry.file_type().is_dir() {
                directories.push(module.new_work_item(path.clone(), WorkKind::Directory));
            }
            files.push(module.new_work_item(path, WorkKind::File));
        }

        self.files_queue.extend(files);
        for directory in directories {
            self.enqueue_directory(directory, &ignored);
        }
    }

    fn process_module(&mut self, name: &str) {
        let Some(module) = self.modules.get(name) else {
            info!("No module for: '{name}'");
            return;
        };

        info!("Starting module: '{name}'");
        let ignored = module.ignore_list();
        let roots: Vec<WorkItem> = module
            .root_paths()
            .into_iter()
            .map(|path| module.new_work_item(path, WorkKind::Directory))
            .collect();

        for root in roots {
            self.enqueue_directory(root, &ignored);
        }
    }

    fn enqueue_directory(&mut self, item: WorkItem, ignored: &HashSet<PathBuf>) {
        if ignored.contains(&item.path) {
            info!("Ignoring directory: {}", item.path.display());
            self.emit(IndexerEvent::Ignored { path: item.path });
            return;
        }
        self.dirs_queue.push_back(item);
    }

    fn finish(&mut self) -> Activation {
        self.flush.cancel();
        self.flush.flush_now(&mut self.index);
        self.sync_store();

        let elapsed = self.timer.stop();
        let items_indexed = self.flush.items_indexed();
        info!(
            "Indexer finished in {:.4} seconds, {items_indexed} items indexed in total",
            elapsed.as_secs_f64()
        );

        self.emit(IndexerEvent::Finished { items_indexed });
        self.set_running(false);
        Activation::Finished { items_indexed }
    }

    fn sync_store(&mut self) {
        if let Err(e) = self.store.sync() {
            warn!("Failed to persist metadata store: {e}");
        }
    }

    fn emit(&self, event: IndexerEvent) {
        if self.events.send(event).is_err() {
            debug!("Indexer event dropped, no receiver");
        }
    }
}

impl<S: MetadataStore, I: IndexStore> Drop for Indexer<S, I> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
