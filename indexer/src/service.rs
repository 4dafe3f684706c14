use crate::config::IndexerConfig;
use crate::error::Result;
use crate::events::EventReceiver;
use crate::indexer::{Activation, Indexer};
use crate::module::ModuleRegistry;
use crate::ontology::Ontology;
use crate::store::{JsonMetadataStore, MetadataStore};
use log::{info, warn};
use std::time::Instant;
use trove_index::{BucketIndex, IndexKind, IndexLifecycleManager, IndexStore};

const METADATA_FILENAME: &str = "metadata.json";

/// How a driven run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every queue drained
    Finished { items_indexed: u64 },
    /// The indexer was not running, or was stopped from outside
    Stopped,
    /// An index outgrew its size ceiling; indexing was stopped
    Halted,
}

/// Run `indexer` until it finishes or stops, yielding to the runtime between
/// activations. The deferred flush is polled before every step, and when
/// `lifecycle` is given every flush is followed by a size check.
pub async fn drive<S, I>(
    indexer: &mut Indexer<S, I>,
    lifecycle: Option<&IndexLifecycleManager>,
) -> RunOutcome
where
    S: MetadataStore,
    I: IndexStore,
{
    loop {
        if indexer.poll_flush(Instant::now()).is_some()
            && lifecycle.is_some_and(IndexLifecycleManager::is_oversized)
        {
            indexer.set_running(false);
            return RunOutcome::Halted;
        }

        match indexer.step() {
            Activation::Idle => return RunOutcome::Stopped,
            Activation::Finished { items_indexed } => {
                if lifecycle.is_some_and(IndexLifecycleManager::is_oversized) {
                    return RunOutcome::Halted;
                }
                return RunOutcome::Finished { items_indexed };
            }
            Activation::File | Activation::Directory | Activation::Module => {}
        }

        tokio::task::yield_now().await;
    }
}

/// An indexer wired to the on-disk indices and metadata of a data directory
pub struct IndexingService {
    indexer: Indexer<JsonMetadataStore, BucketIndex>,
    lifecycle: IndexLifecycleManager,
}

impl IndexingService {
    /// Prepare the data directory and build the indexer with the built-in
    /// modules named in `config`
    pub fn open(config: &IndexerConfig) -> Result<(Self, EventReceiver)> {
        config.validate()?;

        let mut lifecycle = IndexLifecycleManager::new()
            .with_max_file_size(config.max_index_file_size)
            .with_scan_error_policy(config.scan_error_policy());
        let report = lifecycle.init(&config.data_dir, config.min_bucket, config.max_bucket)?;
        if !report.promoted.is_empty() {
            info!("Promoted rebuilt indices: {:?}", report.promoted);
        }

        let index = lifecycle.open_index(IndexKind::Files)?;
        let store = JsonMetadataStore::open(&config.data_dir.join(METADATA_FILENAME))?;
        let modules = ModuleRegistry::from_config(config)?;

        let (indexer, events) =
            Indexer::new(config, modules, Ontology::default(), store, index)?;
        info!("Indexing service ready in {}", config.data_dir.display());

        Ok((Self { indexer, lifecycle }, events))
    }

    pub fn indexer(&self) -> &Indexer<JsonMetadataStore, BucketIndex> {
        &self.indexer
    }

    pub fn indexer_mut(&mut self) -> &mut Indexer<JsonMetadataStore, BucketIndex> {
        &mut self.indexer
    }

    pub fn lifecycle(&self) -> &IndexLifecycleManager {
        &self.lifecycle
    }

    /// Crawl every configured module
    pub async fn run(&mut self) -> RunOutcome {
        if self.lifecycle.is_oversized() {
            warn!("Refusing to start, the index is over its size limit");
            return RunOutcome::Halted;
        }

        self.indexer.process_all_sources();
        self.indexer.set_running(true);
        drive(&mut self.indexer, Some(&self.lifecycle)).await
    }

    /// Persist everything buffered and release the data directory
    pub fn shutdown(&mut self) {
        self.indexer.shutdown();
        self.lifecycle.shutdown();
    }
}
