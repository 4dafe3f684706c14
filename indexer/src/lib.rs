/*!
# Trove Indexer

The scheduling core of the trove desktop content indexer.

## Features

- **Cooperative scheduling**: one unit of work per activation, files before
  directories before modules
- **Breadth-first crawling**: directories expand into the queues, never recurse
- **Pluggable modules**: each content source supplies roots, an ignore list
  and extractors
- **Atomic documents**: a document's rows and postings appear together or
  not at all
- **Deferred flushing**: postings are persisted on a timer and counted

## Example

```rust,no_run
use trove_indexer::{IndexerConfig, IndexingService, RunOutcome};
use std::path::PathBuf;

#[tokio::main(flavor = "current_thread")]
async fn main() -> trove_indexer::Result<()> {
    let config = IndexerConfig {
        data_dir: PathBuf::from("/var/cache/trove"),
        ..Default::default()
    };

    let (mut service, _events) = IndexingService::open(&config)?;
    if let RunOutcome::Finished { items_indexed } = service.run().await {
        println!("Indexed {items_indexed} postings");
    }
    service.shutdown();

    Ok(())
}
```
*/

mod config;
mod error;
mod events;
mod files_module;
mod flush;
mod indexer;
mod metadata_indexer;
mod module;
mod ontology;
mod parser;
mod service;
mod store;

pub use config::{FilesModuleConfig, IndexerConfig};
pub use error::{IndexerError, Result};
pub use events::{EventReceiver, EventSender, IndexerEvent};
pub use files_module::FilesModule;
pub use flush::FlushScheduler;
pub use indexer::{Activation, Indexer, QueueLengths};
pub use metadata_indexer::{MetadataIndexer, StagedPostings};
pub use module::{IndexerModule, Metadata, ModuleRegistry, WorkItem, WorkKind};
pub use ontology::{FieldDef, Ontology, ServiceDescriptor};
pub use parser::TermParser;
pub use service::{IndexingService, RunOutcome, drive};
pub use store::{
    DocumentRecord, EventKind, EventRecord, FieldValue, JsonMetadataStore, MetadataStore,
};
