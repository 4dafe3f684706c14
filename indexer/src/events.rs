use std::path::PathBuf;
use tokio::sync::mpsc;

/// Notifications published by the indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerEvent {
    /// Every queue drained; carries the postings flushed during the run
    Finished { items_indexed: u64 },
    /// A module finished queueing its roots
    IndexUpdated,
    /// The scheduling slot was armed or disarmed
    RunningChanged(bool),
    /// A directory matched its module's ignore list and was dropped
    Ignored { path: PathBuf },
}

pub type EventSender = mpsc::UnboundedSender<IndexerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<IndexerEvent>;

pub(crate) fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
