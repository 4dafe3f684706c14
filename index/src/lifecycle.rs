use crate::bucket::{BucketIndex, BucketRange};
use crate::error::{IndexError, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MIN_BUCKET_DEFAULT: u32 = 10;
pub const MAX_BUCKET_DEFAULT: u32 = 20;

/// Size ceiling for a live index file, in bytes
pub const MAX_INDEX_FILE_SIZE: u64 = 2_000_000_000;

/// The word indices kept in a data directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Files,
    Emails,
    FilesUpdate,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [IndexKind::Files, IndexKind::Emails, IndexKind::FilesUpdate];

    /// Canonical filename of the live index
    pub fn filename(self) -> &'static str {
        match self {
            IndexKind::Files => "file-index.db",
            IndexKind::Emails => "email-index.db",
            IndexKind::FilesUpdate => "file-update-index.db",
        }
    }

    /// Filename of a rebuilt index awaiting promotion. The update index is
    /// never rebuilt offline, so it has none.
    pub fn final_filename(self) -> Option<&'static str> {
        match self {
            IndexKind::Files => Some("file-index-final"),
            IndexKind::Emails => Some("email-index-final"),
            IndexKind::FilesUpdate => None,
        }
    }

    /// Prefix of the temporary files a merge leaves behind while it runs
    pub fn merge_prefix(self) -> &'static str {
        match self {
            IndexKind::Files => "file-index.tmp.",
            IndexKind::Emails => "email-index.tmp.",
            IndexKind::FilesUpdate => "file-update-index.tmp.",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Files => "File",
            IndexKind::Emails => "Email",
            IndexKind::FilesUpdate => "File update",
        };
        f.write_str(name)
    }
}

/// Path of the live index of `kind` inside `data_dir`
pub fn filename_for(kind: IndexKind, data_dir: &Path) -> PathBuf {
    data_dir.join(kind.filename())
}

/// Scan `data_dir` for leftover merge files of `kind`.
pub fn scan_pending_merge_files(kind: IndexKind, data_dir: &Path) -> io::Result<bool> {
    let prefix = kind.merge_prefix();
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether an interrupted merge left temporary files for `kind` behind.
/// Scan errors are reported and treated as "none found".
pub fn has_pending_merge_files(kind: IndexKind, data_dir: &Path) -> bool {
    ScanErrorPolicy::AssumeNone.resolve(kind, data_dir)
}

/// What to conclude when the data directory cannot be scanned for merge files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanErrorPolicy {
    /// Report the error and carry on as if no merge files exist
    #[default]
    AssumeNone,
    /// Report the error and treat the merge as still pending, blocking promotion
    AssumePending,
}

impl ScanErrorPolicy {
    fn resolve(self, kind: IndexKind, data_dir: &Path) -> bool {
        match scan_pending_merge_files(kind, data_dir) {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    "Could not check for temporary index files in directory '{}': {err}",
                    data_dir.display()
                );
                self == ScanErrorPolicy::AssumePending
            }
        }
    }
}

/// What `init` did to each promotable index
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// Final files renamed over their live index
    pub promoted: Vec<IndexKind>,
    /// Final files left alone because merge files are still around
    pub blocked: Vec<IndexKind>,
}

#[derive(Debug)]
struct ManagerState {
    data_dir: PathBuf,
    buckets: BucketRange,
}

/// Owns the naming, size policy and promotion of the index files in one
/// data directory.
#[derive(Debug)]
pub struct IndexLifecycleManager {
    state: Option<ManagerState>,
    max_file_size: u64,
    scan_error_policy: ScanErrorPolicy,
}

impl Default for IndexLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexLifecycleManager {
    pub fn new() -> Self {
        Self {
            state: None,
            max_file_size: MAX_INDEX_FILE_SIZE,
            scan_error_policy: ScanErrorPolicy::default(),
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn with_scan_error_policy(mut self, policy: ScanErrorPolicy) -> Self {
        self.scan_error_policy = policy;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.state.as_ref().map(|s| s.data_dir.as_path())
    }

    /// Bind the manager to `data_dir` and promote any rebuilt index whose
    /// merge has completed. Calling it again while initialized does nothing.
    pub fn init(&mut self, data_dir: &Path, min_bucket: u32, max_bucket: u32) -> Result<InitReport> {
        if self.state.is_some() {
            return Ok(InitReport::default());
        }

        let buckets = BucketRange::new(min_bucket, max_bucket)?;
        fs::create_dir_all(data_dir)?;

        self.state = Some(ManagerState {
            data_dir: data_dir.to_path_buf(),
            buckets,
        });

        let mut report = InitReport::default();
        for kind in IndexKind::ALL {
            let Some(final_name) = kind.final_filename() else {
                continue;
            };
            let final_path = data_dir.join(final_name);
            if !final_path.exists() {
                continue;
            }

            if self.scan_error_policy.resolve(kind, data_dir) {
                warn!(
                    "Not promoting '{}': temporary merge files are still present",
                    final_path.display()
                );
                report.blocked.push(kind);
                continue;
            }

            let live_path = filename_for(kind, data_dir);
            info!(
                "Overwriting '{}' with '{}'",
                live_path.display(),
                final_path.display()
            );
            match fs::rename(&final_path, &live_path) {
                Ok(()) => report.promoted.push(kind),
                Err(err) => warn!(
                    "Could not promote '{}' over '{}': {err}",
                    final_path.display(),
                    live_path.display()
                ),
            }
        }

        Ok(report)
    }

    /// Path of the live index of `kind`
    pub fn filename(&self, kind: IndexKind) -> Result<PathBuf> {
        let state = self.state.as_ref().ok_or(IndexError::NotInitialized)?;
        Ok(filename_for(kind, &state.data_dir))
    }

    /// Whether a merge of `kind` was interrupted, under this manager's scan policy
    pub fn has_pending_merge_files(&self, kind: IndexKind) -> Result<bool> {
        let state = self.state.as_ref().ok_or(IndexError::NotInitialized)?;
        Ok(self.scan_error_policy.resolve(kind, &state.data_dir))
    }

    /// Open the live index of `kind` with the configured bucket range
    pub fn open_index(&self, kind: IndexKind) -> Result<BucketIndex> {
        let state = self.state.as_ref().ok_or(IndexError::NotInitialized)?;
        Ok(BucketIndex::open(
            &filename_for(kind, &state.data_dir),
            state.buckets,
        ))
    }

    /// True when the file or email index has outgrown the size ceiling and
    /// indexing must stop.
    pub fn is_oversized(&self) -> bool {
        let Some(state) = self.state.as_ref() else {
            return false;
        };

        for kind in [IndexKind::Files, IndexKind::Emails] {
            let path = filename_for(kind, &state.data_dir);
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if size > self.max_file_size {
                error!("{kind} index database is too big, discontinuing indexing");
                return true;
            }
        }
        false
    }

    pub fn shutdown(&mut self) {
        if self.state.take().is_some() {
            info!("Index manager shut down");
        }
    }
}
