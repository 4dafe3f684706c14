use crate::config::FilesModuleConfig;
use crate::error::{IndexerError, Result};
use crate::module::{IndexerModule, Metadata, WorkItem};
use log::debug;
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const DIRECTORY_MIME: &str = "inode/directory";

/// Built-in module for plain files on local disks
pub struct FilesModule {
    config: FilesModuleConfig,
}

impl FilesModule {
    pub const NAME: &'static str = "files";

    pub fn new(config: FilesModuleConfig) -> Self {
        Self { config }
    }

    fn mime_type(path: &Path, is_dir: bool) -> String {
        if is_dir {
            return DIRECTORY_MIME.to_string();
        }
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    fn read_text(&self, path: &Path) -> Result<String> {
        let file = fs::File::open(path)?;
        let mut bytes = Vec::new();
        file.take(self.config.max_text_bytes).read_to_end(&mut bytes)?;
        if bytes.contains(&0) {
            return Err(IndexerError::Extraction(format!(
                "{} looks binary",
                path.display()
            )));
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl IndexerModule for FilesModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn root_paths(&self) -> Vec<PathBuf> {
        self.config.roots.clone()
    }

    fn ignore_list(&self) -> HashSet<PathBuf> {
        self.config.ignored_directories.iter().cloned().collect()
    }

    fn extract_metadata(&mut self, item: &WorkItem) -> Option<Metadata> {
        let stat = match fs::symlink_metadata(&item.path) {
            Ok(stat) => stat,
            Err(e) => {
                debug!("Cannot stat {:?}: {}", item.path, e);
                return None;
            }
        };

        let mut metadata = Metadata::new();
        if let Some(name) = item.path.file_name() {
            metadata.insert("File:Name".to_string(), name.to_string_lossy().into_owned());
        }
        if let Some(parent) = item.path.parent() {
            metadata.insert("File:Path".to_string(), parent.to_string_lossy().into_owned());
        }
        if let Some(ext) = item.path.extension() {
            metadata.insert("File:Ext".to_string(), ext.to_string_lossy().to_lowercase());
        }
        metadata.insert("File:Size".to_string(), stat.len().to_string());
        metadata.insert(
            "File:Mime".to_string(),
            Self::mime_type(&item.path, stat.is_dir()),
        );

        let modified = stat
            .modified()
            .ok()
            .and_then(|m| OffsetDateTime::from(m).format(&Rfc3339).ok());
        if let Some(modified) = modified {
            metadata.insert("File:Modified".to_string(), modified);
        }

        Some(metadata)
    }

    fn extract_text(&mut self, item: &WorkItem) -> Option<String> {
        if !item.path.is_file() {
            return None;
        }

        let mime = mime_guess::from_path(&item.path).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::TEXT {
            return None;
        }

        match self.read_text(&item.path) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                debug!("No text for {:?}: {}", item.path, e);
                None
            }
        }
    }
}
