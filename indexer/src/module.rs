use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::files_module::FilesModule;
use crate::store::EventKind;
use log::info;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Field name -> raw value, as extracted by a module
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    File,
    Directory,
}

/// A path waiting in one of the indexer queues, tagged with the module
/// responsible for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub module: Arc<str>,
    pub path: PathBuf,
    pub kind: WorkKind,
    /// Event recorded when the item is committed
    pub event: EventKind,
}

impl WorkItem {
    pub fn new(module: &str, path: impl Into<PathBuf>, kind: WorkKind) -> Self {
        Self {
            module: Arc::from(module),
            path: path.into(),
            kind,
            event: EventKind::Create,
        }
    }

    pub fn with_event(mut self, event: EventKind) -> Self {
        self.event = event;
        self
    }
}

/// A pluggable source of content: where to look, what to skip and how to
/// pull metadata and text out of each item.
///
/// Extraction failures are reported by returning `None`; they never stop
/// the run.
pub trait IndexerModule: Send {
    fn name(&self) -> &str;

    /// Directories crawled when the module is processed
    fn root_paths(&self) -> Vec<PathBuf>;

    /// Directories that must never be queued
    fn ignore_list(&self) -> HashSet<PathBuf>;

    fn new_work_item(&self, path: PathBuf, kind: WorkKind) -> WorkItem {
        WorkItem::new(self.name(), path, kind)
    }

    fn extract_metadata(&mut self, item: &WorkItem) -> Option<Metadata>;

    fn extract_text(&mut self, item: &WorkItem) -> Option<String>;

    /// Advance to the next nested entry of `item` (an archive member, a
    /// message in a mailbox). Returns `true` while `item` must stay queued.
    fn has_more_content(&mut self, _item: &WorkItem) -> bool {
        false
    }
}

/// Registered modules, keyed by name and kept in registration order
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Box<dyn IndexerModule>>,
    order: Vec<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the built-in module for every name in `config.index_modules`
    pub fn from_config(config: &IndexerConfig) -> Result<Self> {
        let mut registry = Self::new();
        for name in &config.index_modules {
            let module: Box<dyn IndexerModule> = match name.as_str() {
                FilesModule::NAME => Box::new(FilesModule::new(config.files.clone())),
                other => return Err(IndexerError::ModuleLoadFailed(other.to_string())),
            };
            registry.register(module);
        }
        Ok(registry)
    }

    /// Register a module, replacing any module with the same name
    pub fn register(&mut self, module: Box<dyn IndexerModule>) {
        let name = module.name().to_string();
        info!("Registering module '{name}'");
        if self.modules.insert(name.clone(), module).is_none() {
            self.order.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn IndexerModule> {
        self.modules.get(name).map(Box::as_ref)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn IndexerModule + 'static)> {
        self.modules.get_mut(name).map(Box::as_mut)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct NamedModule(&'static str);

    impl IndexerModule for NamedModule {
        fn name(&self) -> &str {
            self.0
        }

        fn root_paths(&self) -> Vec<PathBuf> {
            Vec::new()
        }

        fn ignore_list(&self) -> HashSet<PathBuf> {
            HashSet::new()
        }

        fn extract_metadata(&mut self, _item: &WorkItem) -> Option<Metadata> {
            None
        }

        fn extract_text(&mut self, _item: &WorkItem) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_registration_order_and_replacement() {
        let mut registry = ModuleRegistry::new();
        registry.register(Box::new(NamedModule("mail")));
        registry.register(Box::new(NamedModule("files")));
        registry.register(Box::new(NamedModule("mail")));

        assert_eq!(registry.names(), ["mail".to_string(), "files".to_string()]);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("files"));
        assert!(registry.get("apps").is_none());
    }

    #[test]
    fn test_new_work_item_tags_module() {
        let module = NamedModule("mail");
        let item = module.new_work_item(PathBuf::from("/var/mail/inbox"), WorkKind::File);
        assert_eq!(item, WorkItem::new("mail", "/var/mail/inbox", WorkKind::File));
    }

    #[test]
    fn test_from_config_rejects_unknown_module() {
        let mut config = IndexerConfig::default();
        config.index_modules = vec!["files".to_string(), "evolution".to_string()];

        match ModuleRegistry::from_config(&config) {
            Err(IndexerError::ModuleLoadFailed(name)) => assert_eq!(name, "evolution"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("unknown module was loaded"),
        }
    }

    #[test]
    fn test_from_config_loads_files_module() {
        let registry = ModuleRegistry::from_config(&IndexerConfig::default()).expect("load");
        assert_eq!(registry.names(), ["files".to_string()]);
    }
}
