use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a metadata field is tokenized and how much its terms weigh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub weight: u32,
    /// Drop stop words and terms outside the configured length bounds
    pub filtered: bool,
    /// Split on word boundaries rather than whitespace only
    pub delimited: bool,
}

impl FieldDef {
    pub fn new(name: &str, weight: u32, filtered: bool, delimited: bool) -> Self {
        Self {
            name: name.to_string(),
            weight,
            filtered,
            delimited,
        }
    }
}

/// A class of indexed documents; one per module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: u32,
    pub name: String,
}

/// Field and service registry
#[derive(Debug, Clone)]
pub struct Ontology {
    fields: HashMap<String, FieldDef>,
    services: HashMap<String, ServiceDescriptor>,
}

impl Default for Ontology {
    fn default() -> Self {
        let mut ontology = Self::empty();

        for field in [
            FieldDef::new("File:Name", 5, false, true),
            FieldDef::new("File:Path", 1, false, true),
            FieldDef::new("File:Ext", 5, false, false),
            FieldDef::new("File:Mime", 3, false, false),
            FieldDef::new("File:Size", 0, false, false),
            FieldDef::new("File:Modified", 0, false, false),
            FieldDef::new("Doc:Title", 10, true, true),
            FieldDef::new("Doc:Subject", 8, true, true),
            FieldDef::new("Doc:Author", 5, false, true),
            FieldDef::new("Doc:Keywords", 10, false, true),
            FieldDef::new("Email:Sender", 5, false, true),
            FieldDef::new("Email:Subject", 10, true, true),
        ] {
            ontology.register_field(field);
        }

        ontology.register_service(ServiceDescriptor {
            id: 1,
            name: "files".to_string(),
        });
        ontology.register_service(ServiceDescriptor {
            id: 2,
            name: "emails".to_string(),
        });
        ontology.register_service(ServiceDescriptor {
            id: 3,
            name: "applications".to_string(),
        });

        ontology
    }
}

impl Ontology {
    pub fn empty() -> Self {
        Self {
            fields: HashMap::new(),
            services: HashMap::new(),
        }
    }

    pub fn register_field(&mut self, field: FieldDef) {
        self.fields.insert(field.name.clone(), field);
    }

    pub fn register_service(&mut self, service: ServiceDescriptor) {
        self.services.insert(service.name.to_lowercase(), service);
    }

    pub fn resolve_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Service of the module called `source_name`, ignoring case
    pub fn resolve_service(&self, source_name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(&source_name.to_lowercase())
    }
}
