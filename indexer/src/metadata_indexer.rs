use crate::error::Result;
use crate::module::Metadata;
use crate::ontology::{Ontology, ServiceDescriptor};
use crate::parser::TermParser;
use crate::store::MetadataStore;
use log::debug;
use trove_index::IndexStore;

#[derive(Debug, Clone, PartialEq, Eq)]
struct StagedPosting {
    term: String,
    document_id: u64,
    service_id: u32,
    weight: u32,
}

/// Postings produced for one document, held back until its transaction commits
#[derive(Debug, Default)]
pub struct StagedPostings {
    postings: Vec<StagedPosting>,
}

impl StagedPostings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, term: &str, document_id: u64, service_id: u32, weight: u32) {
        self.postings.push(StagedPosting {
            term: term.to_string(),
            document_id,
            service_id,
            weight,
        });
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Hand every staged posting to `index`, returning how many were added
    pub fn apply<I: IndexStore>(self, index: &mut I) -> usize {
        let count = self.postings.len();
        for posting in self.postings {
            index.add(
                &posting.term,
                posting.document_id,
                posting.service_id,
                posting.weight,
            );
        }
        count
    }
}

/// Tokenizes a document's metadata into postings and field rows
pub struct MetadataIndexer<'a> {
    ontology: &'a Ontology,
    parser: &'a TermParser,
}

impl<'a> MetadataIndexer<'a> {
    pub fn new(ontology: &'a Ontology, parser: &'a TermParser) -> Self {
        Self { ontology, parser }
    }

    /// Stage the postings of every non-empty, known field of `metadata` and
    /// write its raw and parsed values to `store`. Must run inside the
    /// document's transaction; an error leaves `postings` to be discarded.
    pub fn index_metadata<S: MetadataStore>(
        &self,
        document_id: u64,
        service: &ServiceDescriptor,
        metadata: &Metadata,
        store: &mut S,
        postings: &mut StagedPostings,
    ) -> Result<()> {
        for (name, value) in metadata {
            if value.trim().is_empty() {
                continue;
            }

            let Some(field) = self.ontology.resolve_field(name) else {
                debug!("Skipping unknown field '{name}' of document {document_id}");
                continue;
            };

            let terms = self.parser.parse(value, field);
            for term in &terms {
                postings.stage(term, document_id, service.id, field.weight);
            }

            store.set_field(document_id, field, value, &terms.join(" "))?;
        }
        Ok(())
    }
}
