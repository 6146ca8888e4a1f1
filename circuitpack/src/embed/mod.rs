//! Description Resolver & Embedder
//!
//! Decides, for every distinct description used by a document, whether its
//! defining resource is embedded in the package, reused from an earlier
//! embedding, or only referenced, and groups the results for the
//! definitions section.

pub mod library;
pub mod resolver;

pub use library::{encode_definition, DescriptionLibrary, FileLibrary, InMemoryLibrary};
pub use resolver::{DescriptionResolver, EmbedPolicy, EmbeddedPart, Resolution};

use uuid::Uuid;

use crate::model::SourceLocation;

/// A description used by the document, as written to the definitions section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Sequential id, unique within one package
    pub internal_id: String,
    /// The description's own id; only set when its resource is in the package
    pub external_id: Option<String>,
    pub name: String,
    pub guid: Option<Uuid>,
    pub implementation_name: Option<String>,
    /// (configuration name, implementation name) for configurations in use
    pub configurations: Vec<(String, String)>,
}

/// Resolved sources sharing a relationship id and implement set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionSourceLocation {
    /// Original source of the first description in the group
    pub source: SourceLocation,
    pub relationship_id: Option<String>,
    pub implement_set: Option<String>,
    pub sources: Vec<ResolvedSource>,
}

impl DescriptionSourceLocation {
    /// Grouping key. The original source is deliberately not part of it.
    pub fn matches(&self, relationship_id: Option<&str>, implement_set: Option<&str>) -> bool {
        self.relationship_id.as_deref() == relationship_id
            && self.implement_set.as_deref() == implement_set
    }
}
