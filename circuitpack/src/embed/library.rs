//! Description libraries.
//!
//! The packager never interprets the description dialect. Everything it needs
//! from the resources a description was loaded from goes through
//! [`DescriptionLibrary`].

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use crate::core::resolve_relative;
use crate::model::{ComponentDescription, Document, SourceLocation};

/// Access to the resources behind component descriptions
pub trait DescriptionLibrary {
    /// Raw bytes of the resource at `location`.
    fn read_source(&self, location: &SourceLocation) -> io::Result<Vec<u8>>;

    /// Ids of every description defined by the resource at `location`.
    fn descriptions_in(&self, location: &SourceLocation) -> Vec<String>;

    /// Whether readers of the package can be expected to have this
    /// description already (drives [`crate::EmbedComponents::Automatic`]).
    fn is_commonly_available(&self, _description: &ComponentDescription) -> bool {
        false
    }

    /// Minimal stand-alone encoding of a single description.
    fn encode_definition(&self, description: &ComponentDescription) -> io::Result<Vec<u8>> {
        encode_definition(description)
    }
}

/// Default single-definition encoding: the description as compact JSON.
pub fn encode_definition(description: &ComponentDescription) -> io::Result<Vec<u8>> {
    serde_json::to_vec(description).map_err(io::Error::from)
}

#[derive(Debug, Clone, Default)]
struct Resource {
    data: Vec<u8>,
    description_ids: Vec<String>,
}

/// Library holding its resources in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLibrary {
    resources: BTreeMap<SourceLocation, Resource>,
    common: BTreeSet<SourceLocation>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource and the ids of the descriptions it defines.
    pub fn add_resource(
        &mut self,
        location: impl Into<String>,
        data: impl Into<Vec<u8>>,
        description_ids: &[&str],
    ) -> &mut Self {
        self.resources.insert(
            SourceLocation::new(location),
            Resource {
                data: data.into(),
                description_ids: description_ids.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// Mark a resource as commonly available.
    pub fn mark_common(&mut self, location: impl Into<String>) -> &mut Self {
        self.common.insert(SourceLocation::new(location));
        self
    }
}

impl DescriptionLibrary for InMemoryLibrary {
    fn read_source(&self, location: &SourceLocation) -> io::Result<Vec<u8>> {
        self.resources
            .get(location)
            .map(|r| r.data.clone())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no resource at {}", location))
            })
    }

    fn descriptions_in(&self, location: &SourceLocation) -> Vec<String> {
        self.resources
            .get(location)
            .map(|r| r.description_ids.clone())
            .unwrap_or_default()
    }

    fn is_commonly_available(&self, description: &ComponentDescription) -> bool {
        description
            .source
            .as_ref()
            .map(|s| self.common.contains(s))
            .unwrap_or(false)
    }
}

/// Library reading resources from files.
///
/// Source locations are file paths, relative locations resolve against the
/// document file. The descriptions a resource defines are taken from the
/// document's description table, which lists every description loaded, used
/// or not.
#[derive(Debug, Clone)]
pub struct FileLibrary {
    anchor: PathBuf,
    contents: BTreeMap<SourceLocation, Vec<String>>,
    common: BTreeSet<SourceLocation>,
}

impl FileLibrary {
    pub fn new(document_path: &Path, document: &Document) -> Self {
        let mut contents: BTreeMap<SourceLocation, Vec<String>> = BTreeMap::new();
        for description in &document.descriptions {
            if let Some(source) = &description.source {
                contents
                    .entry(source.clone())
                    .or_default()
                    .push(description.id.clone());
            }
        }
        Self {
            anchor: document_path.to_path_buf(),
            contents,
            common: BTreeSet::new(),
        }
    }

    pub fn with_common_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.common
            .extend(sources.into_iter().map(|s| SourceLocation::new(s)));
        self
    }

    pub fn path_of(&self, location: &SourceLocation) -> PathBuf {
        resolve_relative(&self.anchor, location.as_str())
    }
}

impl DescriptionLibrary for FileLibrary {
    fn read_source(&self, location: &SourceLocation) -> io::Result<Vec<u8>> {
        std::fs::read(self.path_of(location))
    }

    fn descriptions_in(&self, location: &SourceLocation) -> Vec<String> {
        self.contents.get(location).cloned().unwrap_or_default()
    }

    fn is_commonly_available(&self, description: &ComponentDescription) -> bool {
        description
            .source
            .as_ref()
            .map(|s| self.common.contains(s))
            .unwrap_or(false)
    }
}
