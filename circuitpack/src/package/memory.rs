//! In-memory part store.
//!
//! Packaging always stages into a [`MemoryPackage`]; nothing reaches disk
//! until the whole run has succeeded (see [`super::dir`]).

use std::collections::BTreeMap;

use super::{validate_part_name, PackageError, PartStore, Relationship};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    content_type: String,
    data: Vec<u8>,
}

/// BTreeMap-backed package; iteration order is by part name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPackage {
    parts: BTreeMap<String, Part>,
    relationships: BTreeMap<String, Vec<Relationship>>,
}

impl MemoryPackage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Part names in sorted order.
    pub fn part_uris(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(|k| k.as_str())
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Borrow a part's bytes without copying.
    pub fn part_data(&self, uri: &str) -> Option<&[u8]> {
        self.parts.get(uri).map(|p| p.data.as_slice())
    }

    /// Sources that own at least one relationship, in sorted order.
    pub fn relationship_sources(&self) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(|(_, rels)| !rels.is_empty())
            .map(|(k, _)| k.as_str())
    }

    /// Insert a relationship with a known id (used when loading a package).
    pub(crate) fn insert_relationship(&mut self, relationship: Relationship) {
        self.relationships
            .entry(relationship.source.clone())
            .or_default()
            .push(relationship);
    }
}

impl PartStore for MemoryPackage {
    fn contains_part(&self, uri: &str) -> bool {
        self.parts.contains_key(uri)
    }

    fn write_part(
        &mut self,
        uri: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<(), PackageError> {
        validate_part_name(uri)?;
        if self.parts.contains_key(uri) {
            return Err(PackageError::PartExists(uri.to_string()));
        }
        tracing::debug!("Writing part {} ({} bytes, {})", uri, data.len(), content_type);
        self.parts.insert(
            uri.to_string(),
            Part {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(())
    }

    fn read_part(&self, uri: &str) -> Result<Vec<u8>, PackageError> {
        self.parts
            .get(uri)
            .map(|p| p.data.clone())
            .ok_or_else(|| PackageError::MissingPart(uri.to_string()))
    }

    fn content_type(&self, uri: &str) -> Option<String> {
        self.parts.get(uri).map(|p| p.content_type.clone())
    }

    fn add_relationship(
        &mut self,
        source: &str,
        target: &str,
        rel_type: &str,
    ) -> Result<String, PackageError> {
        if !self.parts.contains_key(target) {
            return Err(PackageError::MissingPart(target.to_string()));
        }

        let rels = self.relationships.entry(source.to_string()).or_default();
        let mut n = rels.len() + 1;
        let mut id = format!("rId{}", n);
        while rels.iter().any(|r| r.id == id) {
            n += 1;
            id = format!("rId{}", n);
        }

        rels.push(Relationship {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
        });
        Ok(id)
    }

    fn relationships(&self, source: &str) -> Vec<Relationship> {
        self.relationships.get(source).cloned().unwrap_or_default()
    }
}
