//! Part Store
//!
//! A package is a set of key-addressed parts (byte streams with a content
//! type) plus typed relationships from one part to another. Part names are
//! absolute URIs such as `/circuitdiagram/Document.xml`; relationships whose
//! source is [`ROOT`] belong to the package itself.

pub mod dir;
pub mod memory;

pub use memory::MemoryPackage;

use thiserror::Error;

use crate::xml::XmlError;

/// Source URI of package-level relationships
pub const ROOT: &str = "/";

/// Errors raised by part stores
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Part already exists: {0}")]
    PartExists(String),

    #[error("Part not found: {0}")]
    MissingPart(String),

    #[error("Invalid part name: {0}")]
    InvalidPartName(String),

    #[error("Malformed package part: {0}")]
    Xml(#[from] XmlError),

    #[error("Invalid package: {0}")]
    Format(String),
}

/// A typed link from a source part to a target part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub source: String,
    pub target: String,
    pub rel_type: String,
}

/// Key-addressed store of parts and relationships
pub trait PartStore {
    fn contains_part(&self, uri: &str) -> bool;

    /// Create a new part. Fails when `uri` is already taken.
    fn write_part(
        &mut self,
        uri: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<(), PackageError>;

    fn read_part(&self, uri: &str) -> Result<Vec<u8>, PackageError>;

    fn content_type(&self, uri: &str) -> Option<String>;

    /// Add a relationship and return its identifier (`rId1`, `rId2`, ... per source).
    fn add_relationship(
        &mut self,
        source: &str,
        target: &str,
        rel_type: &str,
    ) -> Result<String, PackageError>;

    /// Relationships of a source part, in creation order.
    fn relationships(&self, source: &str) -> Vec<Relationship>;

    /// First relationship of `source` with the given type.
    fn relationship_by_type(&self, source: &str, rel_type: &str) -> Option<Relationship> {
        self.relationships(source)
            .into_iter()
            .find(|r| r.rel_type == rel_type)
    }

    fn relationship_by_id(&self, source: &str, id: &str) -> Option<Relationship> {
        self.relationships(source).into_iter().find(|r| r.id == id)
    }
}

/// Check that a part name is absolute and free of empty or relative segments.
pub fn validate_part_name(uri: &str) -> Result<(), PackageError> {
    let valid = uri.len() > 1
        && uri.starts_with('/')
        && !uri.ends_with('/')
        && uri[1..]
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if valid {
        Ok(())
    } else {
        Err(PackageError::InvalidPartName(uri.to_string()))
    }
}

/// Make `file_name` usable as one segment of a part name. Characters other
/// than ASCII alphanumerics, `-`, `_` and `.` become underscores; a name left
/// empty or made only of dots becomes `_`.
pub fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Pick a free part name in `dir` for `file_name`, sanitizing it with
/// [`sanitize_file_name`] and appending an increasing integer before the
/// extension on collision (`Cell.cdcom`, `Cell1.cdcom`, `Cell2.cdcom`, ...).
pub fn unique_part_name(store: &dyn PartStore, dir: &str, file_name: &str) -> String {
    let file_name = sanitize_file_name(file_name);
    let (stem, ext) = match file_name.rfind('.') {
        Some(i) if i > 0 => (&file_name[..i], &file_name[i..]),
        _ => (file_name.as_str(), ""),
    };
    let dir = dir.trim_end_matches('/');

    let mut candidate = format!("{}/{}{}", dir, stem, ext);
    let mut suffix = 1;
    while store.contains_part(&candidate) {
        candidate = format!("{}/{}{}{}", dir, stem, suffix, ext);
        suffix += 1;
    }
    candidate
}
