//! Core packaging logic shared by the library API and the CLI.
//!
//! One call to [`CircuitPackCore::package`] is one packaging run: resolve the
//! descriptions, compact the connectivity graph, then write the document part.
//! All counters and accumulators live in values scoped to that call.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::connectivity::{CompactedConnections, ConnectionCompactor};
use crate::embed::{DescriptionLibrary, DescriptionResolver};
use crate::model::{DescriptionRef, Document};
use crate::package::{MemoryPackage, PackageError, PartStore};
use crate::reader::{DocumentReader, LoadedDocument};
use crate::writer::DocumentWriter;
use crate::xml::XmlError;

#[derive(Debug, thiserror::Error)]
pub enum CircuitPackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read description resource {location}: {source}")]
    Resource {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Package error: {0}")]
    Package(#[from] PackageError),
    #[error("Malformed document part: {0}")]
    Xml(#[from] XmlError),
    #[error("Invalid document: {0}")]
    Format(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Which component descriptions get embedded into the package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedComponents {
    /// Embed every description's resource
    All,
    /// Embed descriptions that are not commonly available
    #[default]
    Automatic,
    /// Embed the descriptions listed in `custom_embed_components`
    Custom,
}

impl std::str::FromStr for EmbedComponents {
    type Err = CircuitPackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(EmbedComponents::All),
            "automatic" | "auto" => Ok(EmbedComponents::Automatic),
            "custom" => Ok(EmbedComponents::Custom),
            other => Err(CircuitPackError::Config(format!(
                "unknown embed mode '{}'",
                other
            ))),
        }
    }
}

/// Options for one packaging run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    pub embed_components: EmbedComponents,
    pub custom_embed_components: BTreeSet<DescriptionRef>,
    pub include_layout: bool,
    pub include_connections: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            embed_components: EmbedComponents::Automatic,
            custom_embed_components: BTreeSet::new(),
            include_layout: true,
            include_connections: true,
        }
    }
}

/// Counts describing a finished packaging run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub elements: usize,
    pub definitions: usize,
    pub source_groups: usize,
    pub embedded_parts: Vec<String>,
    pub connection_groups: usize,
}

/// Core packaging API used by both the library and the CLI.
pub struct CircuitPackCore;

impl CircuitPackCore {
    /// Package `document` into `store`.
    ///
    /// Errors abort the run; a store that saw a failed run must be discarded.
    pub fn package(
        document: &Document,
        library: &dyn DescriptionLibrary,
        options: &SaveOptions,
        store: &mut dyn PartStore,
    ) -> Result<PackageSummary, CircuitPackError> {
        let resolution = DescriptionResolver::new(document, library, options).resolve(store)?;

        let connections = if options.include_connections {
            ConnectionCompactor::compact(document)
        } else {
            CompactedConnections::default()
        };

        DocumentWriter::new(document, options, &resolution, &connections).write(store)?;

        let summary = PackageSummary {
            elements: document.elements.len(),
            definitions: resolution.resolved_count(),
            source_groups: resolution.locations.len(),
            embedded_parts: resolution
                .embedded
                .iter()
                .map(|e| e.part_name.clone())
                .collect(),
            connection_groups: connections.emitted_group_count(),
        };
        tracing::info!(
            "Packaged {} elements: {} definitions in {} sources, {} embedded, {} groups",
            summary.elements,
            summary.definitions,
            summary.source_groups,
            summary.embedded_parts.len(),
            summary.connection_groups
        );
        Ok(summary)
    }

    /// Package into a fresh in-memory store.
    pub fn package_to_memory(
        document: &Document,
        library: &dyn DescriptionLibrary,
        options: &SaveOptions,
    ) -> Result<(MemoryPackage, PackageSummary), CircuitPackError> {
        let mut package = MemoryPackage::new();
        let summary = Self::package(document, library, options, &mut package)?;
        Ok((package, summary))
    }

    /// Package and persist to `dir`. Nothing is written unless packaging succeeds.
    pub fn package_to_dir(
        document: &Document,
        library: &dyn DescriptionLibrary,
        options: &SaveOptions,
        dir: &Path,
    ) -> Result<PackageSummary, CircuitPackError> {
        let (package, summary) = Self::package_to_memory(document, library, options)?;
        package.save_to_dir(dir)?;
        Ok(summary)
    }

    /// Read a packaged document back.
    pub fn unpack(store: &dyn PartStore) -> Result<LoadedDocument, CircuitPackError> {
        DocumentReader::read(store)
    }

    pub fn unpack_dir(dir: &Path) -> Result<LoadedDocument, CircuitPackError> {
        let package = MemoryPackage::load_from_dir(dir)?;
        Self::unpack(&package)
    }
}

/// Resolve a path relative to the directory of `anchor` (used for document files).
pub fn resolve_relative(anchor: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    anchor
        .parent()
        .map(|p| p.join(candidate))
        .unwrap_or_else(|| candidate.to_path_buf())
}
