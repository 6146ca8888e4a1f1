//! circuitpack - circuit document packaging library
//!
//! Turns an in-memory circuit drawing into a multi-part container: one
//! document part holding definitions and elements, the component
//! description resources it depends on, and typed relationships between
//! them. Wires are erased on the way out; the connectivity they implied is
//! kept as named connection groups on the components.
//!
//! # Quick Start
//!
//! ```no_run
//! use circuitpack::prelude::*;
//! use circuitpack::model::{Component, ComponentDescription, Document, Point};
//! use std::path::Path;
//!
//! let mut document = Document::default();
//! let resistor = document.add_description(
//!     ComponentDescription::new("resistor", "Resistor").with_source("lib/resistor.xml"),
//! );
//! document.add_component(Component::new(resistor, Point::new(10.0, 20.0)));
//!
//! let library = FileLibrary::new(Path::new("circuit.json"), &document);
//! let summary = CircuitPackCore::package_to_dir(
//!     &document,
//!     &library,
//!     &SaveOptions::default(),
//!     Path::new("circuit.cddx"),
//! ).unwrap();
//! println!("{} embedded parts", summary.embedded_parts.len());
//! ```
//!
//! # Features
//!
//! - **Description embedding**: whole resources or single definitions, with dedup
//! - **Connectivity compaction**: wire erasure and named connection groups
//! - **Deterministic output**: identical inputs give identical parts
//! - **Reading back**: [`reader::DocumentReader`] for inspection and tests

pub mod config;
pub mod connectivity;
pub mod core;
pub mod embed;
pub mod format;
pub mod model;
pub mod package;
pub mod reader;
pub mod writer;
pub mod xml;

// Re-export main types
pub use crate::core::{
    resolve_relative, CircuitPackCore, CircuitPackError, EmbedComponents, PackageSummary,
    SaveOptions,
};
pub use config::load_save_options;
pub use embed::{DescriptionLibrary, FileLibrary, InMemoryLibrary};
pub use model::Document;
pub use package::{MemoryPackage, PartStore};
pub use reader::{DocumentReader, LoadedDocument};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CircuitPackCore, CircuitPackError, DescriptionLibrary, EmbedComponents, FileLibrary,
        InMemoryLibrary, MemoryPackage, PackageSummary, PartStore, SaveOptions,
    };
}
