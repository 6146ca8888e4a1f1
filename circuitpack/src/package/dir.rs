//! Directory persistence for packages.
//!
//! Layout follows the usual open-packaging conventions:
//! - every part is a file at its part name below the root directory;
//! - relationships of `/a/b.xml` live in `/a/_rels/b.xml.rels`, package
//!   relationships in `/_rels/.rels`;
//! - `[Content_Types].xml` lists the content type of every part.
//!
//! A package is written into a staging directory next to the target and
//! renamed into place once every file is on disk, so a failed save never
//! leaves a partial package at the target path.

use std::fs;
use std::path::{Path, PathBuf};

use super::{validate_part_name, MemoryPackage, PackageError, PartStore, Relationship, ROOT};
use crate::xml::{parse_document, XmlElement};

const CONTENT_TYPES_FILE: &str = "[Content_Types].xml";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const RELATIONSHIPS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";

impl MemoryPackage {
    /// Persist the package to `dir`, which must not exist yet.
    pub fn save_to_dir(&self, dir: &Path) -> Result<(), PackageError> {
        if dir.exists() {
            return Err(PackageError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", dir.display()),
            )));
        }

        let staging = staging_path(dir);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        match self.write_tree(&staging) {
            Ok(()) => {
                fs::rename(&staging, dir)?;
                tracing::info!("Saved package with {} parts to {:?}", self.part_count(), dir);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }

    fn write_tree(&self, root: &Path) -> Result<(), PackageError> {
        fs::create_dir_all(root)?;

        let mut types = XmlElement::new("Types")
            .attr("xmlns", CONTENT_TYPES_NS)
            .child(
                XmlElement::new("Default")
                    .attr("Extension", "rels")
                    .attr("ContentType", RELATIONSHIPS_CONTENT_TYPE),
            );

        for uri in self.part_uris() {
            let data = self.part_data(uri).unwrap_or_default();
            write_file(&file_path(root, uri), data)?;
            if let Some(content_type) = self.content_type(uri) {
                types.push(
                    XmlElement::new("Override")
                        .attr("PartName", uri)
                        .attr("ContentType", content_type),
                );
            }
        }
        write_file(&root.join(CONTENT_TYPES_FILE), &types.to_document_bytes())?;

        for source in self.relationship_sources() {
            let mut rels = XmlElement::new("Relationships").attr("xmlns", RELATIONSHIPS_NS);
            for rel in self.relationships(source) {
                rels.push(
                    XmlElement::new("Relationship")
                        .attr("Id", rel.id)
                        .attr("Type", rel.rel_type)
                        .attr("Target", rel.target),
                );
            }
            write_file(&file_path(root, &rels_part_name(source)), &rels.to_document_bytes())?;
        }

        Ok(())
    }

    /// Load a package previously written by [`MemoryPackage::save_to_dir`].
    pub fn load_from_dir(dir: &Path) -> Result<Self, PackageError> {
        let types_path = dir.join(CONTENT_TYPES_FILE);
        let types = parse_document(&fs::read(&types_path)?)?;
        if types.name != "Types" {
            return Err(PackageError::Format(format!(
                "{} has root <{}>",
                CONTENT_TYPES_FILE, types.name
            )));
        }

        let mut package = MemoryPackage::new();
        let mut sources = vec![ROOT.to_string()];

        for entry in types.find_all("Override") {
            let (Some(uri), Some(content_type)) =
                (entry.attribute("PartName"), entry.attribute("ContentType"))
            else {
                return Err(PackageError::Format(
                    "Override without PartName or ContentType".to_string(),
                ));
            };
            validate_part_name(uri)?;
            let data = fs::read(file_path(dir, uri))?;
            package.write_part(uri, content_type, data)?;
            sources.push(uri.to_string());
        }

        for source in sources {
            let rels_path = file_path(dir, &rels_part_name(&source));
            if !rels_path.is_file() {
                continue;
            }
            let rels = parse_document(&fs::read(&rels_path)?)?;
            for rel in rels.find_all("Relationship") {
                let (Some(id), Some(rel_type), Some(target)) = (
                    rel.attribute("Id"),
                    rel.attribute("Type"),
                    rel.attribute("Target"),
                ) else {
                    return Err(PackageError::Format(format!(
                        "Incomplete relationship in {:?}",
                        rels_path
                    )));
                };
                package.insert_relationship(Relationship {
                    id: id.to_string(),
                    source: source.clone(),
                    target: target.to_string(),
                    rel_type: rel_type.to_string(),
                });
            }
        }

        tracing::debug!("Loaded package with {} parts from {:?}", package.part_count(), dir);
        Ok(package)
    }
}

fn staging_path(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    dir.with_file_name(format!(".{}.partial", name))
}

/// Relationship part name for a source (`/a/b.xml` -> `/a/_rels/b.xml.rels`).
fn rels_part_name(source: &str) -> String {
    if source == ROOT {
        return "/_rels/.rels".to_string();
    }
    match source.rfind('/') {
        Some(i) => format!("{}/_rels/{}.rels", &source[..i], &source[i + 1..]),
        None => format!("/_rels/{}.rels", source),
    }
}

fn file_path(root: &Path, uri: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in uri.trim_start_matches('/').split('/') {
        path.push(segment);
    }
    path
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), PackageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}
