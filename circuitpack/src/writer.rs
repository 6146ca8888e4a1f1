//! Container Serializer
//!
//! Writes the primary document part in one deterministic pass: header,
//! definitions grouped by source, then every element in document order.

use chrono::SecondsFormat;

use crate::connectivity::CompactedConnections;
use crate::core::{CircuitPackError, SaveOptions};
use crate::embed::{DescriptionSourceLocation, Resolution, ResolvedSource};
use crate::format::*;
use crate::model::{Component, Document, DocumentMetadata, Element, Wire};
use crate::package::{PartStore, ROOT};
use crate::xml::XmlElement;

pub struct DocumentWriter<'a> {
    document: &'a Document,
    options: &'a SaveOptions,
    resolution: &'a Resolution,
    connections: &'a CompactedConnections,
}

impl<'a> DocumentWriter<'a> {
    pub fn new(
        document: &'a Document,
        options: &'a SaveOptions,
        resolution: &'a Resolution,
        connections: &'a CompactedConnections,
    ) -> Self {
        Self {
            document,
            options,
            resolution,
            connections,
        }
    }

    /// Write the document part, its package relationship and, when the
    /// document has metadata, the core properties part.
    pub fn write(&self, store: &mut dyn PartStore) -> Result<(), CircuitPackError> {
        let root = self.build();
        store.write_part(DOCUMENT_PART, DOCUMENT_CONTENT_TYPE, root.to_document_bytes())?;
        store.add_relationship(ROOT, DOCUMENT_PART, DOCUMENT_RELATIONSHIP_TYPE)?;

        if !self.document.metadata.is_empty() {
            let core = core_properties(&self.document.metadata);
            store.write_part(
                CORE_PROPERTIES_PART,
                CORE_PROPERTIES_CONTENT_TYPE,
                core.to_document_bytes(),
            )?;
            store.add_relationship(ROOT, CORE_PROPERTIES_PART, CORE_PROPERTIES_RELATIONSHIP_TYPE)?;
        }
        Ok(())
    }

    /// Build the document tree without writing it.
    pub fn build(&self) -> XmlElement {
        let size = self.document.size;
        let header = XmlElement::new("properties")
            .child(XmlElement::new("width").text(size.width.to_string()))
            .child(XmlElement::new("height").text(size.height.to_string()));

        let mut definitions = XmlElement::new("definitions");
        for location in &self.resolution.locations {
            definitions.push(source_element(location));
        }

        let mut elements = XmlElement::new("elements");
        for (i, element) in self.document.elements.iter().enumerate() {
            match element {
                Element::Wire(w) => elements.push(wire_element(w)),
                Element::Component(c) => elements.push(self.component_element(i, c)),
            }
        }

        XmlElement::new("circuit")
            .attr("xmlns", DOCUMENT_NS)
            .attr("xmlns:r", RELATIONSHIPS_ATTR_NS)
            .attr("version", FORMAT_VERSION)
            .child(header)
            .child(definitions)
            .child(elements)
    }

    fn component_element(&self, index: usize, component: &Component) -> XmlElement {
        let mut el = XmlElement::new("c").attr("tp", self.type_reference(index, component));

        if self.options.include_layout {
            el = el
                .attr("x", component.location.x.to_string())
                .attr("y", component.location.y.to_string())
                .attr("o", component.orientation.tag())
                .attr_opt("sz", component.size.map(|s| s.to_string()))
                .attr_opt("flp", component.flipped.map(|f| f.to_string()));
        }

        let mut properties = XmlElement::new("prs");
        let configuration = self
            .document
            .description(component.description)
            .and_then(|d| d.active_configuration(&component.properties));
        if let Some(cfg) = configuration {
            properties.push(XmlElement::new("cfg").attr("name", cfg.name.as_str()));
        }
        for (key, value) in component.public_properties() {
            properties.push(
                XmlElement::new("p")
                    .attr("k", key.as_str())
                    .attr("v", value.to_string())
                    .attr_opt("t", value.type_tag()),
            );
        }
        el.push(properties);

        if self.options.include_connections {
            let references = self.connections.references_for(index);
            if !references.is_empty() {
                let mut cns = XmlElement::new("cns");
                for r in references {
                    cns.push(
                        XmlElement::new("cn")
                            .attr("id", r.group_id.as_str())
                            .attr("pt", r.name.as_str()),
                    );
                }
                el.push(cns);
            }
        }

        el
    }

    fn type_reference(&self, index: usize, component: &Component) -> String {
        if let Some(resolved) = self.resolution.resolved(component.description) {
            return definition_reference(&resolved.internal_id);
        }
        if let Some(tag) = component.inline_type() {
            return tag.to_string();
        }
        tracing::warn!(
            "Element #{} has no resolved definition or inline type; writing empty tp",
            index
        );
        String::new()
    }
}

fn source_element(location: &DescriptionSourceLocation) -> XmlElement {
    let mut src = XmlElement::new("src")
        .attr_opt("col", location.implement_set.as_deref())
        .attr_opt("r:id", location.relationship_id.as_deref());
    for resolved in &location.sources {
        src.push(definition_element(resolved));
    }
    src
}

fn definition_element(resolved: &ResolvedSource) -> XmlElement {
    let mut add = XmlElement::new("add")
        .attr("id", resolved.internal_id.as_str())
        .attr_opt("xid", resolved.external_id.as_deref())
        .attr("name", resolved.name.as_str())
        .attr_opt("guid", resolved.guid.map(|g| g.to_string()))
        .attr_opt("item", resolved.implementation_name.as_deref());
    if !resolved.configurations.is_empty() {
        let mut cfgs = XmlElement::new("configurations");
        for (name, implementation) in &resolved.configurations {
            cfgs.push(
                XmlElement::new("add")
                    .attr("name", name.as_str())
                    .attr("item", implementation.as_str()),
            );
        }
        add.push(cfgs);
    }
    add
}

fn wire_element(wire: &Wire) -> XmlElement {
    XmlElement::new("w")
        .attr("x", wire.location.x.to_string())
        .attr("y", wire.location.y.to_string())
        .attr("o", wire.orientation.tag())
        .attr("sz", wire.length.to_string())
}

fn core_properties(metadata: &DocumentMetadata) -> XmlElement {
    XmlElement::new("cp:coreProperties")
        .attr("xmlns:cp", CORE_PROPERTIES_NS)
        .attr("xmlns:dc", DC_NS)
        .attr("xmlns:dcterms", DCTERMS_NS)
        .child_opt("dc:title", metadata.title.as_deref())
        .child_opt("dc:creator", metadata.creator.as_deref())
        .child_opt("dc:description", metadata.description.as_deref())
        .child_opt(
            "dcterms:created",
            metadata
                .created
                .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                .as_deref(),
        )
}

trait ChildOpt {
    fn child_opt(self, name: &str, text: Option<&str>) -> Self;
}

impl ChildOpt for XmlElement {
    fn child_opt(self, name: &str, text: Option<&str>) -> Self {
        match text {
            Some(t) => self.child(XmlElement::new(name).text(t)),
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectionCompactor;
    use crate::embed::{DescriptionResolver, InMemoryLibrary};
    use crate::model::{ComponentDescription, Orientation, Point};
    use crate::package::MemoryPackage;

    fn build(document: &Document, options: &SaveOptions) -> XmlElement {
        let lib = InMemoryLibrary::new();
        let mut store = MemoryPackage::new();
        let resolution = DescriptionResolver::new(document, &lib, options)
            .resolve(&mut store)
            .unwrap();
        let connections = ConnectionCompactor::compact(document);
        DocumentWriter::new(document, options, &resolution, &connections).build()
    }

    #[test]
    fn test_wire_emits_geometry_only() {
        let mut doc = Document::default();
        doc.add_wire(Wire::new(Point::new(10.0, 20.0), Orientation::Vertical, 40.0));
        let options = SaveOptions {
            embed_components: crate::EmbedComponents::Custom,
            ..SaveOptions::default()
        };
        let root = build(&doc, &options);

        let w = root.find("elements").and_then(|e| e.find("w")).unwrap();
        assert_eq!(w.to_string(), "<w x=\"10\" y=\"20\" o=\"v\" sz=\"40\" />");
    }

    #[test]
    fn test_inline_type_used_without_definition() {
        let mut doc = Document::default();
        let r = doc.add_description(ComponentDescription::new("legacy", "Legacy"));
        doc.add_component(
            Component::new(r, Point::new(0.0, 0.0)).with_property("@type", "cd:legacy"),
        );
        let root = build(&doc, &SaveOptions::default());

        let c = root.find("elements").and_then(|e| e.find("c")).unwrap();
        assert_eq!(c.attribute("tp"), Some("cd:legacy"));
        let prs = c.find("prs").unwrap();
        assert_eq!(prs.elements().count(), 0);
    }

    #[test]
    fn test_missing_type_writes_empty_reference() {
        let mut doc = Document::default();
        let r = doc.add_description(ComponentDescription::new("legacy", "Legacy"));
        doc.add_component(Component::new(r, Point::new(0.0, 0.0)));
        let root = build(&doc, &SaveOptions::default());

        let c = root.find("elements").and_then(|e| e.find("c")).unwrap();
        assert_eq!(c.attribute("tp"), Some(""));
    }

    #[test]
    fn test_created_keeps_fractional_seconds() {
        let created = chrono::DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let metadata = DocumentMetadata {
            created: Some(created),
            ..DocumentMetadata::default()
        };
        let core = core_properties(&metadata);
        assert_eq!(
            core.find("dcterms:created").unwrap().text_content(),
            "2023-11-14T22:13:20.123Z"
        );
    }

    #[test]
    fn test_header_carries_version_and_size() {
        let doc = Document::new(crate::model::Size {
            width: 800.0,
            height: 600.5,
        });
        let root = build(&doc, &SaveOptions::default());

        assert_eq!(root.attribute("version"), Some(FORMAT_VERSION));
        let props = root.find("properties").unwrap();
        assert_eq!(props.find("width").unwrap().text_content(), "800");
        assert_eq!(props.find("height").unwrap().text_content(), "600.5");
    }
}
