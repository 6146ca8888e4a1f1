//! Integration tests for circuitpack packaging

use circuitpack::format::{COMPONENTS_DIR, DOCUMENT_PART};
use circuitpack::model::{
    Component, ComponentDescription, Configuration, Document, DocumentMetadata, Element,
    Orientation, Point, Wire,
};
use circuitpack::prelude::*;
use circuitpack::reader::{LoadedElement, TypeRef};
use circuitpack::xml::parse_document;
use chrono::TimeZone;
use tempfile::TempDir;
use uuid::Uuid;

fn library_for(document: &Document) -> InMemoryLibrary {
    let mut lib = InMemoryLibrary::new();
    let mut by_source: std::collections::BTreeMap<String, Vec<&str>> = Default::default();
    for d in &document.descriptions {
        if let Some(source) = &d.source {
            by_source.entry(source.0.clone()).or_default().push(d.id.as_str());
        }
    }
    for (source, ids) in by_source {
        let data = format!("<componentDescriptions source=\"{}\" />", source).into_bytes();
        lib.add_resource(source, data, &ids);
    }
    lib
}

const RESISTOR_GUID: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b7d_4c3a_8e21_5d0f_b3a9_7c64);

fn sample_document() -> Document {
    let mut doc = Document::default();
    doc.metadata = DocumentMetadata {
        title: Some("Divider".into()),
        creator: Some("bench".into()),
        description: None,
        created: Some(chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
    };
    let resistor = doc.add_description(
        ComponentDescription::new("resistor", "Resistor")
            .with_guid(RESISTOR_GUID)
            .with_source("lib/passives.xml")
            .with_implement_set("urn:cd:common")
            .with_implement_item("resistor")
            .with_configuration(
                Configuration::new("Variable")
                    .with_implementation("var-resistor")
                    .with_setter("variable", true),
            ),
    );
    let cell = doc.add_description(
        ComponentDescription::new("cell", "Cell").with_source("lib/sources.xml"),
    );

    doc.add_component(
        Component::new(cell, Point::new(0.0, 0.0))
            .with_orientation(Orientation::Vertical)
            .with_connection("+", 0.0, 0.0)
            .with_connection("-", 0.0, 60.0),
    );
    doc.add_wire(Wire::new(Point::new(0.0, 0.0), Orientation::Horizontal, 40.0));
    doc.add_component(
        Component::new(resistor, Point::new(40.0, 0.0))
            .with_size(60.0)
            .with_property("resistance", 4700.0)
            .with_property("label", "R1")
            .with_property("@selected", true)
            .with_connection("a", 0.0, 0.0)
            .with_connection("b", 0.0, 60.0),
    );
    doc.add_component(
        Component::new(resistor, Point::new(40.0, 60.0))
            .with_flipped(false)
            .with_property("variable", true)
            .with_connection("a", 0.0, 0.0),
    );
    doc
}

fn document_part(package: &MemoryPackage) -> circuitpack::xml::XmlElement {
    parse_document(package.part_data(DOCUMENT_PART).unwrap()).unwrap()
}

#[test]
fn test_shared_point_without_wire() {
    let mut doc = Document::default();
    let ic = doc.add_description(ComponentDescription::new("ic", "IC").with_source("lib/ic.xml"));
    doc.add_component(Component::new(ic, Point::new(0.0, 0.0)).with_connection("A", 10.0, 0.0));
    doc.add_component(Component::new(ic, Point::new(20.0, 0.0)).with_connection("A", -10.0, 0.0));

    let (package, summary) =
        CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &SaveOptions::default())
            .unwrap();
    assert_eq!(summary.definitions, 1);
    assert_eq!(summary.connection_groups, 1);

    let loaded = CircuitPackCore::unpack(&package).unwrap();
    assert_eq!(loaded.definitions.len(), 1);
    assert_eq!(loaded.definitions[0].id, "0");
    for c in loaded.components() {
        assert_eq!(c.type_ref, TypeRef::Definition("0".into()));
        assert_eq!(c.connections, vec![("0".to_string(), "A".to_string())]);
    }
}

#[test]
fn test_lone_wire_emits_geometry_only() {
    let mut doc = Document::default();
    let ic = doc.add_description(ComponentDescription::new("ic", "IC").with_source("lib/ic.xml"));
    doc.add_component(Component::new(ic, Point::new(0.0, 0.0)).with_connection("A", 0.0, 0.0));
    doc.add_wire(Wire::new(Point::new(20.0, 20.0), Orientation::Horizontal, 20.0));
    doc.add_component(Component::new(ic, Point::new(80.0, 0.0)).with_connection("B", 0.0, 0.0));

    let (package, summary) =
        CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &SaveOptions::default())
            .unwrap();
    assert_eq!(summary.connection_groups, 0);

    let root = document_part(&package);
    let elements = root.find("elements").unwrap();
    let wire = elements.find("w").unwrap();
    assert!(wire.elements().next().is_none());
    for c in elements.find_all("c") {
        assert!(c.find("cns").is_none());
    }
}

#[test]
fn test_without_layout() {
    let doc = sample_document();
    let options = SaveOptions {
        include_layout: false,
        ..SaveOptions::default()
    };
    let (package, _) =
        CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &options).unwrap();

    let root = document_part(&package);
    for c in root.find("elements").unwrap().find_all("c") {
        for attr in ["x", "y", "o", "sz", "flp"] {
            assert!(c.attribute(attr).is_none(), "unexpected layout attribute {}", attr);
        }
        assert!(c.find("prs").is_some());
    }

    let loaded = CircuitPackCore::unpack(&package).unwrap();
    let resistor = loaded.components().nth(1).unwrap();
    assert!(resistor.layout.is_none());
    assert_eq!(resistor.properties.len(), 2);
    assert!(!resistor.connections.is_empty());
}

#[test]
fn test_round_trip_preserves_elements() {
    let doc = sample_document();
    let (package, _) =
        CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &SaveOptions::default())
            .unwrap();
    let loaded = CircuitPackCore::unpack(&package).unwrap();

    assert_eq!(loaded.version, circuitpack::format::FORMAT_VERSION);
    assert_eq!(loaded.size, doc.size);
    assert_eq!(loaded.metadata, doc.metadata);
    assert_eq!(loaded.elements.len(), doc.elements.len());

    for (original, loaded) in doc.elements.iter().zip(&loaded.elements) {
        match (original, loaded) {
            (
                Element::Wire(w),
                LoadedElement::Wire {
                    location,
                    orientation,
                    length,
                },
            ) => {
                assert_eq!(&w.location, location);
                assert_eq!(&w.orientation, orientation);
                assert_eq!(&w.length, length);
            }
            (Element::Component(c), LoadedElement::Component(l)) => {
                let layout = l.layout.as_ref().unwrap();
                assert_eq!(layout.location, c.location);
                assert_eq!(layout.orientation, c.orientation);
                assert_eq!(layout.size, c.size);
                assert_eq!(layout.flipped, c.flipped);
                let public: Vec<_> = c.public_properties().collect();
                assert_eq!(public.len(), l.properties.len());
                for (k, v) in public {
                    assert_eq!(l.properties.get(k), Some(v));
                }
                assert!(!l.properties.contains_key("@selected"));
            }
            (o, l) => panic!("element kind changed: {:?} -> {:?}", o, l),
        }
    }
}

#[test]
fn test_configuration_written_for_matching_component() {
    let doc = sample_document();
    let (package, _) =
        CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &SaveOptions::default())
            .unwrap();
    let loaded = CircuitPackCore::unpack(&package).unwrap();

    let components: Vec<_> = loaded.components().collect();
    assert_eq!(components[1].configuration, None);
    assert_eq!(components[2].configuration.as_deref(), Some("Variable"));

    let TypeRef::Definition(id) = &components[2].type_ref else {
        panic!("resistor should reference a definition");
    };
    let definition = loaded.definition(id).unwrap();
    assert_eq!(
        definition.configurations,
        vec![("Variable".to_string(), "var-resistor".to_string())]
    );
    assert_eq!(definition.implement_set.as_deref(), Some("urn:cd:common"));
    assert_eq!(definition.guid, Some(RESISTOR_GUID));

    let cell = loaded.definitions.iter().find(|d| d.name == "Cell").unwrap();
    assert_eq!(cell.guid, None);
}

#[test]
fn test_round_trip_keeps_sub_second_created() {
    let mut doc = sample_document();
    doc.metadata.created = chrono::DateTime::from_timestamp_millis(1_700_000_000_123);

    let (package, _) =
        CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &SaveOptions::default())
            .unwrap();
    let loaded = CircuitPackCore::unpack(&package).unwrap();
    assert_eq!(loaded.metadata, doc.metadata);
}

#[test]
fn test_single_definition_names_stay_flat() {
    let mut doc = Document::default();
    let switch = doc.add_description(
        ComponentDescription::new("spst", "SPST/SPDT Switch").with_source("lib/switches.xml"),
    );
    let up = doc.add_description(
        ComponentDescription::new("up", "../up").with_source("lib/switches.xml"),
    );
    // unused, so each used description is embedded on its own
    doc.add_description(
        ComponentDescription::new("dpdt", "DPDT").with_source("lib/switches.xml"),
    );
    doc.add_component(Component::new(switch, Point::new(0.0, 0.0)));
    doc.add_component(Component::new(up, Point::new(50.0, 0.0)));

    let (package, summary) =
        CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &SaveOptions::default())
            .unwrap();
    assert_eq!(
        summary.embedded_parts,
        vec![
            format!("{}/SPST_SPDT_Switch.cdcom", COMPONENTS_DIR),
            format!("{}/.._up.cdcom", COMPONENTS_DIR),
        ]
    );
    for part in &summary.embedded_parts {
        assert!(package.contains_part(part));
    }
}

#[test]
fn test_packaging_is_deterministic() {
    let doc = sample_document();
    let lib = library_for(&doc);
    let options = SaveOptions::default();
    let (first, _) = CircuitPackCore::package_to_memory(&doc, &lib, &options).unwrap();
    let (second, _) = CircuitPackCore::package_to_memory(&doc, &lib, &options).unwrap();

    let first_parts: Vec<_> = first.part_uris().collect();
    let second_parts: Vec<_> = second.part_uris().collect();
    assert_eq!(first_parts, second_parts);
    for uri in first_parts {
        assert_eq!(first.part_data(uri), second.part_data(uri), "part {} differs", uri);
    }

    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.cddx");
    let b = dir.path().join("b.cddx");
    CircuitPackCore::package_to_dir(&doc, &lib, &options, &a).unwrap();
    CircuitPackCore::package_to_dir(&doc, &lib, &options, &b).unwrap();
    let read = |root: &std::path::Path, rel: &str| std::fs::read(root.join(rel)).unwrap();
    for rel in [
        "[Content_Types].xml",
        "_rels/.rels",
        "circuitdiagram/Document.xml",
        "circuitdiagram/_rels/Document.xml.rels",
    ] {
        assert_eq!(read(&a, rel), read(&b, rel), "{} differs", rel);
    }
}

#[test]
fn test_shared_source_and_implement_set_grouped_once() {
    let mut doc = Document::default();
    let r = doc.add_description(
        ComponentDescription::new("r", "Resistor")
            .with_source("lib/passives.xml")
            .with_implement_set("urn:set"),
    );
    let c = doc.add_description(
        ComponentDescription::new("c", "Capacitor")
            .with_source("lib/passives.xml")
            .with_implement_set("urn:set"),
    );
    doc.add_component(Component::new(r, Point::new(0.0, 0.0)));
    doc.add_component(Component::new(c, Point::new(50.0, 0.0)));

    for embed in [EmbedComponents::All, EmbedComponents::Custom] {
        let options = SaveOptions {
            embed_components: embed,
            ..SaveOptions::default()
        };
        let (package, summary) =
            CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &options).unwrap();
        assert_eq!(summary.source_groups, 1, "{:?}", embed);

        let root = document_part(&package);
        let sources: Vec<_> = root.find("definitions").unwrap().find_all("src").collect();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].find_all("add").count(), 2);
    }
}

#[test]
fn test_embed_all_writes_parts() {
    let mut doc = sample_document();
    let diode = doc.add_description(
        ComponentDescription::new("diode", "Diode").with_source("lib/semis.xml"),
    );
    // a second, unused description in the same resource forces a single definition
    doc.add_description(ComponentDescription::new("led", "LED").with_source("lib/semis.xml"));
    doc.add_component(Component::new(diode, Point::new(100.0, 100.0)));

    let options = SaveOptions {
        embed_components: EmbedComponents::All,
        ..SaveOptions::default()
    };
    let (package, summary) =
        CircuitPackCore::package_to_memory(&doc, &library_for(&doc), &options).unwrap();

    assert_eq!(
        summary.embedded_parts,
        vec![
            format!("{}/sources.xml", COMPONENTS_DIR),
            format!("{}/passives.xml", COMPONENTS_DIR),
            format!("{}/Diode.cdcom", COMPONENTS_DIR),
        ]
    );
    for part in &summary.embedded_parts {
        assert!(package.contains_part(part));
    }

    let loaded = CircuitPackCore::unpack(&package).unwrap();
    for definition in &loaded.definitions {
        let target = definition.target.as_deref().unwrap();
        assert!(summary.embedded_parts.iter().any(|p| p == target));
        assert!(definition.external_id.is_some());
    }
}

#[test]
fn test_commonly_available_sources_are_referenced() {
    let doc = sample_document();
    let mut lib = library_for(&doc);
    lib.mark_common("lib/passives.xml");

    let (_, summary) =
        CircuitPackCore::package_to_memory(&doc, &lib, &SaveOptions::default()).unwrap();
    assert_eq!(summary.embedded_parts, vec![format!("{}/sources.xml", COMPONENTS_DIR)]);
    assert_eq!(summary.source_groups, 2);
}

#[test]
fn test_package_to_dir_round_trip() {
    let doc = sample_document();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("divider.cddx");

    CircuitPackCore::package_to_dir(&doc, &library_for(&doc), &SaveOptions::default(), &target)
        .unwrap();
    assert!(target.join("circuitdiagram/Document.xml").is_file());
    assert!(target.join("docProps/core.xml").is_file());

    let loaded = CircuitPackCore::unpack_dir(&target).unwrap();
    assert_eq!(loaded.elements.len(), doc.elements.len());

    // second save to the same path is refused and leaves the first intact
    let again =
        CircuitPackCore::package_to_dir(&doc, &library_for(&doc), &SaveOptions::default(), &target);
    assert!(again.is_err());
    assert!(CircuitPackCore::unpack_dir(&target).is_ok());
}

#[test]
fn test_missing_resource_aborts_without_output() {
    let doc = sample_document();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("broken.cddx");

    let result = CircuitPackCore::package_to_dir(
        &doc,
        &InMemoryLibrary::new(),
        &SaveOptions {
            embed_components: EmbedComponents::All,
            ..SaveOptions::default()
        },
        &target,
    );
    assert!(matches!(result, Err(CircuitPackError::Resource { .. })));
    assert!(!target.exists());
}
