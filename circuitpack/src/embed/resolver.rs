use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{DescriptionLibrary, DescriptionSourceLocation, ResolvedSource};
use crate::core::{CircuitPackError, EmbedComponents, SaveOptions};
use crate::format::{
    resource_content_type, COMPONENTS_DIR, COMPONENT_BINARY_CONTENT_TYPE,
    COMPONENT_RELATIONSHIP_TYPE, DEFINITION_EXTENSION, DOCUMENT_PART,
};
use crate::model::{ComponentDescription, DescriptionRef, Document, SourceLocation};
use crate::package::{unique_part_name, PartStore};

/// Embed decision, evaluated once per description
#[derive(Debug, Clone, Copy)]
pub enum EmbedPolicy<'a> {
    All,
    Automatic,
    Custom(&'a BTreeSet<DescriptionRef>),
}

impl<'a> EmbedPolicy<'a> {
    pub fn from_options(options: &'a SaveOptions) -> Self {
        match options.embed_components {
            EmbedComponents::All => EmbedPolicy::All,
            EmbedComponents::Automatic => EmbedPolicy::Automatic,
            EmbedComponents::Custom => EmbedPolicy::Custom(&options.custom_embed_components),
        }
    }

    pub fn should_embed(
        &self,
        r: DescriptionRef,
        description: &ComponentDescription,
        library: &dyn DescriptionLibrary,
    ) -> bool {
        match self {
            EmbedPolicy::All => true,
            EmbedPolicy::Automatic => !library.is_commonly_available(description),
            EmbedPolicy::Custom(set) => set.contains(&r),
        }
    }
}

/// An auxiliary part written while resolving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPart {
    pub part_name: String,
    pub relationship_id: String,
    /// True when the original resource was embedded verbatim
    pub whole_resource: bool,
}

/// Output of one resolution pass
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub locations: Vec<DescriptionSourceLocation>,
    pub embedded: Vec<EmbeddedPart>,
    /// description -> (location index, source index)
    index: BTreeMap<DescriptionRef, (usize, usize)>,
}

impl Resolution {
    pub fn resolved(&self, r: DescriptionRef) -> Option<&ResolvedSource> {
        let &(loc, src) = self.index.get(&r)?;
        self.locations.get(loc).and_then(|l| l.sources.get(src))
    }

    pub fn resolved_count(&self) -> usize {
        self.index.len()
    }
}

/// Per-run resolver state: the id counter and the embedded-source map are
/// scoped to one [`DescriptionResolver::resolve`] call.
pub struct DescriptionResolver<'a> {
    document: &'a Document,
    library: &'a dyn DescriptionLibrary,
    policy: EmbedPolicy<'a>,
    next_id: usize,
    whole_embedded: HashMap<SourceLocation, String>,
}

impl<'a> DescriptionResolver<'a> {
    pub fn new(
        document: &'a Document,
        library: &'a dyn DescriptionLibrary,
        options: &'a SaveOptions,
    ) -> Self {
        Self {
            document,
            library,
            policy: EmbedPolicy::from_options(options),
            next_id: 0,
            whole_embedded: HashMap::new(),
        }
    }

    pub fn resolve(mut self, store: &mut dyn PartStore) -> Result<Resolution, CircuitPackError> {
        let mut resolution = Resolution::default();
        let used = self.document.used_descriptions();

        for &r in &used {
            let Some(description) = self.document.description(r) else {
                tracing::warn!("Component refers to unknown description #{}", r.0);
                continue;
            };
            let Some(source) = &description.source else {
                tracing::debug!(
                    "Description '{}' has no source location; components keep their inline type",
                    description.name
                );
                continue;
            };

            let embed = self.policy.should_embed(r, description, self.library);
            let relationship_id = match self.whole_embedded.get(source) {
                Some(id) => Some(id.clone()),
                None if embed => {
                    let part = self.embed(store, &used, description, source)?;
                    let id = part.relationship_id.clone();
                    resolution.embedded.push(part);
                    Some(id)
                }
                None => None,
            };
            tracing::debug!(
                "Resolved '{}' (embed: {}, relationship: {:?})",
                description.name,
                embed,
                relationship_id
            );

            let resolved = self.build_resolved(r, description, relationship_id.is_some());
            let implement_set = description.metadata.implement_set.as_deref();

            let loc_index = match resolution
                .locations
                .iter()
                .position(|l| l.matches(relationship_id.as_deref(), implement_set))
            {
                Some(i) => i,
                None => {
                    resolution.locations.push(DescriptionSourceLocation {
                        source: source.clone(),
                        relationship_id,
                        implement_set: implement_set.map(|s| s.to_string()),
                        sources: Vec::new(),
                    });
                    resolution.locations.len() - 1
                }
            };
            let location = &mut resolution.locations[loc_index];
            location.sources.push(resolved);
            resolution
                .index
                .insert(r, (loc_index, location.sources.len() - 1));
        }

        Ok(resolution)
    }

    /// Embed either the whole resource at `source` or this description alone.
    fn embed(
        &mut self,
        store: &mut dyn PartStore,
        used: &[DescriptionRef],
        description: &ComponentDescription,
        source: &SourceLocation,
    ) -> Result<EmbeddedPart, CircuitPackError> {
        let used_ids: BTreeSet<&str> = used
            .iter()
            .filter_map(|&r| self.document.description(r))
            .filter(|d| d.source.as_ref() == Some(source))
            .map(|d| d.id.as_str())
            .collect();
        let whole_resource = self
            .library
            .descriptions_in(source)
            .iter()
            .all(|id| used_ids.contains(id.as_str()));

        let (part_name, content_type, data) = if whole_resource {
            let data = self
                .library
                .read_source(source)
                .map_err(|e| CircuitPackError::Resource {
                    location: source.to_string(),
                    source: e,
                })?;
            let file_name = source.file_name();
            (
                unique_part_name(store, COMPONENTS_DIR, file_name),
                resource_content_type(file_name),
                data,
            )
        } else {
            let data = self
                .library
                .encode_definition(description)
                .map_err(|e| CircuitPackError::Resource {
                    location: source.to_string(),
                    source: e,
                })?;
            let file_name = format!("{}.{}", description.name, DEFINITION_EXTENSION);
            (
                unique_part_name(store, COMPONENTS_DIR, &file_name),
                COMPONENT_BINARY_CONTENT_TYPE,
                data,
            )
        };

        store.write_part(&part_name, content_type, data)?;
        let relationship_id =
            store.add_relationship(DOCUMENT_PART, &part_name, COMPONENT_RELATIONSHIP_TYPE)?;
        if whole_resource {
            self.whole_embedded
                .insert(source.clone(), relationship_id.clone());
        }
        tracing::debug!(
            "Embedded {} as {} ({})",
            source,
            part_name,
            if whole_resource { "whole resource" } else { "single definition" }
        );

        Ok(EmbeddedPart {
            part_name,
            relationship_id,
            whole_resource,
        })
    }

    fn build_resolved(
        &mut self,
        r: DescriptionRef,
        description: &ComponentDescription,
        in_package: bool,
    ) -> ResolvedSource {
        let internal_id = self.next_id.to_string();
        self.next_id += 1;

        let configurations = description
            .metadata
            .configurations
            .iter()
            .filter_map(|c| {
                let implementation = c.implementation()?;
                self.document
                    .components_using(r)
                    .any(|comp| c.matches(&comp.properties))
                    .then(|| (c.name.clone(), implementation.to_string()))
            })
            .collect();

        ResolvedSource {
            internal_id,
            external_id: in_package.then(|| description.id.clone()),
            name: description.name.clone(),
            guid: description.guid,
            implementation_name: description.metadata.implement_item.clone(),
            configurations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::InMemoryLibrary;
    use crate::model::{Component, Configuration, Point};
    use crate::package::MemoryPackage;

    fn place(doc: &mut Document, r: DescriptionRef) {
        doc.add_component(Component::new(r, Point::default()));
    }

    fn options(embed: EmbedComponents) -> SaveOptions {
        SaveOptions {
            embed_components: embed,
            ..SaveOptions::default()
        }
    }

    #[test]
    fn test_whole_resource_embedded_once() {
        let mut doc = Document::default();
        let r = doc.add_description(
            ComponentDescription::new("r", "Resistor").with_source("/lib/passives.xml"),
        );
        let c = doc.add_description(
            ComponentDescription::new("c", "Capacitor").with_source("/lib/passives.xml"),
        );
        place(&mut doc, r);
        place(&mut doc, c);
        place(&mut doc, r);

        let mut lib = InMemoryLibrary::new();
        lib.add_resource("/lib/passives.xml", b"<lib />".to_vec(), &["r", "c"]);

        let opts = options(EmbedComponents::All);
        let mut store = MemoryPackage::new();
        let res = DescriptionResolver::new(&doc, &lib, &opts).resolve(&mut store).unwrap();

        assert_eq!(res.embedded.len(), 1);
        assert!(res.embedded[0].whole_resource);
        assert_eq!(res.embedded[0].part_name, "/circuitdiagram/components/passives.xml");
        assert_eq!(res.locations.len(), 1);
        assert_eq!(res.locations[0].relationship_id.as_deref(), Some("rId1"));
        assert_eq!(res.resolved(r).unwrap().internal_id, "0");
        assert_eq!(res.resolved(c).unwrap().internal_id, "1");
        assert_eq!(res.resolved(c).unwrap().external_id.as_deref(), Some("c"));
        assert_eq!(
            store.read_part("/circuitdiagram/components/passives.xml").unwrap(),
            b"<lib />".to_vec()
        );
    }

    #[test]
    fn test_partial_use_embeds_single_definitions() {
        let mut doc = Document::default();
        let r = doc.add_description(
            ComponentDescription::new("r", "Variable Resistor").with_source("/lib/passives.xml"),
        );
        let c = doc.add_description(
            ComponentDescription::new("c", "Variable Resistor").with_source("/lib/passives.xml"),
        );
        place(&mut doc, r);
        place(&mut doc, c);

        let mut lib = InMemoryLibrary::new();
        lib.add_resource("/lib/passives.xml", b"<lib />".to_vec(), &["r", "c", "l"]);

        let opts = options(EmbedComponents::All);
        let mut store = MemoryPackage::new();
        let res = DescriptionResolver::new(&doc, &lib, &opts).resolve(&mut store).unwrap();

        let names: Vec<&str> = res.embedded.iter().map(|e| e.part_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "/circuitdiagram/components/Variable_Resistor.cdcom",
                "/circuitdiagram/components/Variable_Resistor1.cdcom",
            ]
        );
        assert!(res.embedded.iter().all(|e| !e.whole_resource));
        // different relationship ids -> separate groups
        assert_eq!(res.locations.len(), 2);
    }

    #[test]
    fn test_automatic_skips_common_and_reuses_embedded() {
        let mut doc = Document::default();
        let common = doc.add_description(
            ComponentDescription::new("g", "Ground").with_source("/std/ground.xml"),
        );
        let custom = doc.add_description(
            ComponentDescription::new("x", "Widget").with_source("/mine/widget.xml"),
        );
        place(&mut doc, common);
        place(&mut doc, custom);

        let mut lib = InMemoryLibrary::new();
        lib.add_resource("/std/ground.xml", b"<g />".to_vec(), &["g"])
            .add_resource("/mine/widget.xml", b"<x />".to_vec(), &["x"])
            .mark_common("/std/ground.xml");

        let opts = options(EmbedComponents::Automatic);
        let mut store = MemoryPackage::new();
        let res = DescriptionResolver::new(&doc, &lib, &opts).resolve(&mut store).unwrap();

        assert_eq!(res.embedded.len(), 1);
        assert_eq!(res.resolved(common).unwrap().external_id, None);
        assert_eq!(res.resolved(custom).unwrap().external_id.as_deref(), Some("x"));
        assert!(!store.contains_part("/circuitdiagram/components/ground.xml"));
    }

    #[test]
    fn test_custom_policy_reuses_whole_resource_for_unlisted() {
        let mut doc = Document::default();
        let a = doc.add_description(ComponentDescription::new("a", "A").with_source("/lib/ab.xml"));
        let b = doc.add_description(ComponentDescription::new("b", "B").with_source("/lib/ab.xml"));
        place(&mut doc, a);
        place(&mut doc, b);

        let mut lib = InMemoryLibrary::new();
        lib.add_resource("/lib/ab.xml", b"<ab />".to_vec(), &["a", "b"]);

        let mut opts = options(EmbedComponents::Custom);
        opts.custom_embed_components.insert(a);
        let mut store = MemoryPackage::new();
        let res = DescriptionResolver::new(&doc, &lib, &opts).resolve(&mut store).unwrap();

        assert_eq!(res.embedded.len(), 1);
        let id_a = res.resolved(a).unwrap();
        let id_b = res.resolved(b).unwrap();
        assert_eq!(id_b.external_id.as_deref(), Some("b"));
        assert_eq!(res.locations.len(), 1);
        assert_eq!(res.locations[0].sources, vec![id_a.clone(), id_b.clone()]);
    }

    #[test]
    fn test_pure_reference_groups_by_implement_set() {
        let mut doc = Document::default();
        let a = doc.add_description(
            ComponentDescription::new("a", "A")
                .with_source("/one.xml")
                .with_implement_set("urn:set"),
        );
        let b = doc.add_description(
            ComponentDescription::new("b", "B")
                .with_source("/two.xml")
                .with_implement_set("urn:set"),
        );
        let c = doc.add_description(ComponentDescription::new("c", "C").with_source("/three.xml"));
        place(&mut doc, a);
        place(&mut doc, b);
        place(&mut doc, c);

        let opts = options(EmbedComponents::Custom);
        let mut store = MemoryPackage::new();
        let lib = InMemoryLibrary::new();
        let res = DescriptionResolver::new(&doc, &lib, &opts).resolve(&mut store).unwrap();

        assert!(res.embedded.is_empty());
        assert_eq!(res.locations.len(), 2);
        assert_eq!(res.locations[0].implement_set.as_deref(), Some("urn:set"));
        assert_eq!(res.locations[0].sources.len(), 2);
        assert_eq!(res.locations[1].sources[0].internal_id, "2");
        assert_eq!(store.part_count(), 0);
    }

    #[test]
    fn test_configurations_filtered_by_use() {
        let mut doc = Document::default();
        let r = doc.add_description(
            ComponentDescription::new("r", "Resistor")
                .with_source("/lib/r.xml")
                .with_implement_item("resistor")
                .with_configuration(
                    Configuration::new("Variable")
                        .with_implementation("var")
                        .with_setter("variable", true),
                )
                .with_configuration(
                    Configuration::new("Potentiometer")
                        .with_implementation("pot")
                        .with_setter("pot", true),
                )
                .with_configuration(Configuration::new("Unnamed").with_setter("variable", true)),
        );
        doc.add_component(Component::new(r, Point::default()).with_property("variable", true));
        doc.add_component(Component::new(r, Point::default()));

        let opts = options(EmbedComponents::Custom);
        let mut store = MemoryPackage::new();
        let lib = InMemoryLibrary::new();
        let res = DescriptionResolver::new(&doc, &lib, &opts).resolve(&mut store).unwrap();

        let resolved = res.resolved(r).unwrap();
        assert_eq!(resolved.implementation_name.as_deref(), Some("resistor"));
        assert_eq!(resolved.configurations, vec![("Variable".to_string(), "var".to_string())]);
    }

    #[test]
    fn test_missing_resource_is_fatal() {
        let mut doc = Document::default();
        let r = doc.add_description(ComponentDescription::new("r", "R").with_source("/gone.xml"));
        place(&mut doc, r);

        let opts = options(EmbedComponents::All);
        let mut store = MemoryPackage::new();
        let lib = InMemoryLibrary::new();
        let result = DescriptionResolver::new(&doc, &lib, &opts).resolve(&mut store);

        assert!(matches!(result, Err(CircuitPackError::Resource { .. })));
    }

    #[test]
    fn test_description_without_source_is_unresolved() {
        let mut doc = Document::default();
        let r = doc.add_description(ComponentDescription::new("legacy", "Legacy"));
        place(&mut doc, r);

        let opts = options(EmbedComponents::All);
        let mut store = MemoryPackage::new();
        let lib = InMemoryLibrary::new();
        let res = DescriptionResolver::new(&doc, &lib, &opts).resolve(&mut store).unwrap();

        assert!(res.resolved(r).is_none());
        assert!(res.locations.is_empty());
    }
}
