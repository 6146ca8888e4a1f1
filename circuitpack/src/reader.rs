//! Reads a packaged document back into a flat, inspectable form.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::CircuitPackError;
use crate::format::*;
use crate::model::{DocumentMetadata, Orientation, Point, PropertyValue, Size};
use crate::package::{PartStore, ROOT};
use crate::xml::{parse_document, XmlElement};

/// One `<add>` entry of the definitions section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedDefinition {
    pub id: String,
    pub external_id: Option<String>,
    pub name: String,
    pub guid: Option<Uuid>,
    pub implementation_name: Option<String>,
    pub implement_set: Option<String>,
    pub relationship_id: Option<String>,
    /// Part the relationship points at, when the resource is in the package
    pub target: Option<String>,
    pub configurations: Vec<(String, String)>,
}

/// How a component names its type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TypeRef {
    Definition(String),
    Inline(String),
    Missing,
}

impl TypeRef {
    fn parse(tp: &str) -> Self {
        if tp.is_empty() {
            return TypeRef::Missing;
        }
        match parse_definition_reference(tp) {
            Some(id) => TypeRef::Definition(id.to_string()),
            None => TypeRef::Inline(tp.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedLayout {
    pub location: Point,
    pub orientation: Orientation,
    pub size: Option<f64>,
    pub flipped: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedComponent {
    pub type_ref: TypeRef,
    pub layout: Option<LoadedLayout>,
    pub configuration: Option<String>,
    pub properties: BTreeMap<String, PropertyValue>,
    /// (group id, connection name)
    pub connections: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoadedElement {
    Wire {
        location: Point,
        orientation: Orientation,
        length: f64,
    },
    Component(LoadedComponent),
}

impl LoadedElement {
    pub fn as_component(&self) -> Option<&LoadedComponent> {
        match self {
            LoadedElement::Component(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedDocument {
    pub version: String,
    pub size: Size,
    pub metadata: DocumentMetadata,
    pub definitions: Vec<LoadedDefinition>,
    pub elements: Vec<LoadedElement>,
}

impl LoadedDocument {
    pub fn definition(&self, id: &str) -> Option<&LoadedDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn components(&self) -> impl Iterator<Item = &LoadedComponent> {
        self.elements.iter().filter_map(|e| e.as_component())
    }
}

pub struct DocumentReader;

impl DocumentReader {
    pub fn read(store: &dyn PartStore) -> Result<LoadedDocument, CircuitPackError> {
        let document_rel = store
            .relationship_by_type(ROOT, DOCUMENT_RELATIONSHIP_TYPE)
            .ok_or_else(|| {
                CircuitPackError::Format("package has no document relationship".into())
            })?;
        let bytes = store.read_part(&document_rel.target)?;
        let root = parse_document(&bytes)?;
        if root.name != "circuit" {
            return Err(CircuitPackError::Format(format!(
                "unexpected root element <{}>",
                root.name
            )));
        }

        let version = root.attribute("version").unwrap_or_default().to_string();
        let size = read_size(&root)?;

        let mut definitions = Vec::new();
        if let Some(defs) = root.find("definitions") {
            for src in defs.find_all("src") {
                let relationship_id = src.attribute("r:id").map(|s| s.to_string());
                let target = relationship_id
                    .as_deref()
                    .and_then(|id| store.relationship_by_id(&document_rel.target, id))
                    .map(|r| r.target);
                for add in src.find_all("add") {
                    definitions.push(read_definition(
                        add,
                        src,
                        relationship_id.clone(),
                        target.clone(),
                    )?);
                }
            }
        }

        let mut elements = Vec::new();
        if let Some(els) = root.find("elements") {
            for el in els.elements() {
                match el.name.as_str() {
                    "w" => elements.push(read_wire(el)?),
                    "c" => elements.push(LoadedElement::Component(read_component(el)?)),
                    other => tracing::debug!("Skipping unknown element <{}>", other),
                }
            }
        }

        let metadata = read_metadata(store)?;

        Ok(LoadedDocument {
            version,
            size,
            metadata,
            definitions,
            elements,
        })
    }
}

fn required<'a>(el: &'a XmlElement, key: &str) -> Result<&'a str, CircuitPackError> {
    el.attribute(key).ok_or_else(|| {
        CircuitPackError::Format(format!("<{}> is missing attribute '{}'", el.name, key))
    })
}

fn number(text: &str, what: &str) -> Result<f64, CircuitPackError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| CircuitPackError::Format(format!("invalid number for {}: '{}'", what, text)))
}

fn orientation(el: &XmlElement) -> Result<Orientation, CircuitPackError> {
    let tag = required(el, "o")?;
    Orientation::from_tag(tag)
        .ok_or_else(|| CircuitPackError::Format(format!("invalid orientation '{}'", tag)))
}

fn read_size(root: &XmlElement) -> Result<Size, CircuitPackError> {
    let mut size = Size::default();
    if let Some(props) = root.find("properties") {
        if let Some(w) = props.find("width") {
            size.width = number(&w.text_content(), "width")?;
        }
        if let Some(h) = props.find("height") {
            size.height = number(&h.text_content(), "height")?;
        }
    }
    Ok(size)
}

fn read_metadata(store: &dyn PartStore) -> Result<DocumentMetadata, CircuitPackError> {
    let Some(rel) = store.relationship_by_type(ROOT, CORE_PROPERTIES_RELATIONSHIP_TYPE) else {
        return Ok(DocumentMetadata::default());
    };
    let root = parse_document(&store.read_part(&rel.target)?)?;
    let text = |name: &str| root.find(name).map(|e| e.text_content());

    let created = match text("dcterms:created") {
        Some(t) => Some(
            DateTime::parse_from_rfc3339(&t)
                .map_err(|e| {
                    CircuitPackError::Format(format!("invalid created date '{}': {}", t, e))
                })?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    Ok(DocumentMetadata {
        title: text("dc:title"),
        creator: text("dc:creator"),
        description: text("dc:description"),
        created,
    })
}

fn read_definition(
    add: &XmlElement,
    src: &XmlElement,
    relationship_id: Option<String>,
    target: Option<String>,
) -> Result<LoadedDefinition, CircuitPackError> {
    let guid = match add.attribute("guid") {
        Some(g) => Some(
            Uuid::parse_str(g)
                .map_err(|e| CircuitPackError::Format(format!("invalid guid '{}': {}", g, e)))?,
        ),
        None => None,
    };
    let configurations = match add.find("configurations") {
        Some(cfgs) => cfgs
            .find_all("add")
            .map(|c| Ok((required(c, "name")?.to_string(), required(c, "item")?.to_string())))
            .collect::<Result<Vec<_>, CircuitPackError>>()?,
        None => Vec::new(),
    };

    Ok(LoadedDefinition {
        id: required(add, "id")?.to_string(),
        external_id: add.attribute("xid").map(|s| s.to_string()),
        name: required(add, "name")?.to_string(),
        guid,
        implementation_name: add.attribute("item").map(|s| s.to_string()),
        implement_set: src.attribute("col").map(|s| s.to_string()),
        relationship_id,
        target,
        configurations,
    })
}

fn read_wire(el: &XmlElement) -> Result<LoadedElement, CircuitPackError> {
    Ok(LoadedElement::Wire {
        location: Point::new(number(required(el, "x")?, "x")?, number(required(el, "y")?, "y")?),
        orientation: orientation(el)?,
        length: number(required(el, "sz")?, "sz")?,
    })
}

fn read_component(el: &XmlElement) -> Result<LoadedComponent, CircuitPackError> {
    let type_ref = TypeRef::parse(required(el, "tp")?);

    let layout = match (el.attribute("x"), el.attribute("y")) {
        (Some(x), Some(y)) => Some(LoadedLayout {
            location: Point::new(number(x, "x")?, number(y, "y")?),
            orientation: orientation(el)?,
            size: el.attribute("sz").map(|s| number(s, "sz")).transpose()?,
            flipped: el.attribute("flp").map(|f| f == "true"),
        }),
        _ => None,
    };

    let mut configuration = None;
    let mut properties = BTreeMap::new();
    if let Some(prs) = el.find("prs") {
        configuration = prs
            .find("cfg")
            .and_then(|c| c.attribute("name"))
            .map(|s| s.to_string());
        for p in prs.find_all("p") {
            let key = required(p, "k")?;
            let value = PropertyValue::from_serialized(required(p, "v")?, p.attribute("t"));
            properties.insert(key.to_string(), value);
        }
    }

    let connections = match el.find("cns") {
        Some(cns) => cns
            .find_all("cn")
            .map(|cn| Ok((required(cn, "id")?.to_string(), required(cn, "pt")?.to_string())))
            .collect::<Result<Vec<_>, CircuitPackError>>()?,
        None => Vec::new(),
    };

    Ok(LoadedComponent {
        type_ref,
        layout,
        configuration,
        properties,
        connections,
    })
}
