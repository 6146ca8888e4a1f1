//! Document Model
//!
//! Read-only representation of a circuit drawing handed to the packager:
//! an ordered list of placed elements (wires and components) plus the table
//! of component descriptions those components refer to. Connectivity is never
//! stored here; it is implied by coincident connection points.

pub mod description;

pub use description::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix marking a property as internal. Internal properties are never
/// written to a package.
pub const INTERNAL_PROPERTY_PREFIX: char = '@';

/// Internal property holding the inline type tag of a component whose
/// description cannot be resolved to a definition.
pub const INLINE_TYPE_PROPERTY: &str = "@type";

/// Precision used to decide whether two points coincide (1/1000 unit).
const COINCIDENCE_SCALE: f64 = 1000.0;

/// A position on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Fixed-precision key; two points with the same key are coincident.
    pub fn key(&self) -> PointKey {
        PointKey(
            (self.x * COINCIDENCE_SCALE).round() as i64,
            (self.y * COINCIDENCE_SCALE).round() as i64,
        )
    }

    pub fn offset(&self, orientation: Orientation, distance: f64) -> Point {
        match orientation {
            Orientation::Horizontal => Point::new(self.x + distance, self.y),
            Orientation::Vertical => Point::new(self.x, self.y + distance),
        }
    }
}

/// Quantized point used for coincidence tests and hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointKey(pub i64, pub i64);

/// Canvas size of a document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: 640.0,
            height: 480.0,
        }
    }
}

/// Orientation of a wire or component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

impl Orientation {
    /// Short tag used in the document part (`h` / `v`).
    pub fn tag(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "h",
            Orientation::Vertical => "v",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "h" => Some(Orientation::Horizontal),
            "v" => Some(Orientation::Vertical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Horizontal => write!(f, "Horizontal"),
            Orientation::Vertical => write!(f, "Vertical"),
        }
    }
}

/// Property value that can hold different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Numeric(f64),
    String(String),
}

impl PropertyValue {
    /// Type hint written alongside non-string values (`n`, `b`).
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            PropertyValue::String(_) => None,
            PropertyValue::Numeric(_) => Some("n"),
            PropertyValue::Boolean(_) => Some("b"),
        }
    }

    /// Rebuild a value from its serialized text and optional type hint.
    /// Unknown or unparsable hints fall back to a string value.
    pub fn from_serialized(text: &str, type_tag: Option<&str>) -> Self {
        match type_tag {
            Some("n") => text
                .parse::<f64>()
                .map(PropertyValue::Numeric)
                .unwrap_or_else(|_| PropertyValue::String(text.to_string())),
            Some("b") => match text {
                "true" => PropertyValue::Boolean(true),
                "false" => PropertyValue::Boolean(false),
                _ => PropertyValue::String(text.to_string()),
            },
            _ => PropertyValue::String(text.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Numeric(n) => write!(f, "{}", n),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Numeric(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

/// Returns true when a property key is internal and must not be emitted.
pub fn is_internal_property(key: &str) -> bool {
    key.starts_with(INTERNAL_PROPERTY_PREFIX)
}

/// A wire segment. Wires carry no identity beyond their geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    /// Start point
    pub location: Point,
    #[serde(default)]
    pub orientation: Orientation,
    pub length: f64,
}

impl Wire {
    pub fn new(location: Point, orientation: Orientation, length: f64) -> Self {
        Self {
            location,
            orientation,
            length,
        }
    }

    pub fn end(&self) -> Point {
        self.location.offset(self.orientation, self.length)
    }
}

/// A named connection point of a placed component, in absolute coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPoint {
    pub name: String,
    pub location: Point,
}

impl ConnectionPoint {
    pub fn new(name: impl Into<String>, location: Point) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }
}

/// A placed component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub description: DescriptionRef,
    pub location: Point,
    #[serde(default)]
    pub orientation: Orientation,
    /// Present only for resizable components
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Present only for flippable components
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flipped: Option<bool>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub connections: Vec<ConnectionPoint>,
}

impl Component {
    pub fn new(description: DescriptionRef, location: Point) -> Self {
        Self {
            description,
            location,
            orientation: Orientation::Horizontal,
            size: None,
            flipped: None,
            properties: BTreeMap::new(),
            connections: Vec::new(),
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_flipped(mut self, flipped: bool) -> Self {
        self.flipped = Some(flipped);
        self
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add a connection point at an offset from the component location.
    pub fn with_connection(mut self, name: impl Into<String>, dx: f64, dy: f64) -> Self {
        let location = Point::new(self.location.x + dx, self.location.y + dy);
        self.connections.push(ConnectionPoint::new(name, location));
        self
    }

    /// Inline type tag from the internal `@type` property, if any.
    pub fn inline_type(&self) -> Option<&str> {
        self.properties
            .get(INLINE_TYPE_PROPERTY)
            .and_then(|v| v.as_str())
    }

    /// Properties that are written to a package, in key order.
    pub fn public_properties(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.properties
            .iter()
            .filter(|(k, _)| !is_internal_property(k))
    }
}

/// A placed drawing primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Element {
    Wire(Wire),
    Component(Component),
}

impl Element {
    pub fn as_wire(&self) -> Option<&Wire> {
        match self {
            Element::Wire(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&Component> {
        match self {
            Element::Component(c) => Some(c),
            _ => None,
        }
    }
}

/// Optional descriptive metadata written to the core properties part
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<chrono::DateTime<chrono::Utc>>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.creator.is_none()
            && self.description.is_none()
            && self.created.is_none()
    }
}

/// A circuit drawing: canvas size, description table and ordered elements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub size: Size,
    #[serde(default, skip_serializing_if = "DocumentMetadata::is_empty")]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub descriptions: Vec<ComponentDescription>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Document {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Register a description and return the reference components use.
    pub fn add_description(&mut self, description: ComponentDescription) -> DescriptionRef {
        self.descriptions.push(description);
        DescriptionRef(self.descriptions.len() - 1)
    }

    pub fn add_element(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn add_wire(&mut self, wire: Wire) {
        self.elements.push(Element::Wire(wire));
    }

    pub fn add_component(&mut self, component: Component) {
        self.elements.push(Element::Component(component));
    }

    pub fn description(&self, r: DescriptionRef) -> Option<&ComponentDescription> {
        self.descriptions.get(r.0)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.elements.iter().filter_map(|e| e.as_component())
    }

    /// Distinct descriptions used by components, in first-seen order.
    pub fn used_descriptions(&self) -> Vec<DescriptionRef> {
        let mut seen = std::collections::HashSet::new();
        self.components()
            .map(|c| c.description)
            .filter(|r| seen.insert(*r))
            .collect()
    }

    /// Components placed with the given description.
    pub fn components_using(&self, r: DescriptionRef) -> impl Iterator<Item = &Component> {
        self.components().filter(move |c| c.description == r)
    }
}
