//! Component descriptions as seen by the packager.
//!
//! The description dialect itself is opaque here; a description is reduced
//! to its identity, the location it was loaded from and the metadata needed
//! to write the definitions section.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::PropertyValue;

/// Index of a description in [`super::Document::descriptions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptionRef(pub usize);

/// Opaque handle identifying where a description was loaded from.
/// Equal handles denote the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceLocation(pub String);

impl SourceLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the location (`/lib/Resistor.xml` -> `Resistor.xml`).
    pub fn file_name(&self) -> &str {
        self.0
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.0)
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named variant of a description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_name: Option<String>,
    /// Property values that select this configuration
    #[serde(default)]
    pub setters: BTreeMap<String, PropertyValue>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation_name: None,
            setters: BTreeMap::new(),
        }
    }

    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation_name = Some(implementation.into());
        self
    }

    pub fn with_setter(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.setters.insert(key.into(), value.into());
        self
    }

    /// Non-empty implementation name, if any.
    pub fn implementation(&self) -> Option<&str> {
        self.implementation_name
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    /// Whether every setter agrees with the given property values.
    pub fn matches(&self, properties: &BTreeMap<String, PropertyValue>) -> bool {
        self.setters
            .iter()
            .all(|(k, v)| properties.get(k) == Some(v))
    }
}

/// Metadata block of a description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptionMetadata {
    #[serde(default = "default_format_version")]
    pub format_version: String,
    /// Definition-source tag; descriptions sharing it are grouped together
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implement_set: Option<String>,
    /// Implementation name within the implement set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implement_item: Option<String>,
    #[serde(default)]
    pub configurations: Vec<Configuration>,
}

fn default_format_version() -> String {
    "1.2".to_string()
}

/// Identity of a component type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescription {
    /// Stable identifier of the description within its resource
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    #[serde(default)]
    pub metadata: DescriptionMetadata,
}

impl ComponentDescription {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            guid: None,
            source: None,
            metadata: DescriptionMetadata {
                format_version: default_format_version(),
                ..DescriptionMetadata::default()
            },
        }
    }

    pub fn with_guid(mut self, guid: Uuid) -> Self {
        self.guid = Some(guid);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(SourceLocation::new(source));
        self
    }

    pub fn with_implement_set(mut self, set: impl Into<String>) -> Self {
        self.metadata.implement_set = Some(set.into());
        self
    }

    pub fn with_implement_item(mut self, item: impl Into<String>) -> Self {
        self.metadata.implement_item = Some(item.into());
        self
    }

    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.metadata.configurations.push(configuration);
        self
    }

    /// First configuration matching the properties that has an implementation.
    pub fn active_configuration(
        &self,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> Option<&Configuration> {
        self.metadata
            .configurations
            .iter()
            .find(|c| c.implementation().is_some() && c.matches(properties))
    }
}
