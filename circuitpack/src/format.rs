//! Names, namespaces and content types of the container format.

/// Version tag written on the document root
pub const FORMAT_VERSION: &str = "1.4";

pub const DOCUMENT_NS: &str =
    "http://schemas.circuit-diagram.org/circuitDiagramDocument/2012/document";
pub const RELATIONSHIPS_ATTR_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub const DOCUMENT_PART: &str = "/circuitdiagram/Document.xml";
pub const COMPONENTS_DIR: &str = "/circuitdiagram/components";
pub const CORE_PROPERTIES_PART: &str = "/docProps/core.xml";

/// Extension of single-definition component parts
pub const DEFINITION_EXTENSION: &str = "cdcom";

pub const DOCUMENT_CONTENT_TYPE: &str = "application/vnd.circuitdiagram.document.main+xml";
pub const COMPONENT_XML_CONTENT_TYPE: &str = "application/vnd.circuitdiagram.component+xml";
pub const COMPONENT_BINARY_CONTENT_TYPE: &str = "application/vnd.circuitdiagram.component.binary";
pub const CORE_PROPERTIES_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-package.core-properties+xml";

pub const DOCUMENT_RELATIONSHIP_TYPE: &str = concat!(
    "http://schemas.circuit-diagram.org/circuitDiagramDocument/2012/relationships/",
    "circuitDiagramDocument"
);
pub const COMPONENT_RELATIONSHIP_TYPE: &str =
    "http://schemas.circuit-diagram.org/circuitDiagramDocument/2012/relationships/component";
pub const CORE_PROPERTIES_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";

pub const CORE_PROPERTIES_NS: &str =
    "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";

/// Content type of a whole embedded resource, chosen by its file extension.
pub fn resource_content_type(file_name: &str) -> &'static str {
    let is_xml = file_name
        .rsplit('.')
        .next()
        .map(|ext| ext.eq_ignore_ascii_case("xml"))
        .unwrap_or(false);
    if is_xml {
        COMPONENT_XML_CONTENT_TYPE
    } else {
        COMPONENT_BINARY_CONTENT_TYPE
    }
}

/// Back-reference to a resolved definition, as written in `tp`.
pub fn definition_reference(internal_id: &str) -> String {
    format!("{{{}}}", internal_id)
}

/// Inverse of [`definition_reference`].
pub fn parse_definition_reference(tp: &str) -> Option<&str> {
    tp.strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|s| !s.is_empty())
}
