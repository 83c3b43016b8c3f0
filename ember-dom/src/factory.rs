//! Application type dispatch
//!
//! Application schemas (Glow being the usual one) register their types here:
//! the core maps an application-defined BER type number to a construction
//! template through the [`ApplicationTypes`] hook and otherwise has no
//! knowledge of the schema. Universal types dispatch through a fixed
//! built-in match with no extension point.

use ember_ber::types::universal;
use ember_ber::{application_number, is_application_defined};
use ember_core::LeafKind;

/// Construction template for a decoded node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTemplate {
    /// Sequence container; `is_ordered` requests tag order at encode time.
    Sequence { is_ordered: bool },
    /// Set container.
    Set,
    /// Generic container (the application fallback).
    Container,
    /// Leaf holding a primitive of the given kind.
    Leaf(LeafKind),
}

impl NodeTemplate {
    /// Check whether the template describes a container.
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeTemplate::Leaf(_))
    }
}

/// Mapping from application-defined type numbers to node templates
///
/// `template` receives the plain application number (flag stripped) and
/// returns `None` for unrecognized numbers, which fall back to a generic
/// container or octet-string leaf. The same instance must serve both the
/// streaming and the one-shot decode path so they build identical trees.
pub trait ApplicationTypes {
    fn template(&self, number: u32) -> Option<NodeTemplate>;
}

/// Factory recognizing no application types; everything decodes through the
/// generic fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericTypes;

impl ApplicationTypes for GenericTypes {
    fn template(&self, _number: u32) -> Option<NodeTemplate> {
        None
    }
}

/// Template for a universal type number.
pub fn universal_template(number: u32, is_container: bool) -> NodeTemplate {
    match number {
        universal::BOOLEAN => NodeTemplate::Leaf(LeafKind::Boolean),
        universal::INTEGER => NodeTemplate::Leaf(LeafKind::Integer),
        universal::REAL => NodeTemplate::Leaf(LeafKind::Real),
        universal::UTF8_STRING => NodeTemplate::Leaf(LeafKind::Utf8String),
        universal::OCTET_STRING => NodeTemplate::Leaf(LeafKind::OctetString),
        universal::OBJECT_IDENTIFIER => NodeTemplate::Leaf(LeafKind::ObjectIdentifier),
        universal::RELATIVE_OID => NodeTemplate::Leaf(LeafKind::RelativeOid),
        universal::SEQUENCE => NodeTemplate::Sequence { is_ordered: false },
        universal::SET => NodeTemplate::Set,
        _ if is_container => NodeTemplate::Container,
        _ => NodeTemplate::Leaf(LeafKind::OctetString),
    }
}

/// Resolve the construction template for a decoded item.
///
/// The wire's container flag wins over the factory: a template whose shape
/// contradicts the flag is replaced by the generic fallback, so malformed or
/// unexpected input never derails construction.
pub fn resolve_template<F>(factory: &F, type_number: u32, is_container: bool) -> NodeTemplate
where
    F: ApplicationTypes + ?Sized,
{
    let template = if is_application_defined(type_number) {
        factory.template(application_number(type_number))
    } else {
        Some(universal_template(type_number, is_container))
    };
    match template {
        Some(template) if template.is_container() == is_container => template,
        _ if is_container => NodeTemplate::Container,
        _ => NodeTemplate::Leaf(LeafKind::OctetString),
    }
}
