//! Post-decode validation hook
//!
//! Every node finished by either decode path runs through an optional
//! [`NodeValidator`]. Failures are domain problems, not stream corruption:
//! they are reported on a separate channel and never abort decoding.

use crate::tree::{EmberTree, NodeId};
use ember_ber::BerTag;
use ember_core::identifier;

/// Validation hook applied to every completely built node
pub trait NodeValidator {
    /// Check a finished node; return a descriptive message on failure.
    fn validate(&self, tree: &EmberTree, node: NodeId) -> Result<(), String>;
}

/// Non-fatal validation failure collected by the one-shot decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub node: NodeId,
    pub message: String,
}

/// Validator checking identifier syntax on selected string leaves
///
/// UTF-8 leaves whose tag is in the configured set must hold a well-formed
/// identifier (leading letter or underscore, then letters, digits and
/// underscores). Other nodes pass unchecked.
#[derive(Debug, Clone)]
pub struct IdentifierValidator {
    tags: Vec<BerTag>,
}

impl IdentifierValidator {
    /// Validate identifier syntax on string leaves with the given tags.
    pub fn new(tags: Vec<BerTag>) -> Self {
        Self { tags }
    }
}

impl NodeValidator for IdentifierValidator {
    fn validate(&self, tree: &EmberTree, node: NodeId) -> Result<(), String> {
        if !self.tags.contains(&tree.tag(node)) {
            return Ok(());
        }
        let Some(value) = tree.leaf_value(node) else {
            return Ok(());
        };
        let Some(text) = value.as_str() else {
            return Ok(());
        };
        if identifier::is_valid_identifier(text) {
            Ok(())
        } else {
            Err(format!("malformed identifier {:?}", text))
        }
    }
}
