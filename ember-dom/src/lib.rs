//! DOM tree model for Ember+
//!
//! The tree is an arena of nodes addressed by stable [`NodeId`] handles;
//! a node stores its parent's handle instead of an owning back-reference,
//! so dirty propagation is an iterative walk up the handle chain.
//!
//! Decoding comes in two flavors producing identical trees: the incremental
//! [`builder::DomBuilder`] driven by streaming decode events, and the
//! one-shot [`decode::TreeDecoder`] over a complete in-memory buffer. Both
//! dispatch application-defined types through the same
//! [`factory::ApplicationTypes`] hook and run every finished node through an
//! optional [`validate::NodeValidator`].

pub mod builder;
pub mod decode;
pub mod factory;
pub mod tree;
pub mod validate;

pub use builder::{DomBuilder, DomEvent};
pub use decode::{decode_tree, TreeDecoder};
pub use factory::{resolve_template, ApplicationTypes, GenericTypes, NodeTemplate};
pub use tree::{EmberTree, NodeId};
pub use validate::{IdentifierValidator, NodeValidator, ValidationIssue};
