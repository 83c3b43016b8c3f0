//! Incremental DOM builder
//!
//! Bridges streaming decode events to tree construction. The builder keeps
//! the container currently being filled; when the root container closes it
//! hands ownership of the finished tree to the caller through a
//! [`DomEvent::RootReady`] and immediately starts fresh, so one builder can
//! decode a whole stream of trees.

use crate::factory::{resolve_template, ApplicationTypes, NodeTemplate};
use crate::tree::{EmberTree, NodeId};
use crate::validate::NodeValidator;
use ember_ber::{codes, DecodeEvent, StreamBerReader};
use ember_core::{EmberError, EmberResult, LeafKind};
use std::collections::VecDeque;
use std::mem;

/// Event emitted by the builder
#[derive(Debug)]
pub enum DomEvent {
    /// A node (leaf or closed container) is completely built.
    NodeReady(NodeId),
    /// A top-level tree is complete; ownership moves to the caller.
    RootReady(EmberTree),
    /// The post-decode validation hook rejected a node. Non-fatal: the
    /// tree keeps building.
    ValidationError { node: NodeId, message: String },
}

/// Builds [`EmberTree`]s from streaming decode events
pub struct DomBuilder<F: ApplicationTypes> {
    factory: F,
    validator: Option<Box<dyn NodeValidator>>,
    tree: EmberTree,
    current: Option<NodeId>,
    events: VecDeque<DomEvent>,
}

impl<F: ApplicationTypes> DomBuilder<F> {
    /// Create a builder dispatching application types through `factory`.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            validator: None,
            tree: EmberTree::new(),
            current: None,
            events: VecDeque::new(),
        }
    }

    /// Attach a post-decode validation hook.
    pub fn with_validator(mut self, validator: Box<dyn NodeValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Apply one decode event to the tree under construction.
    ///
    /// Errors are structural and fatal to the current tree: call
    /// [`reset`](DomBuilder::reset) before applying further events.
    pub fn apply(&mut self, event: DecodeEvent) -> EmberResult<()> {
        match event {
            DecodeEvent::ContainerStart {
                tag, type_number, ..
            } => {
                let template = resolve_template(&self.factory, type_number, true);
                let id = self.tree.new_node(tag, type_number, template);
                match self.current {
                    None => self.tree.set_root(id),
                    Some(current) => self.tree.insert(current, id),
                }
                self.current = Some(id);
            }
            DecodeEvent::ItemReady(item) if item.is_container => {
                let Some(current) = self.current else {
                    return Err(EmberError::Decode {
                        code: codes::UNEXPECTED_TERMINATOR,
                        message: "container close without an open container".to_string(),
                        trace: "root".to_string(),
                    });
                };
                self.validate(current);
                if self.tree.root() == Some(current) {
                    let tree = mem::take(&mut self.tree);
                    self.current = None;
                    self.events.push_back(DomEvent::RootReady(tree));
                } else {
                    self.events.push_back(DomEvent::NodeReady(current));
                    self.current = self.tree.parent(current);
                }
            }
            DecodeEvent::ItemReady(item) => {
                let Some(current) = self.current else {
                    return Err(EmberError::Decode {
                        code: codes::INVALID_OUTER_TAG,
                        message: "primitive value outside any container".to_string(),
                        trace: "root".to_string(),
                    });
                };
                let kind = match resolve_template(&self.factory, item.type_number, false) {
                    NodeTemplate::Leaf(kind) => kind,
                    _ => LeafKind::OctetString,
                };
                let value = ember_ber::value::parse_leaf_value(kind, &item.value)?;
                let id = self.tree.new_typed_leaf(item.tag, item.type_number, value);
                self.tree.insert(current, id);
                self.validate(id);
                self.events.push_back(DomEvent::NodeReady(id));
            }
        }
        Ok(())
    }

    /// Drain all pending events from a reader into the builder.
    pub fn feed_from(&mut self, reader: &mut StreamBerReader) -> EmberResult<()> {
        while let Some(event) = reader.next_event() {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Pop the next pending builder event.
    pub fn next_event(&mut self) -> Option<DomEvent> {
        self.events.pop_front()
    }

    /// The tree currently under construction (empty between trees).
    pub fn tree(&self) -> &EmberTree {
        &self.tree
    }

    /// Check whether a tree is mid-construction.
    pub fn in_progress(&self) -> bool {
        self.current.is_some()
    }

    /// Discard the partial tree and all pending events.
    pub fn reset(&mut self) {
        self.tree = EmberTree::new();
        self.current = None;
        self.events.clear();
    }

    fn validate(&mut self, id: NodeId) {
        if let Some(validator) = &self.validator {
            if let Err(message) = validator.validate(&self.tree, id) {
                self.events
                    .push_back(DomEvent::ValidationError { node: id, message });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::GenericTypes;
    use crate::validate::NodeValidator;
    use ember_ber::BerTag;
    use ember_core::MemoryBuffer;

    fn encoded(tree: &mut EmberTree) -> Vec<u8> {
        let mut sink = MemoryBuffer::new();
        tree.encode(&mut sink).unwrap();
        sink.into_bytes()
    }

    fn build_sample() -> (EmberTree, Vec<u8>) {
        let mut tree = EmberTree::new();
        let root = tree.new_sequence(BerTag::application(1));
        let inner = tree.new_set(BerTag::context(0));
        let name = tree.new_leaf(BerTag::context(0), "psu");
        let level = tree.new_leaf(BerTag::context(1), -12i32);
        tree.insert(root, inner);
        tree.insert(inner, name);
        tree.insert(inner, level);
        tree.set_root(root);
        let bytes = encoded(&mut tree);
        (tree, bytes)
    }

    fn decode_via_builder(bytes: &[u8]) -> EmberTree {
        let mut reader = StreamBerReader::new();
        let mut builder = DomBuilder::new(GenericTypes);
        reader.feed(bytes).unwrap();
        builder.feed_from(&mut reader).unwrap();
        loop {
            match builder.next_event() {
                Some(DomEvent::RootReady(tree)) => return tree,
                Some(_) => continue,
                None => panic!("no root produced"),
            }
        }
    }

    #[test]
    fn test_builder_round_trip() {
        let (_, bytes) = build_sample();
        let mut decoded = decode_via_builder(&bytes);
        assert_eq!(encoded(&mut decoded), bytes);
    }

    #[test]
    fn test_builder_reports_leaves_before_root() {
        let (_, bytes) = build_sample();
        let mut reader = StreamBerReader::new();
        let mut builder = DomBuilder::new(GenericTypes);
        reader.feed(&bytes).unwrap();
        builder.feed_from(&mut reader).unwrap();

        let mut ready = 0;
        let mut roots = 0;
        while let Some(event) = builder.next_event() {
            match event {
                DomEvent::NodeReady(_) => {
                    assert_eq!(roots, 0, "nodes are reported before the root");
                    ready += 1;
                }
                DomEvent::RootReady(_) => roots += 1,
                DomEvent::ValidationError { .. } => {}
            }
        }
        // two leaves and the inner set, then the root
        assert_eq!(ready, 3);
        assert_eq!(roots, 1);
    }

    #[test]
    fn test_builder_decodes_consecutive_trees() {
        let (_, bytes) = build_sample();
        let mut reader = StreamBerReader::new();
        let mut builder = DomBuilder::new(GenericTypes);
        reader.feed(&bytes).unwrap();
        reader.feed(&bytes).unwrap();
        builder.feed_from(&mut reader).unwrap();
        let mut roots = 0;
        while let Some(event) = builder.next_event() {
            if matches!(event, DomEvent::RootReady(_)) {
                roots += 1;
            }
        }
        assert_eq!(roots, 2);
        assert!(!builder.in_progress());
    }

    #[test]
    fn test_decoded_set_preserves_wire_order_with_duplicates() {
        // Duplicate tags inside a SET must survive decoding: the builder
        // constructs sets out of safe mode.
        let mut tree = EmberTree::new();
        let root = tree.new_sequence(BerTag::application(1));
        let set = tree.new_node(
            BerTag::context(0),
            ember_ber::types::universal::SET,
            NodeTemplate::Set,
        );
        let a = tree.new_leaf(BerTag::context(7), 1i32);
        let b = tree.new_leaf(BerTag::context(7), 2i32);
        tree.insert(root, set);
        tree.insert(set, a);
        tree.insert(set, b);
        tree.set_root(root);
        let bytes = encoded(&mut tree);

        let decoded = decode_via_builder(&bytes);
        let droot = decoded.root().unwrap();
        let dset = decoded.children(droot)[0];
        assert_eq!(decoded.children(dset).len(), 2);
        let values: Vec<i64> = decoded
            .children(dset)
            .iter()
            .map(|&c| decoded.leaf_value(c).unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    struct RejectEverything;

    impl NodeValidator for RejectEverything {
        fn validate(&self, _tree: &EmberTree, _node: NodeId) -> Result<(), String> {
            Err("rejected".to_string())
        }
    }

    #[test]
    fn test_validation_errors_do_not_stop_decoding() {
        let (_, bytes) = build_sample();
        let mut reader = StreamBerReader::new();
        let mut builder = DomBuilder::new(GenericTypes).with_validator(Box::new(RejectEverything));
        reader.feed(&bytes).unwrap();
        builder.feed_from(&mut reader).unwrap();
        let mut validation_errors = 0;
        let mut roots = 0;
        while let Some(event) = builder.next_event() {
            match event {
                DomEvent::ValidationError { .. } => validation_errors += 1,
                DomEvent::RootReady(_) => roots += 1,
                DomEvent::NodeReady(_) => {}
            }
        }
        assert_eq!(roots, 1);
        // every node of the sample runs through the hook
        assert_eq!(validation_errors, 4);
    }

    #[test]
    fn test_primitive_at_top_level_is_an_error() {
        // outer C-0 / inner integer without any enclosing container
        let bytes = [0xA0, 0x03, 0x02, 0x01, 0x2A];
        let mut reader = StreamBerReader::new();
        let mut builder = DomBuilder::new(GenericTypes);
        reader.feed(&bytes).unwrap();
        assert!(builder.feed_from(&mut reader).is_err());
    }

    #[test]
    fn test_reset_discards_partial_tree() {
        let (_, bytes) = build_sample();
        let mut reader = StreamBerReader::new();
        let mut builder = DomBuilder::new(GenericTypes);
        reader.feed(&bytes[..6]).unwrap();
        builder.feed_from(&mut reader).unwrap();
        assert!(builder.in_progress());
        builder.reset();
        assert!(!builder.in_progress());
    }
}
