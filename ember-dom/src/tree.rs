//! Arena-backed node tree with cached pre-encoding
//!
//! Containers cannot emit their headers until every descendant's encoded
//! length is known, so each node caches its encoded form and the cache is
//! invalidated bottom-up: any structural or value mutation walks the parent
//! handle chain and clears the cached form of every ancestor. A node whose
//! cache is absent is *dirty*; [`EmberTree::update`] recomputes caches
//! bottom-up and [`EmberTree::encode`] writes them out, so a stale cached
//! length is never emitted.

use crate::factory::NodeTemplate;
use ember_ber::types::universal;
use ember_ber::{type_tag, value, BerLength, BerTag};
use ember_core::{ByteSink, EmberError, EmberResult, LeafValue};
use std::collections::HashMap;

/// Stable handle of a node within its [`EmberTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeContent {
    Sequence {
        children: Vec<NodeId>,
        is_ordered: bool,
    },
    Set {
        children: Vec<NodeId>,
        by_tag: HashMap<BerTag, NodeId>,
        safe: bool,
    },
    Container {
        children: Vec<NodeId>,
    },
    Leaf(LeafValue),
}

#[derive(Debug, Clone)]
struct EncodedForm {
    /// Outer and inner header bytes; for leaves the complete TLV.
    header: Vec<u8>,
    /// Full encoded length of the node including children.
    total_length: usize,
}

#[derive(Debug, Clone)]
struct Node {
    tag: BerTag,
    type_number: u32,
    parent: Option<NodeId>,
    content: NodeContent,
    encoded: Option<EncodedForm>,
}

/// Node tree with single-owner semantics
///
/// A child belongs to exactly one container; moving a node requires
/// [`detach`](EmberTree::detach) before the next [`insert`](EmberTree::insert).
/// Child-mutation on leaves, duplicate tags in safe-mode sets and similar
/// misuse are programmer errors and panic.
#[derive(Debug, Clone, Default)]
pub struct EmberTree {
    nodes: Vec<Option<Node>>,
    root: Option<NodeId>,
}

impl EmberTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root node, if one has been set.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Make a parentless node the root of the tree.
    ///
    /// # Panics
    /// Panics if a root is already set or the node is attached to a parent.
    pub fn set_root(&mut self, id: NodeId) {
        assert!(self.root.is_none(), "tree already has a root");
        assert!(
            self.node(id).parent.is_none(),
            "root node must not have a parent"
        );
        self.root = Some(id);
    }

    /// Create an unordered sequence container (universal SEQUENCE type).
    pub fn new_sequence(&mut self, tag: BerTag) -> NodeId {
        self.new_node(tag, universal::SEQUENCE, NodeTemplate::Sequence { is_ordered: false })
    }

    /// Create a sequence whose children are written in tag order.
    ///
    /// The ordering applies at encode time only; decoded sequences always
    /// preserve wire order.
    pub fn new_ordered_sequence(&mut self, tag: BerTag) -> NodeId {
        self.new_node(tag, universal::SEQUENCE, NodeTemplate::Sequence { is_ordered: true })
    }

    /// Create a safe-mode set container (universal SET type): inserting two
    /// children with the same tag panics.
    pub fn new_set(&mut self, tag: BerTag) -> NodeId {
        let id = self.new_node(tag, universal::SET, NodeTemplate::Set);
        if let NodeContent::Set { safe, .. } = &mut self.node_mut(id).content {
            *safe = true;
        }
        id
    }

    /// Create a container node from a template, usually with an
    /// application-defined type number.
    ///
    /// Sets created this way are not in safe mode (the decode paths must
    /// preserve whatever arrives on the wire); use
    /// [`new_set`](EmberTree::new_set) for the checked variant.
    ///
    /// # Panics
    /// Panics when called with a leaf template; leaves carry a value and are
    /// created through [`new_leaf`](EmberTree::new_leaf).
    pub fn new_node(&mut self, tag: BerTag, type_number: u32, template: NodeTemplate) -> NodeId {
        let content = match template {
            NodeTemplate::Sequence { is_ordered } => NodeContent::Sequence {
                children: Vec::new(),
                is_ordered,
            },
            NodeTemplate::Set => NodeContent::Set {
                children: Vec::new(),
                by_tag: HashMap::new(),
                safe: false,
            },
            NodeTemplate::Container => NodeContent::Container {
                children: Vec::new(),
            },
            NodeTemplate::Leaf(_) => {
                panic!("leaf template requires a value; use new_leaf")
            }
        };
        self.push_node(Node {
            tag,
            type_number,
            parent: None,
            content,
            encoded: None,
        })
    }

    /// Create a leaf node; the type number derives from the value kind.
    pub fn new_leaf(&mut self, tag: BerTag, value: impl Into<LeafValue>) -> NodeId {
        let value = value.into();
        let type_number = value::universal_type_of(value.kind());
        self.new_typed_leaf(tag, type_number, value)
    }

    /// Create a leaf node with an explicit (application-defined) type number.
    pub fn new_typed_leaf(
        &mut self,
        tag: BerTag,
        type_number: u32,
        value: impl Into<LeafValue>,
    ) -> NodeId {
        self.push_node(Node {
            tag,
            type_number,
            parent: None,
            content: NodeContent::Leaf(value.into()),
            encoded: None,
        })
    }

    /// Insert a parentless node as the last child of a container.
    ///
    /// Marks the container and all its ancestors dirty.
    ///
    /// # Panics
    /// Panics when the parent is a leaf, the child is already attached,
    /// the insert would create a cycle, or a safe-mode set already holds a
    /// child with the same tag.
    pub fn insert(&mut self, parent: NodeId, child: NodeId) {
        assert!(
            self.node(child).parent.is_none(),
            "node is already attached to a parent"
        );
        let child_tag = self.node(child).tag;
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            assert!(id != child, "inserting a node into its own subtree");
            cursor = self.node(id).parent;
        }
        match &mut self.node_mut(parent).content {
            NodeContent::Leaf(_) => panic!("cannot insert a child into a leaf node"),
            NodeContent::Sequence { children, .. } | NodeContent::Container { children } => {
                children.push(child);
            }
            NodeContent::Set {
                children,
                by_tag,
                safe,
            } => {
                if by_tag.contains_key(&child_tag) {
                    if *safe {
                        panic!("duplicate tag {} in set", child_tag);
                    }
                } else {
                    by_tag.insert(child_tag, child);
                }
                children.push(child);
            }
        }
        self.node_mut(child).parent = Some(parent);
        self.mark_dirty(parent);
    }

    /// Detach a node from its parent, leaving the subtree intact for
    /// re-insertion elsewhere. Marks the old parent chain dirty.
    ///
    /// # Panics
    /// Panics if the node has no parent.
    pub fn detach(&mut self, child: NodeId) {
        let child_tag = self.node(child).tag;
        let parent = self
            .node(child)
            .parent
            .unwrap_or_else(|| panic!("node has no parent to detach from"));
        let replacement = match &self.node(parent).content {
            NodeContent::Set { children, .. } => children
                .iter()
                .copied()
                .find(|&c| c != child && self.node(c).tag == child_tag),
            _ => None,
        };
        match &mut self.node_mut(parent).content {
            NodeContent::Leaf(_) => unreachable!("leaf cannot be a parent"),
            NodeContent::Sequence { children, .. } | NodeContent::Container { children } => {
                children.retain(|&c| c != child);
            }
            NodeContent::Set {
                children, by_tag, ..
            } => {
                children.retain(|&c| c != child);
                if by_tag.get(&child_tag) == Some(&child) {
                    match replacement {
                        Some(other) => {
                            by_tag.insert(child_tag, other);
                        }
                        None => {
                            by_tag.remove(&child_tag);
                        }
                    }
                }
            }
        }
        self.node_mut(child).parent = None;
        self.mark_dirty(parent);
    }

    /// Remove a node and its whole subtree from the tree.
    pub fn remove(&mut self, id: NodeId) {
        if self.node(id).parent.is_some() {
            self.detach(id);
        } else if self.root == Some(id) {
            self.root = None;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.nodes[current.0].take().expect("live node");
            match node.content {
                NodeContent::Sequence { children, .. }
                | NodeContent::Set { children, .. }
                | NodeContent::Container { children } => stack.extend(children),
                NodeContent::Leaf(_) => {}
            }
        }
    }

    /// Tag of a node.
    pub fn tag(&self, id: NodeId) -> BerTag {
        self.node(id).tag
    }

    /// Type number of a node (application flag set for application types).
    pub fn type_number(&self, id: NodeId) -> u32 {
        self.node(id).type_number
    }

    /// Parent handle of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children of a node in insertion order; empty for leaves.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).content {
            NodeContent::Sequence { children, .. }
            | NodeContent::Set { children, .. }
            | NodeContent::Container { children } => children,
            NodeContent::Leaf(_) => &[],
        }
    }

    /// Look up a child by tag. O(1) for sets, linear otherwise.
    pub fn child_by_tag(&self, id: NodeId, tag: BerTag) -> Option<NodeId> {
        match &self.node(id).content {
            NodeContent::Set { by_tag, .. } => by_tag.get(&tag).copied(),
            NodeContent::Sequence { children, .. } | NodeContent::Container { children } => {
                children.iter().copied().find(|&c| self.node(c).tag == tag)
            }
            NodeContent::Leaf(_) => None,
        }
    }

    /// Check whether a node is a leaf.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.node(id).content, NodeContent::Leaf(_))
    }

    /// Check whether a sequence writes its children in tag order.
    pub fn is_ordered(&self, id: NodeId) -> bool {
        matches!(
            self.node(id).content,
            NodeContent::Sequence { is_ordered: true, .. }
        )
    }

    /// Value of a leaf node, `None` for containers.
    pub fn leaf_value(&self, id: NodeId) -> Option<&LeafValue> {
        match &self.node(id).content {
            NodeContent::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Replace the value of a leaf node, marking it and its ancestors dirty.
    ///
    /// # Panics
    /// Panics if the node is a container.
    pub fn set_leaf_value(&mut self, id: NodeId, value: impl Into<LeafValue>) {
        match &mut self.node_mut(id).content {
            NodeContent::Leaf(slot) => *slot = value.into(),
            _ => panic!("cannot set a value on a container node"),
        }
        self.mark_dirty(id);
    }

    /// Check whether a node's encoded form is absent.
    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.node(id).encoded.is_none()
    }

    /// Recompute the cached encoded form of a subtree bottom-up and return
    /// its total encoded length. Idempotent while the subtree stays clean.
    pub fn update(&mut self, id: NodeId) -> EmberResult<usize> {
        if let Some(form) = &self.node(id).encoded {
            return Ok(form.total_length);
        }

        if self.is_leaf(id) {
            let node = self.node(id);
            let NodeContent::Leaf(value) = &node.content else {
                unreachable!()
            };
            let content = value::leaf_value_bytes(value)?;
            let inner_tag = type_tag(node.type_number, false);
            let inner_length = BerLength::Definite(content.len());
            let inner_total =
                inner_tag.encoded_length() + inner_length.encoded_length() + content.len();
            let mut header = node.tag.as_container().encode();
            header.extend(BerLength::Definite(inner_total).encode());
            header.extend(inner_tag.encode());
            header.extend(inner_length.encode());
            header.extend(content);
            let total_length = header.len();
            self.node_mut(id).encoded = Some(EncodedForm {
                header,
                total_length,
            });
            return Ok(total_length);
        }

        let child_ids = self.children(id).to_vec();
        let mut content_total = 0;
        for child in child_ids {
            content_total += self.update(child)?;
        }
        let node = self.node(id);
        let inner_tag = type_tag(node.type_number, true);
        let inner_length = BerLength::Definite(content_total);
        let inner_total = inner_tag.encoded_length() + inner_length.encoded_length() + content_total;
        let mut header = node.tag.as_container().encode();
        header.extend(BerLength::Definite(inner_total).encode());
        header.extend(inner_tag.encode());
        header.extend(inner_length.encode());
        let total_length = header.len() + content_total;
        self.node_mut(id).encoded = Some(EncodedForm {
            header,
            total_length,
        });
        Ok(total_length)
    }

    /// Encode the whole tree into a sink and flush it.
    pub fn encode(&mut self, sink: &mut dyn ByteSink) -> EmberResult<()> {
        let root = self
            .root
            .ok_or_else(|| EmberError::InvalidData("tree has no root".to_string()))?;
        self.update(root)?;
        self.write_node(root, sink)?;
        sink.flush()
    }

    /// Encode a single subtree into a sink without flushing.
    pub fn encode_node(&mut self, id: NodeId, sink: &mut dyn ByteSink) -> EmberResult<()> {
        self.update(id)?;
        self.write_node(id, sink)
    }

    fn write_node(&self, id: NodeId, sink: &mut dyn ByteSink) -> EmberResult<()> {
        let node = self.node(id);
        let form = node
            .encoded
            .as_ref()
            .expect("update must run before writing");
        sink.write_bytes(&form.header)?;
        match &node.content {
            NodeContent::Leaf(_) => Ok(()),
            NodeContent::Sequence {
                children,
                is_ordered: true,
            } => {
                let mut order = children.clone();
                order.sort_by(|&a, &b| self.node(a).tag.cmp(&self.node(b).tag));
                for child in order {
                    self.write_node(child, sink)?;
                }
                Ok(())
            }
            NodeContent::Sequence { children, .. }
            | NodeContent::Set { children, .. }
            | NodeContent::Container { children } => {
                for &child in children {
                    self.write_node(child, sink)?;
                }
                Ok(())
            }
        }
    }

    fn mark_dirty(&mut self, id: NodeId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node_mut(current);
            node.encoded = None;
            cursor = node.parent;
        }
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0].as_ref().expect("node was removed")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0].as_mut().expect("node was removed")
    }
}
