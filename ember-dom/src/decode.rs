//! One-shot recursive decoder
//!
//! Depth-first decode of a complete, pre-buffered byte source, without the
//! incremental state machine. Dispatches through the same application type
//! factory and validation hook as the streaming path and produces
//! structurally identical trees for the same bytes.

use crate::factory::{resolve_template, ApplicationTypes, NodeTemplate};
use crate::tree::{EmberTree, NodeId};
use crate::validate::{NodeValidator, ValidationIssue};
use ember_ber::types::universal;
use ember_ber::{application_type, codes, type_label, value, BerClass, BerLength, BerTag};
use ember_core::{ByteSource, EmberError, EmberResult, LeafKind};

/// Recursive decoder for complete in-memory trees
pub struct TreeDecoder<'f> {
    factory: &'f dyn ApplicationTypes,
    validator: Option<&'f dyn NodeValidator>,
    issues: Vec<ValidationIssue>,
    path: Vec<(BerTag, u32)>,
}

impl<'f> TreeDecoder<'f> {
    /// Create a decoder dispatching application types through `factory`.
    pub fn new(factory: &'f dyn ApplicationTypes) -> Self {
        Self {
            factory,
            validator: None,
            issues: Vec::new(),
            path: Vec::new(),
        }
    }

    /// Create a decoder with a post-decode validation hook.
    pub fn with_validator(
        factory: &'f dyn ApplicationTypes,
        validator: &'f dyn NodeValidator,
    ) -> Self {
        Self {
            factory,
            validator: Some(validator),
            issues: Vec::new(),
            path: Vec::new(),
        }
    }

    /// Decode one complete tree from the source.
    pub fn decode(&mut self, source: &mut dyn ByteSource) -> EmberResult<EmberTree> {
        self.issues.clear();
        self.path.clear();
        let mut tree = EmberTree::new();
        match self.decode_node(source, &mut tree, None)? {
            Some((root, _)) => {
                tree.set_root(root);
                Ok(tree)
            }
            None => Err(self.error(
                codes::UNEXPECTED_TERMINATOR,
                "terminator where a node was expected",
            )),
        }
    }

    /// Non-fatal validation failures collected by the last decode.
    pub fn validation_issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Take ownership of the collected validation failures.
    pub fn take_validation_issues(&mut self) -> Vec<ValidationIssue> {
        std::mem::take(&mut self.issues)
    }

    fn error(&self, code: u32, message: impl Into<String>) -> EmberError {
        let trace = if self.path.is_empty() {
            "root".to_string()
        } else {
            self.path
                .iter()
                .map(|(tag, type_number)| format!("{}:{}", tag, type_label(*type_number)))
                .collect::<Vec<_>>()
                .join("/")
        };
        EmberError::Decode {
            code,
            message: message.into(),
            trace,
        }
    }

    /// Decode one node pair. Returns `None` (4 bytes consumed) when a
    /// terminator sequence was found instead of a node.
    fn decode_node(
        &mut self,
        source: &mut dyn ByteSource,
        tree: &mut EmberTree,
        parent: Option<NodeId>,
    ) -> EmberResult<Option<(NodeId, usize)>> {
        let first = source.read_byte()?;
        if first == 0x00 {
            for _ in 0..3 {
                let byte = source.read_byte()?;
                if byte != 0x00 {
                    return Err(self.error(
                        codes::NONZERO_TERMINATOR,
                        format!("non-zero byte 0x{:02X} in terminator sequence", byte),
                    ));
                }
            }
            return Ok(None);
        }

        let (outer_tag, outer_tag_len) = value::read_tag_tail(first, source)?;
        if !outer_tag.is_container() || outer_tag.class() == BerClass::Universal {
            return Err(self.error(
                codes::INVALID_OUTER_TAG,
                format!(
                    "outer tag must be a container-flagged non-universal tag, got {}",
                    outer_tag
                ),
            ));
        }
        let (outer_length, outer_length_len) = value::read_length(source)?;
        if outer_length == BerLength::Definite(0) {
            return Err(self.error(
                codes::ZERO_OUTER_LENGTH,
                "outer length must be non-zero (it covers the inner header)",
            ));
        }

        let (inner_tag, inner_tag_len) = value::read_tag(source)?;
        let is_container = inner_tag.is_container();
        let type_number = match inner_tag.class() {
            BerClass::Universal => {
                let number = inner_tag.number();
                if number == 0 || number >= universal::LAST_UNIVERSAL {
                    return Err(self.error(
                        codes::INVALID_UNIVERSAL_TYPE,
                        format!("invalid universal type number {}", number),
                    ));
                }
                number
            }
            BerClass::Application => application_type(inner_tag.number()),
            BerClass::ContextSpecific | BerClass::Private => {
                return Err(self.error(
                    codes::INVALID_INNER_TAG,
                    format!(
                        "implicit {} tag where a universal or application type was expected",
                        inner_tag
                    ),
                ));
            }
        };
        let (inner_length, inner_length_len) = value::read_length(source)?;
        let mut consumed = outer_tag_len + outer_length_len + inner_tag_len + inner_length_len;

        if is_container {
            let template = resolve_template(self.factory, type_number, true);
            let id = tree.new_node(outer_tag, type_number, template);
            if let Some(parent) = parent {
                tree.insert(parent, id);
            }
            self.path.push((outer_tag, type_number));
            match inner_length {
                BerLength::Definite(region) => {
                    let mut read = 0;
                    while read < region {
                        match self.decode_node(source, tree, Some(id))? {
                            Some((_, child_consumed)) => read += child_consumed,
                            None => {
                                return Err(self.error(
                                    codes::UNEXPECTED_TERMINATOR,
                                    "terminator inside a definite-length container",
                                ));
                            }
                        }
                    }
                    if read > region {
                        return Err(
                            self.error(codes::END_OF_CONTAINER, "unexpected end of container")
                        );
                    }
                    consumed += region;
                }
                BerLength::Indefinite => loop {
                    match self.decode_node(source, tree, Some(id))? {
                        Some((_, child_consumed)) => consumed += child_consumed,
                        None => {
                            consumed += 4;
                            break;
                        }
                    }
                },
            }
            self.path.pop();
            self.run_validator(tree, id);
            Ok(Some((id, consumed)))
        } else {
            let BerLength::Definite(length) = inner_length else {
                return Err(self.error(
                    codes::PRIMITIVE_INDEFINITE,
                    "primitive item claims indefinite length",
                ));
            };
            let mut content = Vec::with_capacity(length.min(64 * 1024));
            for _ in 0..length {
                content.push(source.read_byte()?);
            }
            consumed += length;
            let kind = match resolve_template(self.factory, type_number, false) {
                NodeTemplate::Leaf(kind) => kind,
                _ => LeafKind::OctetString,
            };
            let leaf_value = value::parse_leaf_value(kind, &content)?;
            let id = tree.new_typed_leaf(outer_tag, type_number, leaf_value);
            if let Some(parent) = parent {
                tree.insert(parent, id);
            }
            self.run_validator(tree, id);
            Ok(Some((id, consumed)))
        }
    }

    fn run_validator(&mut self, tree: &EmberTree, id: NodeId) {
        if let Some(validator) = self.validator {
            if let Err(message) = validator.validate(tree, id) {
                self.issues.push(ValidationIssue { node: id, message });
            }
        }
    }
}

/// Decode one complete tree from a byte source.
pub fn decode_tree(
    source: &mut dyn ByteSource,
    factory: &dyn ApplicationTypes,
) -> EmberResult<EmberTree> {
    TreeDecoder::new(factory).decode(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{DomBuilder, DomEvent};
    use crate::factory::GenericTypes;
    use crate::validate::IdentifierValidator;
    use ember_ber::StreamBerReader;
    use ember_core::MemoryBuffer;

    fn encoded(tree: &mut EmberTree) -> Vec<u8> {
        let mut sink = MemoryBuffer::new();
        tree.encode(&mut sink).unwrap();
        sink.into_bytes()
    }

    fn sample_bytes() -> Vec<u8> {
        let mut tree = EmberTree::new();
        let root = tree.new_sequence(BerTag::application(1));
        let set = tree.new_set(BerTag::context(0));
        let name = tree.new_leaf(BerTag::context(0), "mixer");
        let gain = tree.new_leaf(BerTag::context(1), -3.5f64);
        let path = tree.new_leaf(
            BerTag::context(2),
            ember_core::LeafValue::RelativeOid(vec![1, 2, 3]),
        );
        tree.insert(root, set);
        tree.insert(set, name);
        tree.insert(set, gain);
        tree.insert(set, path);
        tree.set_root(root);
        encoded(&mut tree)
    }

    #[test]
    fn test_sync_decode_round_trip() {
        let bytes = sample_bytes();
        let mut source = MemoryBuffer::from_bytes(bytes.clone());
        let mut tree = decode_tree(&mut source, &GenericTypes).unwrap();
        assert_eq!(encoded(&mut tree), bytes);
    }

    #[test]
    fn test_sync_decode_matches_streaming_decode() {
        let bytes = sample_bytes();

        let mut source = MemoryBuffer::from_bytes(bytes.clone());
        let mut sync_tree = decode_tree(&mut source, &GenericTypes).unwrap();

        let mut reader = StreamBerReader::new();
        let mut builder = DomBuilder::new(GenericTypes);
        for &byte in &bytes {
            reader.feed_byte(byte).unwrap();
            builder.feed_from(&mut reader).unwrap();
        }
        let mut async_tree = loop {
            match builder.next_event() {
                Some(DomEvent::RootReady(tree)) => break tree,
                Some(_) => continue,
                None => panic!("streaming decode produced no root"),
            }
        };

        assert_eq!(encoded(&mut sync_tree), encoded(&mut async_tree));
    }

    #[test]
    fn test_definite_and_indefinite_forms_decode_identically() {
        // App-1 / Sequence holding one integer leaf, definite...
        let definite = [0x61, 0x07, 0x30, 0x05, 0xA0, 0x03, 0x02, 0x01, 0x2A];
        // ...and with the container pair in indefinite form.
        let indefinite = [
            0x61, 0x80, 0x30, 0x80, 0xA0, 0x03, 0x02, 0x01, 0x2A, 0x00, 0x00, 0x00, 0x00,
        ];

        let mut a = decode_tree(
            &mut MemoryBuffer::from_bytes(definite.to_vec()),
            &GenericTypes,
        )
        .unwrap();
        let mut b = decode_tree(
            &mut MemoryBuffer::from_bytes(indefinite.to_vec()),
            &GenericTypes,
        )
        .unwrap();
        assert_eq!(encoded(&mut a), encoded(&mut b));
    }

    #[test]
    fn test_terminator_in_definite_container_is_error() {
        let bytes = [0x61, 0x06, 0x30, 0x04, 0x00, 0x00, 0x00, 0x00];
        let err = decode_tree(
            &mut MemoryBuffer::from_bytes(bytes.to_vec()),
            &GenericTypes,
        )
        .unwrap_err();
        assert_eq!(err.decode_code(), Some(codes::UNEXPECTED_TERMINATOR));
    }

    #[test]
    fn test_validator_collects_issues_without_aborting() {
        let mut tree = EmberTree::new();
        let root = tree.new_sequence(BerTag::application(1));
        let bad = tree.new_leaf(BerTag::context(0), "not an identifier");
        tree.insert(root, bad);
        tree.set_root(root);
        let bytes = encoded(&mut tree);

        let validator = IdentifierValidator::new(vec![BerTag::context(0)]);
        let mut decoder = TreeDecoder::with_validator(&GenericTypes, &validator);
        let decoded = decoder
            .decode(&mut MemoryBuffer::from_bytes(bytes))
            .unwrap();
        assert!(decoded.root().is_some());
        assert_eq!(decoder.validation_issues().len(), 1);
    }

    #[test]
    fn test_error_trace_names_open_containers() {
        // invalid outer tag (universal) inside the open sequence
        let bytes = [0x61, 0x07, 0x30, 0x05, 0x30, 0x03, 0x02, 0x01, 0x2A];
        let err = decode_tree(
            &mut MemoryBuffer::from_bytes(bytes.to_vec()),
            &GenericTypes,
        )
        .unwrap_err();
        match err {
            EmberError::Decode { trace, .. } => assert_eq!(trace, "A-1:Sequence"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }
}
