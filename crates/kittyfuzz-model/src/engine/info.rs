//! Tree hashing and structural metadata dumps.

use super::{
    BitsSource, BytesSource, CalcIntOp, CalcKind, CompiledCondition, ContainerVariant, Engine,
    NodeId, NodeKind,
};
use crate::condition::ConditionValue;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Write a length-prefixed chunk so adjacent fields cannot alias.
fn put(hasher: &mut Sha256, data: &[u8]) {
    hasher.update((data.len() as u64).to_le_bytes());
    hasher.update(data);
}

fn put_int(hasher: &mut Sha256, v: i128) {
    hasher.update(v.to_le_bytes());
}

impl Engine {
    /// Stable digest of the tree shape: type names, defaults, fuzzable
    /// flags, lengths and constraints of every node, in pre-order. Field
    /// names are deliberately excluded; dependencies hash as positional
    /// paths.
    pub(crate) fn tree_hash(&self) -> u64 {
        let mut hasher = Sha256::new();
        self.hash_node(self.root, &mut hasher);
        let digest = hasher.finalize();
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(first)
    }

    fn hash_node(&self, id: NodeId, h: &mut Sha256) {
        put(h, self.type_name(id).as_bytes());
        h.update([u8::from(self.nodes[id].fuzzable)]);
        match &self.nodes[id].kind {
            NodeKind::Bytes(b) => {
                put(h, &b.default);
                put(h, b.encoder.tag().as_bytes());
                put_int(h, b.max_size.map(|m| m as i128).unwrap_or(-1));
                match &b.source {
                    BytesSource::Static => {}
                    BytesSource::Library(lib) => {
                        for entry in lib.iter_raw() {
                            put(h, entry);
                        }
                    }
                    BytesSource::Random {
                        min_length,
                        max_length,
                        step,
                        count,
                        seed,
                        ..
                    } => {
                        put_int(h, *min_length as i128);
                        put_int(h, *max_length as i128);
                        put_int(h, step.map(|s| s as i128).unwrap_or(-1));
                        put_int(h, *count as i128);
                        put_int(h, *seed as i128);
                    }
                    BytesSource::Dynamic { key, length } => {
                        put(h, key.as_bytes());
                        put_int(h, length.map(|l| l as i128).unwrap_or(-1));
                    }
                }
            }
            NodeKind::Int(i) => {
                put_int(h, i.default);
                put_int(h, i.length.into());
                h.update([u8::from(i.signed)]);
                put_int(h, i.min);
                put_int(h, i.max);
                put(h, i.encoder.tag().as_bytes());
                for m in i.lib.iter_raw() {
                    put_int(h, m.apply(i.default));
                }
            }
            NodeKind::BitsVal(b) => {
                put(h, &b.default.to_bytes());
                put_int(h, b.default.len() as i128);
                put(h, b.encoder.tag().as_bytes());
                match &b.source {
                    BitsSource::Random {
                        min_length,
                        max_length,
                        step,
                        count,
                        seed,
                        ..
                    } => {
                        put_int(h, *min_length as i128);
                        put_int(h, *max_length as i128);
                        put_int(h, step.map(|s| s as i128).unwrap_or(-1));
                        put_int(h, *count as i128);
                        put_int(h, *seed as i128);
                    }
                    BitsSource::Flips(lib) => {
                        for entry in lib {
                            put(h, &entry.to_bytes());
                            put_int(h, entry.len() as i128);
                        }
                    }
                }
            }
            NodeKind::Calc(c) => {
                for part in self.node_path(c.dep) {
                    put_int(h, part as i128);
                }
                match &c.kind {
                    CalcKind::Clone { encoder } | CalcKind::MapBits { encoder, .. } => {
                        put(h, encoder.tag().as_bytes());
                    }
                    CalcKind::MapBytes { encoder, .. } | CalcKind::Digest { encoder, .. } => {
                        put(h, encoder.tag().as_bytes());
                    }
                    CalcKind::Int(ci) => {
                        let op_tag = match &ci.op {
                            CalcIntOp::SizeBits => "size-bits",
                            CalcIntOp::SizeBytes => "size-bytes",
                            CalcIntOp::ElementCount => "element-count",
                            CalcIntOp::IndexOf => "index-of",
                            CalcIntOp::Checksum(a) => a.tag(),
                        };
                        put(h, op_tag.as_bytes());
                        put_int(h, ci.length.into());
                        put(h, ci.encoder.tag().as_bytes());
                    }
                }
                if let CalcKind::Digest { algo, .. } = &c.kind {
                    put(h, algo.tag().as_bytes());
                    put_int(h, algo.digest_bits() as i128);
                }
            }
            NodeKind::Container(c) => {
                put(h, c.encoder.tag().as_bytes());
                match &c.variant {
                    ContainerVariant::Plain => {}
                    ContainerVariant::Conditional { condition, negate } => {
                        h.update([u8::from(*negate)]);
                        match condition {
                            CompiledCondition::Const(b) => h.update([2, u8::from(*b)]),
                            CompiledCondition::Cmp {
                                field,
                                value,
                                negate,
                                ..
                            } => {
                                h.update([3, u8::from(*negate)]);
                                for part in self.node_path(*field) {
                                    put_int(h, part as i128);
                                }
                                match value {
                                    ConditionValue::Bytes(v) => put(h, v),
                                    ConditionValue::Int(v) => put_int(h, *v),
                                    ConditionValue::Bits(v) => {
                                        put(h, &v.to_bytes());
                                        put_int(h, v.len() as i128);
                                    }
                                }
                            }
                        }
                    }
                    ContainerVariant::Repeat {
                        min_times,
                        max_times,
                        step,
                    } => {
                        put_int(h, *min_times as i128);
                        put_int(h, *max_times as i128);
                        put_int(h, *step as i128);
                    }
                    ContainerVariant::ForEach { dep, .. } => {
                        for part in self.node_path(*dep) {
                            put_int(h, part as i128);
                        }
                    }
                }
                put_int(h, c.children.len() as i128);
                for &child in c.children.clone().iter() {
                    self.hash_node(child, h);
                }
                if let ContainerVariant::ForEach { dep, .. } = &c.variant {
                    // A hidden driver is part of the shape too.
                    if self.nodes[*dep].parent == Some(id) {
                        self.hash_node(*dep, h);
                    }
                }
            }
        }
    }

    /// Structured metadata for one node, rendering included.
    pub(crate) fn node_info(&mut self, id: NodeId) -> Value {
        let rendered = {
            let mut ctx = super::RenderContext::new();
            self.render(id, &mut ctx)
        };
        let node = &self.nodes[id];
        let raw: Value = match &node.kind {
            NodeKind::Bytes(b) => json!(hex::encode(&b.current)),
            NodeKind::Int(i) => json!(i.current.to_string()),
            NodeKind::BitsVal(b) => json!(b.current.to_hex()),
            NodeKind::Calc(c) => json!(c.last_rendered.to_hex()),
            NodeKind::Container(_) => Value::Null,
        };
        let default: Value = match &node.kind {
            NodeKind::Bytes(b) => json!(hex::encode(&b.default)),
            NodeKind::Int(i) => json!(i.default.to_string()),
            NodeKind::BitsVal(b) => json!(b.default.to_hex()),
            _ => Value::Null,
        };
        json!({
            "name": node.name.clone().unwrap_or_else(|| "<no name>".to_string()),
            "path": self.display_path(id),
            "field type": self.type_name(id),
            "value/raw": raw,
            "value/default": default,
            "value/rendered/hex": rendered.to_hex(),
            "value/rendered/base64": rendered.to_base64(),
            "value/rendered/length/bits": rendered.len(),
            "value/rendered/length/bytes": rendered.to_bytes().len(),
            "value/offset": self.nodes[id].offset,
            "mutation/current index": self.nodes[id].current_index,
            "mutation/total number": self.nodes[id].num_mutations,
            "mutation/mutating": self.nodes[id].current_index != -1,
            "mutation/fuzzable": self.nodes[id].fuzzable,
        })
    }

    /// Recursive structural dump of a subtree.
    pub(crate) fn structure(&mut self, id: NodeId) -> Value {
        let mut info = self.node_info(id);
        let children = self.children_of(id);
        if !children.is_empty() {
            let subs: Vec<Value> = children.into_iter().map(|ch| self.structure(ch)).collect();
            if let Value::Object(map) = &mut info {
                map.insert("children".to_string(), Value::Array(subs));
            }
        }
        info
    }
}
