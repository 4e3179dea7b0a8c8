//! The runtime mutation engine.
//!
//! [`crate::Template::new`] compiles a declaration tree into a flat arena
//! of nodes addressed by index. Parent links are plain indices, so
//! back-references never fight the ownership of the tree, and any node can
//! reach any other during rendering (sizes, checksums, clones).

mod build;
mod info;
mod render;
mod walk;

use crate::bits::Bits;
use crate::condition::ConditionValue;
use crate::crypto::{ChecksumAlgorithm, HashAlgorithm};
use crate::encoder::{BitsEncoder, IntEncoder, StrEncoder};
use crate::error::ModelError;
use crate::field::Field;
use crate::library::LibraryAccessor;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

pub(crate) type NodeId = usize;

/// Ordered set of nodes currently being rendered; a calculated field that
/// finds itself here is nested inside its own dependency and yields its
/// in-render fallback value instead of recursing forever.
#[derive(Debug, Default)]
pub(crate) struct RenderContext {
    stack: Vec<NodeId>,
}

impl RenderContext {
    pub fn new() -> Self {
        RenderContext { stack: Vec::new() }
    }

    pub fn with(initiator: NodeId) -> Self {
        RenderContext {
            stack: vec![initiator],
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.stack.contains(&id)
    }

    pub fn push(&mut self, id: NodeId) {
        self.stack.push(id);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }
}

/// One node of the compiled tree.
#[derive(Debug)]
pub(crate) struct Node {
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    pub fuzzable: bool,
    /// −1 means "default, not mutating".
    pub current_index: i64,
    /// Valid once compilation finishes.
    pub num_mutations: u64,
    /// Bit offset assigned by the render pre-pass.
    pub offset: Option<usize>,
    pub kind: NodeKind,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Bytes(BytesNode),
    Int(IntNode),
    BitsVal(BitsNode),
    Calc(CalcNode),
    Container(ContainerNode),
}

#[derive(Debug)]
pub(crate) struct BytesNode {
    pub type_name: &'static str,
    pub default: Vec<u8>,
    pub current: Vec<u8>,
    pub encoder: StrEncoder,
    pub max_size: Option<usize>,
    pub source: BytesSource,
}

#[derive(Debug)]
pub(crate) enum BytesSource {
    Static,
    Library(LibraryAccessor<Vec<u8>>),
    Random {
        min_length: u64,
        max_length: u64,
        step: Option<u64>,
        count: u64,
        seed: u64,
        rng: ChaCha8Rng,
    },
    Dynamic {
        key: String,
        length: Option<usize>,
    },
}

/// A single integer-library entry: how to derive a probe value from the
/// field's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntMutator {
    /// Default with bit `n` (counted from the LSB) flipped.
    Flip(u32),
    /// An absolute value.
    Abs(i128),
    /// Default plus an offset.
    Rel(i128),
}

impl IntMutator {
    pub fn apply(self, default: i128) -> i128 {
        match self {
            IntMutator::Flip(bit) => default ^ (1i128 << bit),
            IntMutator::Abs(v) => v,
            IntMutator::Rel(d) => default.saturating_add(d),
        }
    }
}

#[derive(Debug)]
pub(crate) struct IntNode {
    pub default: i128,
    pub current: i128,
    pub length: u32,
    pub signed: bool,
    pub min: i128,
    pub max: i128,
    pub encoder: IntEncoder,
    pub lib: LibraryAccessor<IntMutator>,
}

#[derive(Debug)]
pub(crate) struct BitsNode {
    pub type_name: &'static str,
    pub default: Bits,
    pub current: Bits,
    pub encoder: BitsEncoder,
    pub source: BitsSource,
}

#[derive(Debug)]
pub(crate) enum BitsSource {
    Random {
        min_length: u64,
        max_length: u64,
        step: Option<u64>,
        count: u64,
        seed: u64,
        rng: ChaCha8Rng,
    },
    Flips(Vec<Bits>),
}

pub(crate) struct CalcNode {
    pub dep_name: String,
    /// Resolved during compilation; compilation fails otherwise.
    pub dep: NodeId,
    pub kind: CalcKind,
    pub last_rendered: Bits,
}

impl std::fmt::Debug for CalcNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalcNode")
            .field("dep_name", &self.dep_name)
            .field("dep", &self.dep)
            .finish_non_exhaustive()
    }
}

pub(crate) enum CalcKind {
    Clone {
        encoder: BitsEncoder,
    },
    MapBits {
        func: Arc<dyn Fn(&Bits) -> Bits + Send + Sync>,
        encoder: BitsEncoder,
    },
    MapBytes {
        func: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
        encoder: StrEncoder,
    },
    Digest {
        algo: HashAlgorithm,
        encoder: StrEncoder,
    },
    Int(CalcIntNode),
}

#[derive(Debug)]
pub(crate) struct CalcIntNode {
    pub op: CalcIntOp,
    pub length: u32,
    pub min: i128,
    pub max: i128,
    pub encoder: IntEncoder,
    /// Probe library applied on top of the freshly calculated value when
    /// the field is configured fuzzable.
    pub lib: LibraryAccessor<IntMutator>,
    /// Value rendered last; recalculated on every default render, frozen
    /// per mutation once the probe has been applied.
    pub value: i128,
    pub first_render: bool,
}

#[derive(Debug)]
pub(crate) enum CalcIntOp {
    SizeBits,
    SizeBytes,
    ElementCount,
    IndexOf,
    Checksum(ChecksumAlgorithm),
}

#[derive(Debug)]
pub(crate) struct ContainerNode {
    pub type_name: &'static str,
    pub children: Vec<NodeId>,
    pub cursor: usize,
    pub encoder: BitsEncoder,
    pub variant: ContainerVariant,
}

#[derive(Debug)]
pub(crate) enum ContainerVariant {
    Plain,
    Conditional {
        condition: CompiledCondition,
        negate: bool,
    },
    Repeat {
        min_times: u64,
        max_times: u64,
        step: u64,
    },
    ForEach {
        dep_name: Option<String>,
        dep: NodeId,
        /// Sum of the children's mutation counts, cached at compile time.
        inner_total: u64,
    },
}

#[derive(Debug)]
pub(crate) enum CompiledCondition {
    Const(bool),
    Cmp {
        field_name: String,
        field: NodeId,
        value: ConditionValue,
        negate: bool,
    },
}

/// A view of a leaf's current value, used by conditions.
#[derive(Debug, PartialEq)]
pub(crate) enum CurrentValue<'a> {
    Bytes(&'a [u8]),
    Int(i128),
    Bits(&'a Bits),
}

/// The compiled tree plus its root.
#[derive(Debug)]
pub(crate) struct Engine {
    pub nodes: Vec<Node>,
    pub root: NodeId,
}

impl Engine {
    /// Compile a declaration tree: build nodes, resolve references,
    /// validate parameters, build libraries, count mutations.
    pub fn compile(root: Field) -> Result<Engine, ModelError> {
        let mut engine = Engine {
            nodes: Vec::new(),
            root: 0,
        };
        let root_id = engine.add_field(root, None)?;
        engine.root = root_id;
        engine.resolve_references()?;
        engine.initialize()?;
        Ok(engine)
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// The ordered children of a container, cloned for iteration while the
    /// arena is mutated.
    pub(crate) fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        match &self.nodes[id].kind {
            NodeKind::Container(c) => c.children.clone(),
            _ => Vec::new(),
        }
    }

    /// Deep pre-order scan of a subtree for a node with the given name.
    fn find_in_subtree(&self, id: NodeId, name: &str) -> Option<NodeId> {
        if self.nodes[id].name.as_deref() == Some(name) {
            return Some(id);
        }
        if let NodeKind::Container(c) = &self.nodes[id].kind {
            for &child in &c.children {
                if let Some(found) = self.find_in_subtree(child, name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Resolve a name from a node: scan the enclosing container's subtree,
    /// then each further enclosing container's, outwards.
    pub(crate) fn resolve_from(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut scope = self.nodes[from].parent;
        while let Some(s) = scope {
            if let Some(found) = self.find_in_subtree(s, name) {
                return Some(found);
            }
            scope = self.nodes[s].parent;
        }
        // A bare root field (no parent) can still refer to itself.
        if self.nodes[from].parent.is_none() {
            return self.find_in_subtree(from, name);
        }
        None
    }

    /// Child-index path from the root; hidden ForEach drivers get a
    /// sentinel component.
    pub(crate) fn node_path(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.nodes[cur].parent {
            let pos = match &self.nodes[parent].kind {
                NodeKind::Container(c) => c
                    .children
                    .iter()
                    .position(|&ch| ch == cur)
                    .unwrap_or(usize::MAX),
                _ => usize::MAX,
            };
            path.push(pos);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// True when `ancestor` encloses `id` (or is `id` itself).
    pub(crate) fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.nodes[c].parent;
        }
        false
    }

    /// The current value of a leaf, for condition evaluation.
    pub(crate) fn current_value(&self, id: NodeId) -> Option<CurrentValue<'_>> {
        match &self.nodes[id].kind {
            NodeKind::Bytes(b) => Some(CurrentValue::Bytes(&b.current)),
            NodeKind::Int(i) => Some(CurrentValue::Int(i.current)),
            NodeKind::BitsVal(b) => Some(CurrentValue::Bits(&b.current)),
            _ => None,
        }
    }

    /// The deepest node that is currently mutating, if any.
    pub(crate) fn deepest_mutating(&self, id: NodeId) -> Option<NodeId> {
        if let NodeKind::Container(c) = &self.nodes[id].kind {
            for &child in &c.children {
                if let Some(found) = self.deepest_mutating(child) {
                    return Some(found);
                }
            }
            if let ContainerVariant::ForEach { dep, .. } = c.variant {
                if let Some(found) = self.deepest_mutating(dep) {
                    return Some(found);
                }
            }
        }
        if self.nodes[id].current_index != -1 {
            return Some(id);
        }
        None
    }

    /// Human-readable node type.
    pub(crate) fn type_name(&self, id: NodeId) -> &'static str {
        match &self.nodes[id].kind {
            NodeKind::Bytes(b) => b.type_name,
            NodeKind::Int(_) => "BitField",
            NodeKind::BitsVal(b) => b.type_name,
            NodeKind::Calc(c) => match &c.kind {
                CalcKind::Clone { .. } => "Clone",
                CalcKind::MapBits { .. } => "CalculatedBits",
                CalcKind::MapBytes { .. } => "CalculatedStr",
                CalcKind::Digest { .. } => "Hash",
                CalcKind::Int(i) => match i.op {
                    CalcIntOp::SizeBits | CalcIntOp::SizeBytes => "Size",
                    CalcIntOp::ElementCount => "ElementCount",
                    CalcIntOp::IndexOf => "IndexOf",
                    CalcIntOp::Checksum(_) => "Checksum",
                },
            },
            NodeKind::Container(c) => c.type_name,
        }
    }

    /// Slash-separated path of names down to a node; unnamed components
    /// use their type.
    pub(crate) fn display_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let label = self.nodes[c]
                .name
                .clone()
                .unwrap_or_else(|| format!("<{}>", self.type_name(c)));
            parts.push(label);
            cur = self.nodes[c].parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Set every Dynamic field whose key appears in `data`.
    pub(crate) fn apply_session_data(
        &mut self,
        data: &std::collections::HashMap<String, Vec<u8>>,
    ) {
        for node in &mut self.nodes {
            if let NodeKind::Bytes(b) = &mut node.kind {
                if let BytesSource::Dynamic { key, .. } = &b.source {
                    if let Some(value) = data.get(key) {
                        b.current = value.clone();
                    }
                }
            }
        }
    }
}
