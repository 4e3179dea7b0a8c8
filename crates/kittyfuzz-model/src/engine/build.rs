//! Tree compilation: declarations to nodes, reference resolution,
//! parameter validation, library construction, mutation counting.

use super::{
    BitsNode, BitsSource, BytesNode, BytesSource, CalcIntNode, CalcIntOp, CalcKind, CalcNode,
    CompiledCondition, ContainerNode, ContainerVariant, Engine, IntMutator, IntNode, Node,
    NodeId, NodeKind,
};
use crate::bits::Bits;
use crate::calculated::SizeUnit;
use crate::condition::Condition;
use crate::encoder::{int_bounds, BitsEncoder, IntEncoder};
use crate::error::ModelError;
use crate::field::Field;
use crate::library::{filter_bytes_library, LibraryAccessor, DELIMITER_CLASS_LIB, INTEGER_FILE_LIB, STRING_CLASS_LIB};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;

impl Engine {
    fn push_node(
        &mut self,
        name: Option<String>,
        parent: Option<NodeId>,
        fuzzable: bool,
        kind: NodeKind,
    ) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            name,
            parent,
            fuzzable,
            current_index: -1,
            num_mutations: 0,
            offset: None,
            kind,
        });
        id
    }

    /// Compile one declaration (and its subtree) into the arena.
    pub(super) fn add_field(
        &mut self,
        field: Field,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ModelError> {
        let id = match field {
            Field::Static(f) => self.push_node(
                f.name,
                parent,
                false,
                NodeKind::Bytes(BytesNode {
                    type_name: "Static",
                    current: f.value.clone(),
                    default: f.value,
                    encoder: f.encoder,
                    max_size: None,
                    source: BytesSource::Static,
                }),
            ),
            Field::String(f) => self.push_node(
                f.name,
                parent,
                f.fuzzable,
                NodeKind::Bytes(BytesNode {
                    type_name: "String",
                    current: f.value.clone(),
                    default: f.value,
                    encoder: f.encoder,
                    max_size: f.max_size,
                    source: BytesSource::Library(LibraryAccessor::new()),
                }),
            ),
            Field::Delimiter(f) => self.push_node(
                f.name,
                parent,
                f.fuzzable,
                NodeKind::Bytes(BytesNode {
                    type_name: "Delimiter",
                    current: f.value.clone(),
                    default: f.value,
                    encoder: f.encoder,
                    max_size: f.max_size,
                    source: BytesSource::Library(LibraryAccessor::new()),
                }),
            ),
            Field::Group(f) => {
                if f.values.is_empty() {
                    return Err(ModelError::invalid("Group requires at least one value"));
                }
                let mut lib = LibraryAccessor::new();
                lib.add_owned(f.values.clone());
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::Bytes(BytesNode {
                        type_name: "Group",
                        current: f.values[0].clone(),
                        default: f.values[0].clone(),
                        encoder: f.encoder,
                        max_size: None,
                        source: BytesSource::Library(lib),
                    }),
                )
            }
            Field::BitField(f) => {
                let (min, max) = bitfield_bounds(
                    f.value,
                    f.length,
                    f.signed,
                    f.min_value,
                    f.max_value,
                )?;
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::Int(IntNode {
                        default: f.value,
                        current: f.value,
                        length: f.length,
                        signed: f.signed,
                        min,
                        max,
                        encoder: f.encoder,
                        lib: LibraryAccessor::new(),
                    }),
                )
            }
            Field::Dynamic(f) => {
                if f.fuzzable && f.length.is_none() {
                    return Err(ModelError::invalid(
                        "fuzzable Dynamic field requires an explicit length",
                    ));
                }
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::Bytes(BytesNode {
                        type_name: "Dynamic",
                        current: f.default_value.clone(),
                        default: f.default_value,
                        encoder: f.encoder,
                        max_size: None,
                        source: BytesSource::Dynamic {
                            key: f.key,
                            length: f.length,
                        },
                    }),
                )
            }
            Field::RandomBits(f) => {
                validate_random(f.min_length, f.max_length, f.step)?;
                if f.unused_bits >= 8 {
                    return Err(ModelError::invalid(format!(
                        "unused bits ({}) is not between 0-7",
                        f.unused_bits
                    )));
                }
                let all = Bits::from_bytes(&f.value);
                let default = all.slice(0, all.len().saturating_sub(f.unused_bits as usize));
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::BitsVal(BitsNode {
                        type_name: "RandomBits",
                        current: default.clone(),
                        default,
                        encoder: f.encoder,
                        source: BitsSource::Random {
                            min_length: f.min_length as u64,
                            max_length: f.max_length as u64,
                            step: f.step.map(|s| s as u64),
                            count: f.num_mutations,
                            seed: f.seed,
                            rng: ChaCha8Rng::seed_from_u64(f.seed),
                        },
                    }),
                )
            }
            Field::RandomBytes(f) => {
                validate_random(f.min_length, f.max_length, f.step)?;
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::Bytes(BytesNode {
                        type_name: "RandomBytes",
                        current: f.value.clone(),
                        default: f.value,
                        encoder: f.encoder,
                        max_size: None,
                        source: BytesSource::Random {
                            min_length: f.min_length as u64,
                            max_length: f.max_length as u64,
                            step: f.step.map(|s| s as u64),
                            count: f.num_mutations,
                            seed: f.seed,
                            rng: ChaCha8Rng::seed_from_u64(f.seed),
                        },
                    }),
                )
            }
            Field::BitFlip(f) => {
                let default = Bits::from_bytes(&f.value);
                let lib = bit_flip_windows(&default, f.num_bits)?;
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::BitsVal(BitsNode {
                        type_name: "BitFlip",
                        current: default.clone(),
                        default,
                        encoder: f.encoder,
                        source: BitsSource::Flips(lib),
                    }),
                )
            }
            Field::BitFlips(f) => {
                let default = Bits::from_bytes(&f.value);
                let mut lib = Vec::new();
                for &num_bits in &f.bits_range {
                    lib.extend(bit_flip_windows(&default, num_bits)?);
                }
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::BitsVal(BitsNode {
                        type_name: "BitFlips",
                        current: default.clone(),
                        default,
                        encoder: f.encoder,
                        source: BitsSource::Flips(lib),
                    }),
                )
            }
            Field::ByteFlip(f) => {
                let lib = byte_flip_windows(&f.value, f.num_bytes)?;
                let mut accessor = LibraryAccessor::new();
                accessor.add_owned(lib);
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::Bytes(BytesNode {
                        type_name: "ByteFlip",
                        current: f.value.clone(),
                        default: f.value,
                        encoder: f.encoder,
                        max_size: None,
                        source: BytesSource::Library(accessor),
                    }),
                )
            }
            Field::ByteFlips(f) => {
                let mut lib = Vec::new();
                for &num_bytes in &f.bytes_range {
                    lib.extend(byte_flip_windows(&f.value, num_bytes)?);
                }
                let mut accessor = LibraryAccessor::new();
                accessor.add_owned(lib);
                self.push_node(
                    f.name,
                    parent,
                    f.fuzzable,
                    NodeKind::Bytes(BytesNode {
                        type_name: "ByteFlips",
                        current: f.value.clone(),
                        default: f.value,
                        encoder: f.encoder,
                        max_size: None,
                        source: BytesSource::Library(accessor),
                    }),
                )
            }
            Field::CloneOf(f) => self.push_calc(
                f.name,
                parent,
                false,
                f.depends_on,
                CalcKind::Clone { encoder: f.encoder },
            ),
            Field::CalculatedBits(f) => self.push_calc(
                f.name,
                parent,
                false,
                f.depends_on,
                CalcKind::MapBits {
                    func: f.func,
                    encoder: f.encoder,
                },
            ),
            Field::CalculatedStr(f) => self.push_calc(
                f.name,
                parent,
                false,
                f.depends_on,
                CalcKind::MapBytes {
                    func: f.func,
                    encoder: f.encoder,
                },
            ),
            Field::HashField(f) => self.push_calc(
                f.name,
                parent,
                false,
                f.depends_on,
                CalcKind::Digest {
                    algo: f.algorithm,
                    encoder: f.encoder,
                },
            ),
            Field::Size(f) => {
                let op = match f.unit {
                    SizeUnit::Bits => CalcIntOp::SizeBits,
                    SizeUnit::Bytes => CalcIntOp::SizeBytes,
                };
                self.push_calc_int(f.name, parent, f.fuzzable, f.depends_on, op, f.length, f.encoder)?
            }
            Field::ElementCount(f) => self.push_calc_int(
                f.name,
                parent,
                f.fuzzable,
                f.depends_on,
                CalcIntOp::ElementCount,
                f.length,
                f.encoder,
            )?,
            Field::IndexOf(f) => self.push_calc_int(
                f.name,
                parent,
                f.fuzzable,
                f.depends_on,
                CalcIntOp::IndexOf,
                f.length,
                f.encoder,
            )?,
            Field::Checksum(f) => self.push_calc_int(
                f.name,
                parent,
                f.fuzzable,
                f.depends_on,
                CalcIntOp::Checksum(f.algorithm),
                f.length,
                f.encoder,
            )?,
            Field::Container(f) => {
                let id = self.push_container(f.name, parent, f.fuzzable, "Container", f.encoder, ContainerVariant::Plain);
                self.add_children(id, f.children)?;
                id
            }
            Field::If(f) => {
                let variant = ContainerVariant::Conditional {
                    condition: compile_condition(f.condition),
                    negate: false,
                };
                let id = self.push_container(f.name, parent, f.fuzzable, "If", f.encoder, variant);
                self.add_children(id, f.children)?;
                id
            }
            Field::IfNot(f) => {
                let variant = ContainerVariant::Conditional {
                    condition: compile_condition(f.condition),
                    negate: true,
                };
                let id = self.push_container(f.name, parent, f.fuzzable, "IfNot", f.encoder, variant);
                self.add_children(id, f.children)?;
                id
            }
            Field::Repeat(f) => {
                if f.min_times > f.max_times {
                    return Err(ModelError::invalid(format!(
                        "min_times ({}) > max_times ({})",
                        f.min_times, f.max_times
                    )));
                }
                if f.step == 0 {
                    return Err(ModelError::invalid("repeat step must be at least 1"));
                }
                let variant = ContainerVariant::Repeat {
                    min_times: f.min_times,
                    max_times: f.max_times,
                    step: f.step,
                };
                let id = self.push_container(f.name, parent, f.fuzzable, "Repeat", f.encoder, variant);
                self.add_children(id, f.children)?;
                id
            }
            Field::ForEach(f) => {
                let variant = ContainerVariant::ForEach {
                    dep_name: None,
                    dep: usize::MAX,
                    inner_total: 0,
                };
                let id = self.push_container(f.name, parent, f.fuzzable, "ForEach", f.encoder, variant);
                self.add_children(id, f.children)?;
                match f.source {
                    crate::container::ForEachSource::Named(name) => {
                        if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                            if let ContainerVariant::ForEach { dep_name, .. } = &mut c.variant {
                                *dep_name = Some(name);
                            }
                        }
                    }
                    crate::container::ForEachSource::Owned(field) => {
                        let dep_id = self.add_field(*field, Some(id))?;
                        if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                            if let ContainerVariant::ForEach { dep, .. } = &mut c.variant {
                                *dep = dep_id;
                            }
                        }
                    }
                }
                id
            }
        };
        Ok(id)
    }

    fn push_container(
        &mut self,
        name: Option<String>,
        parent: Option<NodeId>,
        fuzzable: bool,
        type_name: &'static str,
        encoder: BitsEncoder,
        variant: ContainerVariant,
    ) -> NodeId {
        self.push_node(
            name,
            parent,
            fuzzable,
            NodeKind::Container(ContainerNode {
                type_name,
                children: Vec::new(),
                cursor: 0,
                encoder,
                variant,
            }),
        )
    }

    fn add_children(&mut self, id: NodeId, children: Vec<Field>) -> Result<(), ModelError> {
        for child in children {
            let child_id = self.add_field(child, Some(id))?;
            if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                c.children.push(child_id);
            }
        }
        Ok(())
    }

    fn push_calc(
        &mut self,
        name: Option<String>,
        parent: Option<NodeId>,
        fuzzable: bool,
        dep_name: String,
        kind: CalcKind,
    ) -> NodeId {
        self.push_node(
            name,
            parent,
            fuzzable,
            NodeKind::Calc(CalcNode {
                dep_name,
                dep: usize::MAX,
                kind,
                last_rendered: Bits::empty(),
            }),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn push_calc_int(
        &mut self,
        name: Option<String>,
        parent: Option<NodeId>,
        fuzzable: bool,
        dep_name: String,
        op: CalcIntOp,
        length: u32,
        encoder: IntEncoder,
    ) -> Result<NodeId, ModelError> {
        check_length(length)?;
        let (min, max) = int_bounds(length, false);
        Ok(self.push_node(
            name,
            parent,
            fuzzable,
            NodeKind::Calc(CalcNode {
                dep_name,
                dep: usize::MAX,
                kind: CalcKind::Int(CalcIntNode {
                    op,
                    length,
                    min,
                    max,
                    encoder,
                    lib: LibraryAccessor::new(),
                    value: 0,
                    first_render: false,
                }),
                last_rendered: Bits::empty(),
            }),
        ))
    }

    /// Resolve calculated-field dependencies, condition targets and named
    /// ForEach drivers.
    pub(super) fn resolve_references(&mut self) -> Result<(), ModelError> {
        for id in 0..self.nodes.len() {
            match &self.nodes[id].kind {
                NodeKind::Calc(c) => {
                    let name = c.dep_name.clone();
                    let dep = self
                        .resolve_from(id, &name)
                        .ok_or_else(|| ModelError::UnresolvedDependency(name.clone()))?;
                    if let NodeKind::Calc(c) = &mut self.nodes[id].kind {
                        c.dep = dep;
                    }
                }
                NodeKind::Container(c) => match &c.variant {
                    ContainerVariant::Conditional { condition, .. } => {
                        if let CompiledCondition::Cmp { field_name, .. } = condition {
                            let name = field_name.clone();
                            let target = self
                                .resolve_from(id, &name)
                                .ok_or_else(|| ModelError::UnresolvedDependency(name.clone()))?;
                            if self.current_value(target).is_none() {
                                return Err(ModelError::invalid(format!(
                                    "condition target '{name}' is not a leaf field"
                                )));
                            }
                            if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                                if let ContainerVariant::Conditional {
                                    condition: CompiledCondition::Cmp { field, .. },
                                    ..
                                } = &mut c.variant
                                {
                                    *field = target;
                                }
                            }
                        }
                    }
                    ContainerVariant::ForEach { dep_name, dep, .. } => {
                        let resolved = if let Some(name) = dep_name.clone() {
                            self.resolve_from(id, &name)
                                .ok_or_else(|| ModelError::UnresolvedDependency(name.clone()))?
                        } else {
                            *dep
                        };
                        if resolved == usize::MAX {
                            return Err(ModelError::invalid("ForEach has no driver field"));
                        }
                        let in_children = self
                            .children_of(id)
                            .iter()
                            .any(|&ch| self.is_ancestor(ch, resolved));
                        if in_children {
                            return Err(ModelError::invalid(
                                "ForEach driver cannot live among its own children",
                            ));
                        }
                        if self.is_ancestor(resolved, id) {
                            return Err(ModelError::invalid(
                                "ForEach driver cannot enclose the ForEach",
                            ));
                        }
                        if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                            if let ContainerVariant::ForEach { dep, .. } = &mut c.variant {
                                *dep = resolved;
                            }
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        Ok(())
    }

    /// Build libraries, validate encoders against defaults, and count
    /// mutations bottom-up.
    pub(super) fn initialize(&mut self) -> Result<(), ModelError> {
        for id in 0..self.nodes.len() {
            self.init_leaf(id)?;
        }
        let mut memo = vec![None; self.nodes.len()];
        let mut visiting = Vec::new();
        for id in 0..self.nodes.len() {
            self.ensure_num(id, &mut memo, &mut visiting)?;
        }
        for id in 0..self.nodes.len() {
            if let Some(n) = memo[id] {
                self.nodes[id].num_mutations = n;
            }
        }
        // Cache ForEach inner totals now that child counts are known.
        for id in 0..self.nodes.len() {
            if let NodeKind::Container(c) = &self.nodes[id].kind {
                if matches!(c.variant, ContainerVariant::ForEach { .. }) {
                    let total: u64 = c
                        .children
                        .iter()
                        .map(|&ch| self.nodes[ch].num_mutations)
                        .sum();
                    if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                        if let ContainerVariant::ForEach { inner_total, .. } = &mut c.variant {
                            *inner_total = total;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Per-node initialisation: libraries, bounds, default encodability.
    fn init_leaf(&mut self, id: NodeId) -> Result<(), ModelError> {
        match &mut self.nodes[id].kind {
            NodeKind::Bytes(b) => {
                if let BytesSource::Library(lib) = &mut b.source {
                    match b.type_name {
                        "String" => {
                            lib.add_owned(string_local_lib(&b.default));
                            lib.add_shared(Arc::clone(&STRING_CLASS_LIB));
                        }
                        "Delimiter" => {
                            lib.add_owned(string_local_lib(&b.default));
                            lib.add_shared(Arc::clone(&DELIMITER_CLASS_LIB));
                        }
                        // Group and flip fields arrive with their lists built.
                        _ => {}
                    }
                    filter_bytes_library(lib, b.max_size);
                }
                b.encoder.encode(&b.default)?;
            }
            NodeKind::Int(i) => {
                let mut lib = LibraryAccessor::new();
                lib.add_owned((0..i.length).map(IntMutator::Flip).collect());
                lib.add_owned(int_class_lib(i.min, i.max));
                lib.add_owned(INTEGER_FILE_LIB.iter().map(|&v| IntMutator::Abs(v)).collect());
                filter_int_library(&mut lib, i.default, i.min, i.max);
                i.lib = lib;
                i.encoder.encode(i.default, i.length, i.signed)?;
            }
            NodeKind::BitsVal(b) => {
                b.encoder.encode(&b.default)?;
            }
            NodeKind::Calc(c) => match &mut c.kind {
                CalcKind::Clone { encoder } | CalcKind::MapBits { encoder, .. } => {
                    encoder.encode(&Bits::empty())?;
                }
                CalcKind::MapBytes { encoder, .. } | CalcKind::Digest { encoder, .. } => {
                    encoder.encode(&[])?;
                }
                CalcKind::Int(ci) => {
                    let mut lib = LibraryAccessor::new();
                    lib.add_owned((0..ci.length).map(IntMutator::Flip).collect());
                    lib.add_owned(int_class_lib(ci.min, ci.max));
                    lib.add_owned(INTEGER_FILE_LIB.iter().map(|&v| IntMutator::Abs(v)).collect());
                    filter_int_library(&mut lib, 0, ci.min, ci.max);
                    ci.lib = lib;
                    ci.encoder.encode(0, ci.length, false)?;
                }
            },
            NodeKind::Container(_) => {}
        }
        Ok(())
    }

    /// Mutation count of a node, memoised; detects count cycles created by
    /// ForEach references.
    fn ensure_num(
        &mut self,
        id: NodeId,
        memo: &mut Vec<Option<u64>>,
        visiting: &mut Vec<NodeId>,
    ) -> Result<u64, ModelError> {
        if let Some(n) = memo[id] {
            return Ok(n);
        }
        if visiting.contains(&id) {
            return Err(ModelError::invalid(
                "cyclic ForEach references make the mutation count undefined",
            ));
        }
        visiting.push(id);
        // Gather what the count needs before recursing, so the arena borrow
        // is released.
        enum Plan {
            Leaf(u64),
            Sum { children: Vec<NodeId>, extra: u64 },
            Product { children: Vec<NodeId>, dep: NodeId },
        }
        let fuzzable = self.nodes[id].fuzzable;
        let plan = if !fuzzable {
            Plan::Leaf(0)
        } else {
            match &self.nodes[id].kind {
                NodeKind::Bytes(b) => Plan::Leaf(match &b.source {
                    BytesSource::Static => 0,
                    BytesSource::Library(lib) => lib.size() as u64,
                    BytesSource::Random {
                        min_length,
                        max_length,
                        step,
                        count,
                        ..
                    } => match step {
                        Some(s) => (max_length - min_length) / s,
                        None => *count,
                    },
                    BytesSource::Dynamic { length, .. } => {
                        length.map(|l| (l * 8) as u64).unwrap_or(0)
                    }
                }),
                NodeKind::Int(i) => Plan::Leaf(i.lib.size() as u64),
                NodeKind::BitsVal(b) => Plan::Leaf(match &b.source {
                    BitsSource::Random {
                        min_length,
                        max_length,
                        step,
                        count,
                        ..
                    } => match step {
                        Some(s) => (max_length - min_length) / s,
                        None => *count,
                    },
                    BitsSource::Flips(lib) => lib.len() as u64,
                }),
                NodeKind::Calc(c) => Plan::Leaf(match &c.kind {
                    CalcKind::Int(ci) => ci.lib.size() as u64,
                    _ => 0,
                }),
                NodeKind::Container(c) => match &c.variant {
                    ContainerVariant::ForEach { dep, .. } => Plan::Product {
                        children: c.children.clone(),
                        dep: *dep,
                    },
                    ContainerVariant::Repeat {
                        min_times,
                        max_times,
                        step,
                    } => Plan::Sum {
                        children: c.children.clone(),
                        extra: (max_times - min_times) / step,
                    },
                    _ => Plan::Sum {
                        children: c.children.clone(),
                        extra: 0,
                    },
                },
            }
        };
        let num = match plan {
            Plan::Leaf(n) => n,
            Plan::Sum { children, extra } => {
                let mut sum = extra;
                for ch in children {
                    sum += self.ensure_num(ch, memo, visiting)?;
                }
                sum
            }
            Plan::Product { children, dep } => {
                let mut sum = 0u64;
                for ch in children {
                    sum += self.ensure_num(ch, memo, visiting)?;
                }
                let dep_num = self.ensure_num(dep, memo, visiting)?;
                dep_num * sum
            }
        };
        visiting.pop();
        memo[id] = Some(num);
        Ok(num)
    }
}

fn compile_condition(condition: Condition) -> CompiledCondition {
    match condition {
        Condition::True => CompiledCondition::Const(true),
        Condition::False => CompiledCondition::Const(false),
        Condition::Equal { field, value } => CompiledCondition::Cmp {
            field_name: field,
            field: usize::MAX,
            value,
            negate: false,
        },
        Condition::NotEqual { field, value } => CompiledCondition::Cmp {
            field_name: field,
            field: usize::MAX,
            value,
            negate: true,
        },
    }
}

fn check_length(length: u32) -> Result<(), ModelError> {
    if length == 0 || length > 64 {
        return Err(ModelError::invalid(format!(
            "bit length must be between 1 and 64, got {length}"
        )));
    }
    Ok(())
}

/// Natural and explicit bounds of a BitField.
fn bitfield_bounds(
    value: i128,
    length: u32,
    signed: bool,
    min_value: Option<i128>,
    max_value: Option<i128>,
) -> Result<(i128, i128), ModelError> {
    check_length(length)?;
    let (natural_min, natural_max) = int_bounds(length, signed);
    let mut min = natural_min;
    let mut max = natural_max;
    if let Some(m) = max_value {
        if m > natural_max {
            return Err(ModelError::invalid(format!(
                "max_value is too big: {m} > {natural_max}"
            )));
        }
        max = m;
    }
    if let Some(m) = min_value {
        if m < natural_min {
            return Err(ModelError::invalid(format!(
                "min_value is too small: {m} < {natural_min}"
            )));
        }
        min = m;
    }
    if min > max {
        return Err(ModelError::invalid(format!(
            "min_value ({min}) > max_value ({max})"
        )));
    }
    if value < min || value > max {
        return Err(ModelError::invalid(format!(
            "default value ({value}) not in range (min={min}, max={max})"
        )));
    }
    Ok((min, max))
}

fn validate_random(min_length: i64, max_length: i64, step: Option<i64>) -> Result<(), ModelError> {
    if min_length < 0 {
        return Err(ModelError::invalid(format!("min_length ({min_length}) < 0")));
    }
    if max_length <= 0 {
        return Err(ModelError::invalid(format!("max_length ({max_length}) <= 0")));
    }
    if min_length > max_length {
        return Err(ModelError::invalid(format!(
            "min_length ({min_length}) > max_length ({max_length})"
        )));
    }
    if let Some(s) = step {
        if s <= 0 {
            return Err(ModelError::invalid(format!("step ({s}) must be positive")));
        }
    }
    Ok(())
}

/// Local library for String and Delimiter fields: repetition powers of the
/// default plus NUL-adjacent variants.
fn string_local_lib(default: &[u8]) -> Vec<Vec<u8>> {
    let mut lib = Vec::new();
    for i in [2usize, 10, 100] {
        lib.push(default.repeat(i));
        let mut with_fe = default.repeat(i);
        with_fe.push(0xfe);
        lib.push(with_fe);
    }
    let mut nul_prefix = vec![0u8];
    nul_prefix.extend_from_slice(default);
    lib.push(nul_prefix);
    let mut nul_suffix = default.to_vec();
    nul_suffix.push(0);
    lib.push(nul_suffix);
    lib
}

/// Boundary grid for integer fields: five values at each end of the range,
/// quartile cut-points each ±(0..4), then off-by-N around the default.
fn int_class_lib(min: i128, max: i128) -> Vec<IntMutator> {
    let mut lib = Vec::new();
    let span = max - min;
    let quarter = span / 4;
    for i in 0..5i128 {
        lib.push(IntMutator::Abs(min.saturating_add(i)));
        lib.push(IntMutator::Abs(max.saturating_sub(i)));
        for s in 1..4i128 {
            let cut = max - quarter * s;
            lib.push(IntMutator::Abs(cut.saturating_add(i)));
            lib.push(IntMutator::Abs(cut.saturating_sub(i)));
        }
    }
    for i in 1..5i128 {
        lib.push(IntMutator::Rel(i));
        lib.push(IntMutator::Rel(-i));
    }
    lib
}

/// Suppress out-of-range probes and duplicate values via the skip set.
fn filter_int_library(lib: &mut LibraryAccessor<IntMutator>, default: i128, min: i128, max: i128) {
    let mut seen: HashSet<i128> = HashSet::new();
    lib.mark_skips(|m| {
        let v = m.apply(default);
        if v < min || v > max {
            return true;
        }
        !seen.insert(v)
    });
}

/// All positions of a `num_bits`-wide flipped window over the default.
fn bit_flip_windows(default: &Bits, num_bits: usize) -> Result<Vec<Bits>, ModelError> {
    let total = default.len();
    if num_bits == 0 || num_bits > total {
        return Err(ModelError::invalid(format!(
            "cannot flip {num_bits} bits of a {total} bit value"
        )));
    }
    Ok((0..=total - num_bits)
        .map(|i| default.with_bits_flipped(i, num_bits))
        .collect())
}

/// All positions of a `num_bytes`-wide inverted window over the default.
fn byte_flip_windows(default: &[u8], num_bytes: usize) -> Result<Vec<Vec<u8>>, ModelError> {
    let total = default.len();
    if num_bytes == 0 || num_bytes > total {
        return Err(ModelError::invalid(format!(
            "cannot flip {num_bytes} bytes of a {total} byte value"
        )));
    }
    Ok((0..=total - num_bytes)
        .map(|i| {
            let mut out = default.to_vec();
            for b in &mut out[i..i + num_bytes] {
                *b ^= 0xff;
            }
            out
        })
        .collect())
}
