//! Rendering: the bit-exact serialisation of the current tree state.
//!
//! A render is a top-down walk. Calculated fields render their dependency
//! first; the [`RenderContext`] records which calculated nodes are already
//! on the render path, and a node that meets itself there yields its
//! in-render fallback value instead of recursing, which is how inclusive
//! sizes and self-containing checksums terminate.
//!
//! Rendering never fails: every encoder has been exercised against the
//! tree's defaults during compilation, so a runtime encode error is a logic
//! bug and degrades to empty bits with a warning.

use super::{
    BytesSource, CalcIntOp, CalcKind, CompiledCondition, ContainerVariant, CurrentValue, Engine,
    NodeId, NodeKind, RenderContext,
};
use crate::bits::Bits;
use crate::condition::ConditionValue;
use crate::crypto::{ChecksumAlgorithm, HashAlgorithm};
use crate::encoder::{BitsEncoder, IntEncoder, StrEncoder};
use crate::error::EncodingError;
use std::sync::Arc;

fn ok_or_empty(res: Result<Bits, EncodingError>) -> Bits {
    match res {
        Ok(bits) => bits,
        Err(e) => {
            log::warn!("encoding failed during render: {e}");
            Bits::empty()
        }
    }
}

enum CalcPlan {
    Passthrough {
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
    Int {
        op: IntPlan,
        length: u32,
        min: i128,
        max: i128,
        encoder: IntEncoder,
    },
}

enum IntPlan {
    SizeBits,
    SizeBytes,
    ElementCount,
    IndexOf,
    Checksum(ChecksumAlgorithm),
}

impl Engine {
    /// Render a subtree with the given context.
    pub(crate) fn render(&mut self, id: NodeId, ctx: &mut RenderContext) -> Bits {
        match &self.nodes[id].kind {
            NodeKind::Bytes(_) | NodeKind::Int(_) | NodeKind::BitsVal(_) => self.render_leaf(id),
            NodeKind::Calc(_) => self.render_calc(id, ctx),
            NodeKind::Container(_) => self.render_container(id, ctx),
        }
    }

    /// Render from a fresh context (the usual entry point).
    pub(crate) fn render_root(&mut self, id: NodeId) -> Bits {
        let mut ctx = RenderContext::new();
        self.assign_offsets(id, 0, &mut ctx);
        let mut ctx = RenderContext::new();
        self.render(id, &mut ctx)
    }

    fn render_leaf(&mut self, id: NodeId) -> Bits {
        let current_index = self.nodes[id].current_index;
        match &mut self.nodes[id].kind {
            NodeKind::Bytes(b) => {
                let mut bits = ok_or_empty(b.encoder.encode(&b.current));
                if let BytesSource::Dynamic { .. } = b.source {
                    // Mutation i flips bit i of the freshly encoded value.
                    if current_index >= 0 {
                        bits = bits.with_bit_flipped(current_index as usize);
                    }
                }
                bits
            }
            NodeKind::Int(i) => ok_or_empty(i.encoder.encode(i.current, i.length, i.signed)),
            NodeKind::BitsVal(b) => ok_or_empty(b.encoder.encode(&b.current)),
            _ => Bits::empty(),
        }
    }

    fn render_calc(&mut self, id: NodeId, ctx: &mut RenderContext) -> Bits {
        if ctx.contains(id) {
            return self.in_render_fallback(id);
        }
        let (dep, plan) = {
            let NodeKind::Calc(c) = &self.nodes[id].kind else {
                return Bits::empty();
            };
            let plan = match &c.kind {
                CalcKind::Clone { encoder } => CalcPlan::Passthrough {
                    encoder: encoder.clone(),
                },
                CalcKind::MapBits { func, encoder } => CalcPlan::MapBits {
                    func: Arc::clone(func),
                    encoder: encoder.clone(),
                },
                CalcKind::MapBytes { func, encoder } => CalcPlan::MapBytes {
                    func: Arc::clone(func),
                    encoder: encoder.clone(),
                },
                CalcKind::Digest { algo, encoder } => CalcPlan::Digest {
                    algo: algo.clone(),
                    encoder: encoder.clone(),
                },
                CalcKind::Int(ci) => CalcPlan::Int {
                    op: match &ci.op {
                        CalcIntOp::SizeBits => IntPlan::SizeBits,
                        CalcIntOp::SizeBytes => IntPlan::SizeBytes,
                        CalcIntOp::ElementCount => IntPlan::ElementCount,
                        CalcIntOp::IndexOf => IntPlan::IndexOf,
                        CalcIntOp::Checksum(a) => IntPlan::Checksum(a.clone()),
                    },
                    length: ci.length,
                    min: ci.min,
                    max: ci.max,
                    encoder: ci.encoder,
                },
            };
            (c.dep, plan)
        };
        ctx.push(id);
        let dep_bits = self.render(dep, ctx);
        ctx.pop();
        let rendered = match plan {
            CalcPlan::Passthrough { encoder } => ok_or_empty(encoder.encode(&dep_bits)),
            CalcPlan::MapBits { func, encoder } => ok_or_empty(encoder.encode(&func(&dep_bits))),
            CalcPlan::MapBytes { func, encoder } => {
                ok_or_empty(encoder.encode(&func(&dep_bits.to_bytes())))
            }
            CalcPlan::Digest { algo, encoder } => {
                ok_or_empty(encoder.encode(&algo.digest(&dep_bits.to_bytes())))
            }
            CalcPlan::Int {
                op,
                length,
                min,
                max,
                encoder,
            } => {
                let raw: i128 = match op {
                    IntPlan::SizeBits => dep_bits.len() as i128,
                    IntPlan::SizeBytes => (dep_bits.len() / 8) as i128,
                    IntPlan::ElementCount => {
                        let mut fields = Vec::new();
                        let mut sub = RenderContext::with(id);
                        self.rendered_leaves(dep, &mut sub, &mut fields);
                        fields.len() as i128
                    }
                    IntPlan::IndexOf => self.index_of(id, dep) as i128,
                    IntPlan::Checksum(algo) => i128::from(algo.compute(&dep_bits.to_bytes())),
                };
                let calculated = raw.clamp(min, max);
                let mutating = self.nodes[id].current_index >= 0;
                let index = self.nodes[id].current_index;
                let mut value = calculated;
                if let NodeKind::Calc(c) = &mut self.nodes[id].kind {
                    if let CalcKind::Int(ci) = &mut c.kind {
                        if mutating {
                            if ci.first_render {
                                // Replay the probe on top of the fresh value.
                                if let Some(m) = ci.lib.get(index as usize).copied() {
                                    ci.value = m.apply(calculated).clamp(min, max);
                                }
                                ci.first_render = false;
                            }
                        } else {
                            ci.value = calculated;
                        }
                        value = ci.value;
                    }
                }
                ok_or_empty(encoder.encode(value, length, false))
            }
        };
        if let NodeKind::Calc(c) = &mut self.nodes[id].kind {
            c.last_rendered = rendered.clone();
        }
        rendered
    }

    /// Fallback for a calculated field nested inside its own dependency.
    fn in_render_fallback(&self, id: NodeId) -> Bits {
        match &self.nodes[id].kind {
            NodeKind::Calc(c) => match &c.kind {
                CalcKind::Clone { .. } | CalcKind::MapBits { .. } | CalcKind::MapBytes { .. } => {
                    Bits::empty()
                }
                CalcKind::Digest { algo, .. } => Bits::zeros(algo.digest_bits()),
                CalcKind::Int(ci) => Bits::zeros(ci.length as usize),
            },
            _ => Bits::empty(),
        }
    }

    fn render_container(&mut self, id: NodeId, ctx: &mut RenderContext) -> Bits {
        let (children, encoder, applies, times) = self.container_render_plan(id);
        if !applies {
            return Bits::empty();
        }
        let mut body = Bits::empty();
        for ch in &children {
            body.append(&self.render(*ch, ctx));
        }
        if times != 1 {
            let mut repeated = Bits::empty();
            for _ in 0..times {
                repeated.append(&body);
            }
            body = repeated;
        }
        ok_or_empty(encoder.encode(&body))
    }

    /// (children, encoder, condition-applies, repetition count).
    fn container_render_plan(&self, id: NodeId) -> (Vec<NodeId>, BitsEncoder, bool, u64) {
        let NodeKind::Container(c) = &self.nodes[id].kind else {
            return (Vec::new(), BitsEncoder::Identity, true, 1);
        };
        let children = c.children.clone();
        let encoder = c.encoder.clone();
        let (applies, times) = match &c.variant {
            ContainerVariant::Plain | ContainerVariant::ForEach { .. } => (true, 1),
            ContainerVariant::Conditional { condition, negate } => {
                (self.condition_holds(condition) != *negate, 1)
            }
            ContainerVariant::Repeat {
                min_times,
                max_times,
                step,
            } => {
                let dim = (max_times - min_times) / step;
                let idx = self.nodes[id].current_index;
                let times = if idx >= 0 && (idx as u64) < dim {
                    // Count mutations render min+step, …, max copies.
                    min_times + step * (idx as u64 + 1)
                } else {
                    *min_times
                };
                (true, times)
            }
        };
        (children, encoder, applies, times)
    }

    fn condition_holds(&self, condition: &CompiledCondition) -> bool {
        match condition {
            CompiledCondition::Const(b) => *b,
            CompiledCondition::Cmp {
                field,
                value,
                negate,
                ..
            } => {
                let eq = match (self.current_value(*field), value) {
                    (Some(CurrentValue::Bytes(b)), ConditionValue::Bytes(v)) => b == v.as_slice(),
                    (Some(CurrentValue::Int(i)), ConditionValue::Int(v)) => i == *v,
                    (Some(CurrentValue::Bits(b)), ConditionValue::Bits(v)) => b == v,
                    _ => false,
                };
                eq != *negate
            }
        }
    }

    /// Offset pre-pass: assign each node its bit offset, returning the bit
    /// length the subtree contributes at its position.
    pub(crate) fn assign_offsets(
        &mut self,
        id: NodeId,
        offset: usize,
        ctx: &mut RenderContext,
    ) -> usize {
        self.nodes[id].offset = Some(offset);
        if !matches!(self.nodes[id].kind, NodeKind::Container(_)) {
            return self.render(id, ctx).len();
        }
        let (children, encoder, applies, times) = self.container_render_plan(id);
        let mut cursor = offset;
        let mut sum = 0usize;
        for ch in children {
            let len = self.assign_offsets(ch, cursor, ctx);
            cursor += len;
            sum += len;
        }
        if !applies {
            return 0;
        }
        let raw = sum * times as usize;
        match encoder {
            BitsEncoder::Identity | BitsEncoder::Reverse => raw,
            BitsEncoder::ByteAligned => raw.div_ceil(8) * 8,
            // Length depends on the encoding; measure it.
            BitsEncoder::Wrapped(_) => self.render(id, ctx).len(),
        }
    }

    /// Ordered list of leaf-like nodes that currently render non-empty.
    pub(crate) fn rendered_leaves(
        &mut self,
        id: NodeId,
        ctx: &mut RenderContext,
        out: &mut Vec<NodeId>,
    ) {
        if matches!(self.nodes[id].kind, NodeKind::Container(_)) {
            let (children, _, applies, times) = self.container_render_plan(id);
            if !applies {
                return;
            }
            for _ in 0..times {
                for ch in &children {
                    self.rendered_leaves(*ch, ctx, out);
                }
            }
        } else if !self.render(id, ctx).is_empty() {
            out.push(id);
        }
    }

    /// Position of `dep` among its enclosing container's rendered fields;
    /// 0 without an encloser, the list length when not rendered.
    fn index_of(&mut self, initiator: NodeId, dep: NodeId) -> usize {
        let Some(parent) = self.nodes[dep].parent else {
            return 0;
        };
        let mut fields = Vec::new();
        let mut sub = RenderContext::with(initiator);
        self.rendered_leaves(parent, &mut sub, &mut fields);
        fields
            .iter()
            .position(|&f| f == dep)
            .unwrap_or(fields.len())
    }
}
