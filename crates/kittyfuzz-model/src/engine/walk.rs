//! Mutation walking: advance, skip, reset.
//!
//! Containers compose their children's mutation spaces sequentially: at any
//! moment at most one child subtree is away from its default, and exhausted
//! children are reset before the cursor moves on. ForEach is the exception
//! by construction, driving a field elsewhere in the tree while its own
//! children walk their space.

use super::{
    BitsSource, BytesSource, CalcKind, ContainerVariant, Engine, NodeId, NodeKind,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

impl Engine {
    /// Remaining mutations of a node.
    fn remaining(&self, id: NodeId) -> u64 {
        let node = &self.nodes[id];
        node.num_mutations - (node.current_index + 1) as u64
    }

    /// Advance one step; false when exhausted.
    pub(crate) fn mutate(&mut self, id: NodeId) -> bool {
        let is_foreach = matches!(
            &self.nodes[id].kind,
            NodeKind::Container(c) if matches!(c.variant, ContainerVariant::ForEach { .. })
        );
        if is_foreach {
            self.mutate_foreach(id)
        } else {
            self.skip(id, 1) == 1
        }
    }

    /// Advance up to `n` steps; returns how many were taken.
    pub(crate) fn skip(&mut self, id: NodeId, n: u64) -> u64 {
        let n = n.min(self.remaining(id));
        if n == 0 {
            return 0;
        }
        match &self.nodes[id].kind {
            NodeKind::Container(c) => match c.variant {
                ContainerVariant::ForEach { .. } => self.skip_foreach(id, n),
                _ => self.skip_container(id, n),
            },
            _ => self.skip_leaf(id, n),
        }
    }

    /// Leaf skip: O(1) for library-backed fields, stepwise for seeded
    /// random fields (the RNG stream must advance draw by draw).
    fn skip_leaf(&mut self, id: NodeId, n: u64) -> u64 {
        let stepwise = matches!(
            &self.nodes[id].kind,
            NodeKind::Bytes(b) if matches!(b.source, BytesSource::Random { .. })
        ) || matches!(
            &self.nodes[id].kind,
            NodeKind::BitsVal(b) if matches!(b.source, BitsSource::Random { .. })
        );
        if stepwise {
            for taken in 0..n {
                if self.remaining(id) == 0 {
                    return taken;
                }
                self.nodes[id].current_index += 1;
                self.apply_leaf(id);
            }
            return n;
        }
        self.nodes[id].current_index += n as i64;
        self.apply_leaf(id);
        n
    }

    /// Refresh a leaf's current value from its mutation index.
    fn apply_leaf(&mut self, id: NodeId) {
        let index = self.nodes[id].current_index;
        if index < 0 {
            return;
        }
        let index = index as usize;
        match &mut self.nodes[id].kind {
            NodeKind::Bytes(b) => match &mut b.source {
                BytesSource::Static => {}
                BytesSource::Library(lib) => {
                    if let Some(v) = lib.get(index) {
                        b.current = v.clone();
                    }
                }
                BytesSource::Random {
                    min_length,
                    max_length,
                    step,
                    rng,
                    ..
                } => {
                    let length = match step {
                        Some(s) => *min_length + *s * index as u64,
                        None => rng.gen_range(*min_length..=*max_length),
                    };
                    b.current = (0..length).map(|_| rng.gen::<u8>()).collect();
                }
                // Dynamic mutations act on the rendering, not the value.
                BytesSource::Dynamic { .. } => {}
            },
            NodeKind::Int(i) => {
                if let Some(m) = i.lib.get(index) {
                    i.current = m.apply(i.default).clamp(i.min, i.max);
                }
            }
            NodeKind::BitsVal(b) => match &mut b.source {
                BitsSource::Random {
                    min_length,
                    max_length,
                    step,
                    rng,
                    ..
                } => {
                    let length = match step {
                        Some(s) => *min_length + *s * index as u64,
                        None => rng.gen_range(*min_length..=*max_length),
                    } as usize;
                    let bytes: Vec<u8> = (0..length.div_ceil(8)).map(|_| rng.gen::<u8>()).collect();
                    b.current = crate::bits::Bits::from_bytes(&bytes).slice(0, length);
                }
                BitsSource::Flips(lib) => {
                    if let Some(v) = lib.get(index) {
                        b.current = v.clone();
                    }
                }
            },
            NodeKind::Calc(c) => {
                if let CalcKind::Int(ci) = &mut c.kind {
                    ci.first_render = true;
                }
            }
            NodeKind::Container(_) => {}
        }
    }

    /// Sequential container skip: burn the repetition dimension first (for
    /// Repeat), then walk the children, resetting each exhausted child
    /// before moving the cursor on.
    fn skip_container(&mut self, id: NodeId, n: u64) -> u64 {
        let mut taken = 0u64;
        if let NodeKind::Container(c) = &self.nodes[id].kind {
            if let ContainerVariant::Repeat {
                min_times,
                max_times,
                step,
            } = c.variant
            {
                let dim = (max_times - min_times) / step;
                let done = (self.nodes[id].current_index + 1) as u64;
                if done < dim {
                    taken = n.min(dim - done);
                }
            }
        }
        while taken < n {
            let child = match &self.nodes[id].kind {
                NodeKind::Container(c) => c.children.get(c.cursor).copied(),
                _ => None,
            };
            let Some(child) = child else { break };
            let k = self.skip(child, n - taken);
            taken += k;
            if taken < n {
                self.reset(child);
                if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                    c.cursor += 1;
                }
            }
        }
        self.nodes[id].current_index += taken as i64;
        taken
    }

    /// One ForEach step: the index space is outer (driver mutations) ×
    /// inner (children walkthrough); the driver advances when the inner
    /// space wraps and is reset between outer rounds.
    fn mutate_foreach(&mut self, id: NodeId) -> bool {
        if self.remaining(id) == 0 {
            return false;
        }
        let (dep, inner_total) = match &self.nodes[id].kind {
            NodeKind::Container(c) => match c.variant {
                ContainerVariant::ForEach {
                    dep, inner_total, ..
                } => (dep, inner_total),
                _ => return false,
            },
            _ => return false,
        };
        if inner_total == 0 {
            return false;
        }
        let next = (self.nodes[id].current_index + 1) as u64;
        if next % inner_total == 0 {
            // New outer round: fresh children, driver one step further.
            if next == 0 {
                self.reset(dep);
            } else {
                for ch in self.children_of(id) {
                    self.reset(ch);
                }
                if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                    c.cursor = 0;
                }
            }
            self.mutate(dep);
        }
        // Advance the inner walkthrough by one.
        loop {
            let child = match &self.nodes[id].kind {
                NodeKind::Container(c) => c.children.get(c.cursor).copied(),
                _ => None,
            };
            let Some(child) = child else { return false };
            if self.mutate(child) {
                break;
            }
            self.reset(child);
            if let NodeKind::Container(c) = &mut self.nodes[id].kind {
                c.cursor += 1;
            }
        }
        self.nodes[id].current_index += 1;
        true
    }

    fn skip_foreach(&mut self, id: NodeId, n: u64) -> u64 {
        for taken in 0..n {
            if !self.mutate_foreach(id) {
                return taken;
            }
        }
        n
    }

    /// Return a subtree to its default state; seeded RNGs are re-seeded so
    /// the mutation sequence replays identically.
    pub(crate) fn reset(&mut self, id: NodeId) {
        self.nodes[id].current_index = -1;
        self.nodes[id].offset = None;
        let mut foreach_dep = None;
        match &mut self.nodes[id].kind {
            NodeKind::Bytes(b) => {
                b.current = b.default.clone();
                if let BytesSource::Random { seed, rng, .. } = &mut b.source {
                    *rng = ChaCha8Rng::seed_from_u64(*seed);
                }
            }
            NodeKind::Int(i) => {
                i.current = i.default;
            }
            NodeKind::BitsVal(b) => {
                b.current = b.default.clone();
                if let BitsSource::Random { seed, rng, .. } = &mut b.source {
                    *rng = ChaCha8Rng::seed_from_u64(*seed);
                }
            }
            NodeKind::Calc(c) => {
                if let CalcKind::Int(ci) = &mut c.kind {
                    ci.value = 0;
                    ci.first_render = false;
                }
                c.last_rendered = crate::bits::Bits::empty();
            }
            NodeKind::Container(c) => {
                c.cursor = 0;
                if let ContainerVariant::ForEach { dep, .. } = c.variant {
                    foreach_dep = Some(dep);
                }
            }
        }
        for child in self.children_of(id) {
            self.reset(child);
        }
        if let Some(dep) = foreach_dep {
            self.reset(dep);
        }
    }
}
