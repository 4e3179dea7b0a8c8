//! Container declarations: interior nodes composing fields into ordered
//! groups, optionally gated by a condition, repeated, or crossed with
//! another field's mutations.

use crate::condition::Condition;
use crate::encoder::BitsEncoder;
use crate::field::Field;

/// An ordered group of child fields; children render in declaration order
/// and mutate one at a time, sequentially.
#[derive(Debug, Clone)]
pub struct Container {
    pub(crate) children: Vec<Field>,
    pub(crate) encoder: BitsEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl Container {
    #[must_use]
    pub fn new(children: Vec<Field>) -> Self {
        Container {
            children,
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    /// Append a child.
    #[must_use]
    pub fn push(mut self, child: impl Into<Field>) -> Self {
        self.children.push(child.into());
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: BitsEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

/// A group rendered only while its condition applies; while it does not,
/// the group renders empty bits but keeps contributing its sub-mutations
/// to the enclosing index space.
#[derive(Debug, Clone)]
pub struct If {
    pub(crate) condition: Condition,
    pub(crate) children: Vec<Field>,
    pub(crate) encoder: BitsEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl If {
    #[must_use]
    pub fn new(condition: Condition, children: Vec<Field>) -> Self {
        If {
            condition,
            children,
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: BitsEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

/// A group rendered only while its condition does not apply.
#[derive(Debug, Clone)]
pub struct IfNot {
    pub(crate) condition: Condition,
    pub(crate) children: Vec<Field>,
    pub(crate) encoder: BitsEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl IfNot {
    #[must_use]
    pub fn new(condition: Condition, children: Vec<Field>) -> Self {
        IfNot {
            condition,
            children,
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: BitsEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

/// A repeated group. The mutation space is the repetition counts
/// `min_times + step, …, max_times` (defaults rendered that many times)
/// followed by the children's own mutations rendered `min_times` times.
#[derive(Debug, Clone)]
pub struct Repeat {
    pub(crate) children: Vec<Field>,
    pub(crate) min_times: u64,
    pub(crate) max_times: u64,
    pub(crate) step: u64,
    pub(crate) encoder: BitsEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl Repeat {
    #[must_use]
    pub fn new(children: Vec<Field>) -> Self {
        Repeat {
            children,
            min_times: 1,
            max_times: 1,
            step: 1,
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn times(mut self, min_times: u64, max_times: u64) -> Self {
        self.min_times = min_times;
        self.max_times = max_times;
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: BitsEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

/// Where a [`ForEach`] gets the field it iterates over.
#[derive(Debug, Clone)]
pub(crate) enum ForEachSource {
    /// A named field elsewhere in the template.
    Named(String),
    /// A private driver field, never rendered.
    Owned(Box<Field>),
}

/// A cross-product group: for every mutation of the driven field, the
/// children are walked through their full mutation space; the driven field
/// is reset between outer steps.
#[derive(Debug, Clone)]
pub struct ForEach {
    pub(crate) source: ForEachSource,
    pub(crate) children: Vec<Field>,
    pub(crate) encoder: BitsEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl ForEach {
    /// Iterate over the mutations of a named field elsewhere in the tree.
    #[must_use]
    pub fn new(mutated_field: impl Into<String>, children: Vec<Field>) -> Self {
        ForEach {
            source: ForEachSource::Named(mutated_field.into()),
            children,
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    /// Iterate over a private field that is never rendered itself.
    #[must_use]
    pub fn over(mutated_field: impl Into<Field>, children: Vec<Field>) -> Self {
        ForEach {
            source: ForEachSource::Owned(Box::new(mutated_field.into())),
            children,
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: BitsEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}
