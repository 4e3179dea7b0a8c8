//! Template: a named root container wrapping the tree into one indexable
//! stream of mutations.

use crate::bits::Bits;
use crate::engine::Engine;
use crate::error::ModelError;
use crate::field::Field;
use serde_json::{json, Value};
use std::collections::HashMap;

/// The stage wildcard accepted by [`Template::mutation_for_stage`].
pub const STAGE_ANY: &str = "******************";

/// A compiled message template and its mutation sequencer.
///
/// Mutations are produced in a total, deterministic order fixed by the
/// tree shape: two templates with equal [`Template::hash`] enumerate the
/// same byte sequences.
#[derive(Debug)]
pub struct Template {
    name: String,
    engine: Engine,
    num_mutations: u64,
    hash: u64,
}

impl Template {
    /// Compile a declaration tree. All configuration errors (invalid
    /// parameters, unresolved dependencies, unsupported encodings) surface
    /// here; the template afterwards mutates and renders infallibly.
    pub fn new(name: impl Into<String>, root: impl Into<Field>) -> Result<Self, ModelError> {
        let engine = Engine::compile(root.into())?;
        let num_mutations = engine.node(engine.root).num_mutations;
        let hash = engine.tree_hash();
        Ok(Template {
            name: name.into(),
            engine,
            num_mutations,
            hash,
        })
    }

    /// The template's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of mutations in the stream.
    #[must_use]
    pub fn num_mutations(&self) -> u64 {
        self.num_mutations
    }

    /// Index of the last mutation of the whole stream, or `None` for an
    /// empty stream.
    #[must_use]
    pub fn last_index(&self) -> Option<u64> {
        self.num_mutations.checked_sub(1)
    }

    /// Last completed mutation index; −1 while pristine.
    #[must_use]
    pub fn current_index(&self) -> i64 {
        self.engine.node(self.engine.root).current_index
    }

    /// Advance the stream one step; false once exhausted.
    pub fn mutate(&mut self) -> bool {
        let root = self.engine.root;
        self.engine.mutate(root)
    }

    /// Advance up to `n` steps; returns how many were actually taken.
    pub fn skip(&mut self, n: u64) -> u64 {
        let root = self.engine.root;
        self.engine.skip(root, n)
    }

    /// Return the whole tree to its default state.
    pub fn reset(&mut self) {
        let root = self.engine.root;
        self.engine.reset(root);
    }

    /// Render the current state of the tree: an offset pre-pass followed by
    /// the bit-exact serialisation.
    pub fn render(&mut self) -> Bits {
        let root = self.engine.root;
        self.engine.render_root(root)
    }

    /// The rendered bytes, zero-padded to whole bytes.
    pub fn render_bytes(&mut self) -> Vec<u8> {
        self.render().to_bytes()
    }

    /// Stable digest of the tree shape and every leaf's determining
    /// parameters; invariant across mutate/render/reset and process
    /// restarts.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Metadata for the current test: template identity, stream position,
    /// and the mutating field's details.
    pub fn get_info(&mut self) -> Value {
        let root = self.engine.root;
        let field = self
            .engine
            .deepest_mutating(root)
            .unwrap_or(root);
        let field_info = self.engine.node_info(field);
        json!({
            "template/name": self.name,
            "template/hash": format!("{:016x}", self.hash),
            "test/current index": self.current_index(),
            "test/total mutations": self.num_mutations,
            "field": field_info,
        })
    }

    /// Structural metadata for the whole tree, recursively.
    pub fn get_structure(&mut self) -> Value {
        let root = self.engine.root;
        self.engine.structure(root)
    }

    /// Name of the deepest currently-mutating field, if any; this is the
    /// "stage" a client-mode driver matches against.
    #[must_use]
    pub fn current_stage(&self) -> Option<&str> {
        let root = self.engine.root;
        let id = self.engine.deepest_mutating(root)?;
        self.engine.node(id).name.as_deref()
    }

    /// Feed session data to every Dynamic field whose key is present.
    pub fn set_session_data(&mut self, data: &HashMap<String, Vec<u8>>) {
        self.engine.apply_session_data(data);
    }

    /// Client-mode payload lookup: render only when `stage` names the
    /// deepest fuzzed field (case-insensitive) or is [`STAGE_ANY`].
    pub fn mutation_for_stage(
        &mut self,
        stage: &str,
        data: &HashMap<String, Vec<u8>>,
    ) -> Option<Vec<u8>> {
        self.set_session_data(data);
        if stage != STAGE_ANY {
            let current = self.current_stage()?;
            if !current.eq_ignore_ascii_case(stage) {
                return None;
            }
        }
        Some(self.render_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::field::{BitField, StringField};

    fn two_field_template() -> Template {
        Template::new(
            "t",
            Container::new(vec![
                BitField::new(0x12, 8).with_name("id").into(),
                StringField::new("a").with_name("s").into(),
            ]),
        )
        .expect("valid template")
    }

    #[test]
    fn pristine_current_index_is_minus_one() {
        let t = two_field_template();
        assert_eq!(t.current_index(), -1);
    }

    #[test]
    fn num_mutations_is_sum_of_children() {
        let mut t = two_field_template();
        let total = t.num_mutations();
        let mut count = 0;
        while t.mutate() {
            count += 1;
        }
        assert_eq!(count, total);
        assert!(!t.mutate());
    }

    #[test]
    fn hash_is_stable_across_lifecycle() {
        let mut t = two_field_template();
        let h = t.hash();
        t.mutate();
        t.render();
        assert_eq!(t.hash(), h);
        t.reset();
        assert_eq!(t.hash(), h);
        // And equal for an identical twin.
        assert_eq!(two_field_template().hash(), h);
    }

    #[test]
    fn hash_ignores_names_but_not_defaults() {
        let renamed = Template::new(
            "t2",
            Container::new(vec![
                BitField::new(0x12, 8).with_name("other").into(),
                StringField::new("a").with_name("other2").into(),
            ]),
        )
        .expect("valid template");
        assert_eq!(renamed.hash(), two_field_template().hash());

        let changed = Template::new(
            "t",
            Container::new(vec![
                BitField::new(0x13, 8).with_name("id").into(),
                StringField::new("a").with_name("s").into(),
            ]),
        )
        .expect("valid template");
        assert_ne!(changed.hash(), two_field_template().hash());
    }

    #[test]
    fn stage_matching_is_case_insensitive() {
        let mut t = two_field_template();
        t.mutate();
        // The BitField mutates first.
        assert_eq!(t.current_stage(), Some("id"));
        let data = HashMap::new();
        assert!(t.mutation_for_stage("ID", &data).is_some());
        assert!(t.mutation_for_stage("s", &data).is_none());
        assert!(t.mutation_for_stage(STAGE_ANY, &data).is_some());
    }
}
