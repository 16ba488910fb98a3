//! Runtime context: variable scoping and iteration state
//!
//! Contexts are extended, never mutated: every binding produces a child that
//! sees all parent variables unless shadowed. Parents are shared behind an
//! `Arc`, so extension is cheap and parents stay immutable for concurrent
//! readers.

use crate::model::Collection;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Prototype-style variable scope: local bindings plus a shared parent chain
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    locals: FxHashMap<String, Collection>,
    parent: Option<Arc<VariableScope>>,
}

impl VariableScope {
    /// Root scope with the given bindings
    pub fn root(locals: FxHashMap<String, Collection>) -> Self {
        Self {
            locals,
            parent: None,
        }
    }

    /// Child scope with one additional binding; the receiver becomes the
    /// (immutable) parent
    pub fn define(&self, name: impl Into<String>, value: Collection) -> VariableScope {
        let mut locals = FxHashMap::default();
        locals.insert(name.into(), value);
        VariableScope {
            locals,
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Look up a name, walking the parent chain
    pub fn get(&self, name: &str) -> Option<&Collection> {
        if let Some(found) = self.locals.get(name) {
            return Some(found);
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// True when the name resolves in this scope or any parent
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Per-evaluation runtime state.
///
/// The *focus* (the collection the current node operates on) is threaded
/// through the interpreter as an explicit argument; the context carries
/// everything else: the original input, environment variables and
/// user/`defineVariable` bindings.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    /// The original top-level input collection (`%context`, `%resource`)
    root: Collection,
    /// `%`-variables: built-in environment plus user and `defineVariable`
    /// bindings (names stored without the `%` sigil)
    variables: VariableScope,
    /// `$this`, when inside an iteration or set at entry
    this_value: Option<Collection>,
    /// `$index`, when inside an iteration
    index: Option<i64>,
    /// `$total`, when inside `aggregate`
    total: Option<Collection>,
}

impl EvaluationContext {
    /// Create the context for a fresh evaluation; `%context`, `%resource`
    /// and `%rootResource` are bound to the input
    pub fn new(root: Collection) -> Self {
        let mut variables = FxHashMap::default();
        variables.insert("context".to_string(), root.share());
        variables.insert("resource".to_string(), root.share());
        variables.insert("rootResource".to_string(), root.share());
        Self {
            root: root.share(),
            variables: VariableScope::root(variables),
            this_value: None,
            index: None,
            total: None,
        }
    }

    /// The original input collection
    pub fn root(&self) -> &Collection {
        &self.root
    }

    /// Look up a `%`-variable (name without sigil)
    pub fn variable(&self, name: &str) -> Option<&Collection> {
        self.variables.get(name)
    }

    /// True when a `%`-variable is bound
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    /// Extend with a `%`-variable binding; the receiver is untouched
    pub fn define_variable(&self, name: impl Into<String>, value: Collection) -> Self {
        let mut child = self.clone();
        child.variables = self.variables.define(name, value);
        child
    }

    /// `$this`, defaulting to the given focus when no iteration is active
    pub fn this_or(&self, focus: &Collection) -> Collection {
        self.this_value
            .as_ref()
            .map(Collection::share)
            .unwrap_or_else(|| focus.share())
    }

    /// `$index`, when inside an iteration
    pub fn index(&self) -> Option<i64> {
        self.index
    }

    /// `$total`, when inside `aggregate`
    pub fn total(&self) -> Option<&Collection> {
        self.total.as_ref()
    }

    /// Child context for one iteration step: `$this` and `$index` bound
    pub fn with_iteration(&self, this_value: Collection, index: i64) -> Self {
        let mut child = self.clone();
        child.this_value = Some(this_value);
        child.index = Some(index);
        child
    }

    /// Child context with `$this` bound and `$index` cleared
    pub fn with_this(&self, this_value: Collection) -> Self {
        let mut child = self.clone();
        child.this_value = Some(this_value);
        child.index = None;
        child
    }

    /// Child context with `$total` bound
    pub fn with_total(&self, total: Collection) -> Self {
        let mut child = self.clone();
        child.total = Some(total);
        child
    }
}

/// The `(output, context)` pair every evaluation step produces
#[derive(Debug, Clone)]
pub struct Evaluated {
    /// Output collection
    pub value: Collection,
    /// Possibly-extended context for downstream steps
    pub context: EvaluationContext,
}

impl Evaluated {
    /// Output with an unchanged context
    pub fn value(value: Collection, context: EvaluationContext) -> Self {
        Self { value, context }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FhirPathValue;

    fn single(n: i64) -> Collection {
        Collection::singleton(FhirPathValue::Integer(n))
    }

    #[test]
    fn child_sees_parent_bindings() {
        let ctx = EvaluationContext::new(Collection::empty());
        let child = ctx.define_variable("a", single(1));
        let grandchild = child.define_variable("b", single(2));
        assert_eq!(grandchild.variable("a"), Some(&single(1)));
        assert_eq!(grandchild.variable("b"), Some(&single(2)));
    }

    #[test]
    fn binding_never_mutates_parent() {
        let ctx = EvaluationContext::new(Collection::empty());
        let _child = ctx.define_variable("a", single(1));
        assert!(ctx.variable("a").is_none());
    }

    #[test]
    fn shadowing_resolves_to_nearest_binding() {
        let ctx = EvaluationContext::new(Collection::empty());
        let child = ctx.define_variable("a", single(1));
        let shadowed = child.define_variable("a", single(2));
        assert_eq!(shadowed.variable("a"), Some(&single(2)));
        assert_eq!(child.variable("a"), Some(&single(1)));
    }

    #[test]
    fn environment_variables_bound_at_entry() {
        let input = single(7);
        let ctx = EvaluationContext::new(input.share());
        assert_eq!(ctx.variable("context"), Some(&input));
        assert_eq!(ctx.variable("resource"), Some(&input));
        assert_eq!(ctx.variable("rootResource"), Some(&input));
    }

    #[test]
    fn iteration_state_is_scoped_to_child() {
        let ctx = EvaluationContext::new(Collection::empty());
        let iter = ctx.with_iteration(single(5), 2);
        assert_eq!(iter.index(), Some(2));
        assert_eq!(ctx.index(), None);
        assert_eq!(iter.this_or(&Collection::empty()), single(5));
    }
}
