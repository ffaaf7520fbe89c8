// Scope arena - storage for scope variables, functions and lifecycle hooks
//
// Scopes form a chain through `parent`: a lookup that misses locally continues
// with the parent, while writes go to the local scope. Functions live in their
// own map so they never show up in variable snapshots or change detection.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

use super::{Arena, ComponentId, Key};
use crate::dom::NodeId;
use crate::hash::FastHashMap;
use crate::scope::Scope;

/// A function bound on a scope, callable from template expressions.
///
/// It receives the scope the expression was evaluated in and the evaluated
/// arguments.
pub type ScopeFn = Rc<dyn Fn(Scope, &[Value]) -> Value>;

/// One-shot lifecycle hook.
pub type Hook = Box<dyn FnOnce(Scope)>;

thread_local! {
    static SCOPE_ARENA: RefCell<Arena<ScopeData>> = const { RefCell::new(Arena::new()) };
}

/// Unique identifier for a scope in the arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct ScopeId(Key);

#[derive(Default)]
pub struct ScopeData {
    pub vars: Map<String, Value>,
    pub functions: FastHashMap<String, ScopeFn>,
    pub parent: Option<ScopeId>,
    pub element: Option<NodeId>,
    pub component: Option<ComponentId>,
    pub on_init: Option<Hook>,
    pub on_destroy: Option<Hook>,
}

impl ScopeId {
    /// Access the scope data with a closure (read-only)
    ///
    /// Returns None if the scope has been removed (stale access).
    pub fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&ScopeData) -> R,
    {
        SCOPE_ARENA.with_borrow(|arena| arena.get(self.0).map(f))
    }

    /// Access the scope data with a closure (mutable)
    pub fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut ScopeData) -> R,
    {
        SCOPE_ARENA.with_borrow_mut(|arena| arena.get_mut(self.0).map(f))
    }

    pub fn is_alive(self) -> bool {
        SCOPE_ARENA.with_borrow(|arena| arena.contains(self.0))
    }

    pub fn parent(self) -> Option<ScopeId> {
        self.with(|data| data.parent).flatten()
    }
}

pub fn scope_arena_insert(data: ScopeData) -> ScopeId {
    SCOPE_ARENA.with_borrow_mut(|arena| ScopeId(arena.insert(data)))
}

/// The removed data is returned so captured closures drop outside the borrow.
pub fn scope_arena_remove(id: ScopeId) -> Option<ScopeData> {
    SCOPE_ARENA.with_borrow_mut(|arena| arena.remove(id.0))
}

pub fn scope_arena_clear() -> Vec<ScopeData> {
    SCOPE_ARENA.with_borrow_mut(Arena::drain)
}
