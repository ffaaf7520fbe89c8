// Component arena - storage for component metadata
//
// The ComponentMetadata struct contains:
// - node/scope/parent/children: the component's place in the component tree
// - strategy, declared inputs and the last captured inputs (onPush gating)
// - watchers: every watcher the component owns, plus a registry of the same
//   watchers keyed by dependency path
// - node_bindings: per-node binding state for the nodes this component bound
//   (processed flags, listeners, managed properties, two-way path)
// - repeats: the repeat directives placed in this component, for path lookup
//
// NODE_COMPONENTS maps a component's root node to the component. It is the
// registry that makes create_component idempotent and parent lookup cheap.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use super::{Arena, Key, WatcherId};
use crate::component::UpdateStrategy;
use crate::dom::{ListenerId, NodeId};
use crate::hash::{FastHashMap, FastIndexMap, FastIndexSet};
use crate::scope::Scope;

thread_local! {
    static COMPONENT_ARENA: RefCell<Arena<ComponentMetadata>> = const { RefCell::new(Arena::new()) };
    static NODE_COMPONENTS: RefCell<FastHashMap<NodeId, ComponentId>> =
        RefCell::new(FastHashMap::default());
}

/// Unique identifier for a component.
///
/// Ids are generation-checked: once the component is destroyed every accessor
/// returns `None` and every operation is a no-op.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct ComponentId(Key);

/// Binding state of one node bound by a component.
#[derive(Default)]
pub struct NodeBinding {
    /// Set before the node's attributes are processed; guards re-entry.
    pub processed: bool,
    /// Set once every attribute has been handled.
    pub initialized: bool,
    /// Listeners keyed by `event:statement`.
    pub listeners: FastIndexMap<String, (String, ListenerId)>,
    /// Properties written through the managed-property path.
    pub managed: FastIndexSet<String>,
    /// Model path of a two-way binding.
    pub two_way: Option<String>,
    /// Watchers anchored to this node.
    pub watchers: Vec<WatcherId>,
    /// Static classes present before `bind-class` took over.
    pub original_classes: Option<String>,
    /// Last control value seen per event, for deduplication.
    pub last_event_values: FastHashMap<String, Value>,
    /// Detached template owned by a structural directive anchored here.
    pub template: Option<NodeId>,
}

/// A repeat placed in a component, remembered for binding path lookup.
pub struct RepeatRecord {
    pub source: String,
    pub item_name: String,
    /// First top-level node of every rendered instance, in order. An
    /// instance spans up to the next one's first node or `end`.
    pub starts: Rc<RefCell<Vec<NodeId>>>,
    /// Comment closing the rendered instances.
    pub end: NodeId,
}

pub struct ComponentMetadata {
    pub node: NodeId,
    pub scope: Scope,
    pub parent: Option<ComponentId>,
    pub children: Vec<ComponentId>,
    pub strategy: UpdateStrategy,
    pub declared_inputs: Vec<String>,
    pub previous_inputs: Option<Value>,
    pub check_requested: bool,
    pub watchers: FastIndexSet<WatcherId>,
    pub registry: FastIndexMap<String, Vec<WatcherId>>,
    pub node_bindings: FastHashMap<NodeId, NodeBinding>,
    pub repeats: Vec<RepeatRecord>,
    /// Repeat instances are driven by their repeat, not by `start`.
    pub repeat_item: bool,
}

impl ComponentMetadata {
    pub fn new(node: NodeId, scope: Scope, parent: Option<ComponentId>) -> Self {
        Self {
            node,
            scope,
            parent,
            children: Vec::new(),
            strategy: UpdateStrategy::Default,
            declared_inputs: Vec::new(),
            previous_inputs: None,
            check_requested: false,
            watchers: FastIndexSet::default(),
            registry: FastIndexMap::default(),
            node_bindings: FastHashMap::default(),
            repeats: Vec::new(),
            repeat_item: false,
        }
    }
}

impl ComponentId {
    /// Access the component metadata with a closure (read-only)
    pub(crate) fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&ComponentMetadata) -> R,
    {
        COMPONENT_ARENA.with_borrow(|arena| arena.get(self.0).map(f))
    }

    /// Access the component metadata with a closure (mutable)
    pub(crate) fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut ComponentMetadata) -> R,
    {
        COMPONENT_ARENA.with_borrow_mut(|arena| arena.get_mut(self.0).map(f))
    }

    /// Access (creating if needed) the binding state of `node`.
    pub(crate) fn with_binding<F, R>(self, node: NodeId, f: F) -> Option<R>
    where
        F: FnOnce(&mut NodeBinding) -> R,
    {
        self.with_mut(|meta| f(meta.node_bindings.entry(node).or_default()))
    }

    /// Whether the component is still registered.
    pub fn is_alive(self) -> bool {
        COMPONENT_ARENA.with_borrow(|arena| arena.contains(self.0))
    }
}

pub fn component_arena_insert(meta: ComponentMetadata) -> ComponentId {
    COMPONENT_ARENA.with_borrow_mut(|arena| ComponentId(arena.insert(meta)))
}

pub fn component_arena_remove(id: ComponentId) -> Option<ComponentMetadata> {
    COMPONENT_ARENA.with_borrow_mut(|arena| arena.remove(id.0))
}

pub fn component_arena_clear() -> Vec<ComponentMetadata> {
    NODE_COMPONENTS.with_borrow_mut(|map| map.clear());
    COMPONENT_ARENA.with_borrow_mut(Arena::drain)
}

pub fn live_component_ids() -> Vec<ComponentId> {
    COMPONENT_ARENA.with_borrow(|arena| arena.keys().into_iter().map(ComponentId).collect())
}

pub fn node_component(node: NodeId) -> Option<ComponentId> {
    NODE_COMPONENTS.with_borrow(|map| map.get(&node).copied())
}

pub fn register_node_component(node: NodeId, component: ComponentId) {
    NODE_COMPONENTS.with_borrow_mut(|map| {
        map.insert(node, component);
    });
}

/// Remove the mapping only if it still points at `component`.
pub fn unregister_node_component(node: NodeId, component: ComponentId) {
    NODE_COMPONENTS.with_borrow_mut(|map| {
        if map.get(&node) == Some(&component) {
            map.remove(&node);
        }
    });
}
