// Watcher arena - storage for watcher metadata
//
// A watcher owns its compiled expression, the deep-cloned value seen on its
// last run, and its callback. The callback is an Option so it can be taken
// out while it runs and put back afterwards (see watcher::run_watcher).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;

use super::{Arena, ComponentId, Key};
use crate::dom::NodeId;
use crate::expression::CompiledExpression;
use crate::scope::Scope;

/// Callback invoked with `(new_value, old_value)` when a watched expression
/// changes. `old_value` is `null` on the first run.
pub type WatchCallback = Box<dyn FnMut(&Value, &Value)>;

/// Maps the raw value of the expression to the value that is compared and
/// handed to the callback.
pub type Derive = Rc<dyn Fn(Scope, Value) -> Value>;

thread_local! {
    static WATCHER_ARENA: RefCell<Arena<WatcherMetadata>> = const { RefCell::new(Arena::new()) };
}

/// Unique identifier for a watcher in the arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct WatcherId(Key);

pub struct WatcherMetadata {
    pub component: ComponentId,
    /// Node whose release drops this watcher.
    pub anchor: Option<NodeId>,
    pub compiled: Arc<CompiledExpression>,
    pub derive: Option<Derive>,
    /// `None` until the first run.
    pub last: Option<Value>,
    pub callback: Option<WatchCallback>,
}

impl WatcherId {
    pub fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&WatcherMetadata) -> R,
    {
        WATCHER_ARENA.with_borrow(|arena| arena.get(self.0).map(f))
    }

    pub fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut WatcherMetadata) -> R,
    {
        WATCHER_ARENA.with_borrow_mut(|arena| arena.get_mut(self.0).map(f))
    }

    pub fn is_alive(self) -> bool {
        WATCHER_ARENA.with_borrow(|arena| arena.contains(self.0))
    }
}

pub fn watcher_arena_insert(meta: WatcherMetadata) -> WatcherId {
    WATCHER_ARENA.with_borrow_mut(|arena| WatcherId(arena.insert(meta)))
}

pub fn watcher_arena_remove(id: WatcherId) -> Option<WatcherMetadata> {
    WATCHER_ARENA.with_borrow_mut(|arena| arena.remove(id.0))
}

pub fn watcher_arena_clear() -> Vec<WatcherMetadata> {
    WATCHER_ARENA.with_borrow_mut(Arena::drain)
}
