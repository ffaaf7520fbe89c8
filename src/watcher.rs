//! Watchers: expressions re-evaluated on every digest of their component.
//!
//! A watcher compares the value of its expression against the deep clone it
//! saw last time and fires its callback only on change. The first run always
//! fires, with `null` as the old value, so callbacks double as initial render.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::{Map, Value};

use crate::arena::watcher_arena::{watcher_arena_insert, watcher_arena_remove};
use crate::arena::{ComponentId, Derive, WatchCallback, WatcherId, WatcherMetadata};
use crate::dom::NodeId;
use crate::expression;
use crate::hash::FastIndexSet;
use crate::value::deep_eq;

/// Counters collected while running a component's watchers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Watchers evaluated.
    pub watchers_run: usize,
    /// Watchers whose value changed (their callback fired).
    pub changes_detected: usize,
}

impl std::ops::AddAssign for WatchStats {
    fn add_assign(&mut self, other: Self) {
        self.watchers_run += other.watchers_run;
        self.changes_detected += other.changes_detected;
    }
}

/// Handle returned by [`watch`].
///
/// Dropping the handle does not stop the watcher; it lives as long as its
/// component unless [`unwatch`](Self::unwatch) is called.
#[derive(Clone, Debug)]
pub struct WatchHandle {
    id: WatcherId,
    expression: String,
}

impl WatchHandle {
    /// Stop the watcher. Calling it again is a no-op.
    pub fn unwatch(&self) {
        unwatch(self.id);
    }

    /// Whether the watcher is still registered.
    pub fn is_active(&self) -> bool {
        self.id.is_alive()
    }

    /// The watched expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The value seen on the most recent run.
    pub fn last_value(&self) -> Option<Value> {
        self.id.with(|meta| meta.last.clone()).flatten()
    }
}

/// Watch `expression` in the scope of `component`.
///
/// The watcher runs once immediately (the callback fires with `null` as the
/// old value) and then on every digest that reaches the component.
///
/// # Usage
///
/// ```ignore
/// let handle = watch(component, "user.name", |new, old| {
///     tracing::info!(%new, %old, "renamed");
/// });
/// handle.unwatch();
/// ```
pub fn watch<F>(component: ComponentId, expression: &str, callback: F) -> WatchHandle
where
    F: FnMut(&Value, &Value) + 'static,
{
    watch_node(component, None, expression, callback)
}

/// Watch on behalf of a node; releasing `anchor` drops the watcher.
pub(crate) fn watch_node<F>(
    component: ComponentId,
    anchor: Option<NodeId>,
    source: &str,
    callback: F,
) -> WatchHandle
where
    F: FnMut(&Value, &Value) + 'static,
{
    register(component, anchor, source, None, Box::new(callback))
}

/// Like [`watch_node`], but change detection runs on `derive(scope, value)`
/// instead of the raw value.
pub(crate) fn watch_derived<F>(
    component: ComponentId,
    anchor: Option<NodeId>,
    source: &str,
    derive: Derive,
    callback: F,
) -> WatchHandle
where
    F: FnMut(&Value, &Value) + 'static,
{
    register(component, anchor, source, Some(derive), Box::new(callback))
}

fn register(
    component: ComponentId,
    anchor: Option<NodeId>,
    source: &str,
    derive: Option<Derive>,
    callback: WatchCallback,
) -> WatchHandle {
    let compiled = expression::compile(source);
    let mut paths = compiled.dependency_paths().to_vec();
    if paths.is_empty() {
        // constant expressions are still registered, under their source text
        paths.push(compiled.source().to_owned());
    }
    let id = watcher_arena_insert(WatcherMetadata {
        component,
        anchor,
        compiled,
        derive,
        last: None,
        callback: Some(callback),
    });
    let handle = WatchHandle {
        id,
        expression: source.to_owned(),
    };

    let registered = component
        .with_mut(|meta| {
            meta.watchers.insert(id);
            for path in paths {
                meta.registry.entry(path).or_default().push(id);
            }
            if let Some(anchor) = anchor {
                meta.node_bindings.entry(anchor).or_default().watchers.push(id);
            }
        })
        .is_some();
    if !registered {
        tracing::warn!(target: "bindery::watcher", expression = source, "watch on a destroyed component ignored");
        drop(watcher_arena_remove(id));
        return handle;
    }

    run_watcher(id);
    handle
}

/// Remove a watcher from the arena, the registry and its anchor.
pub(crate) fn unwatch(id: WatcherId) {
    let Some(meta) = watcher_arena_remove(id) else {
        return;
    };
    meta.component.with_mut(|component| {
        component.watchers.shift_remove(&id);
        component.registry.retain(|_, ids| {
            ids.retain(|watcher| *watcher != id);
            !ids.is_empty()
        });
        if let Some(binding) = meta
            .anchor
            .and_then(|anchor| component.node_bindings.get_mut(&anchor))
        {
            binding.watchers.retain(|watcher| *watcher != id);
        }
    });
    // the callback may own user data; drop it with no arena borrowed
    drop(meta);
}

/// Puts a taken-out callback back when the run ends, panic or not.
struct CallbackGuard {
    watcher: WatcherId,
    callback: Option<WatchCallback>,
}

impl CallbackGuard {
    fn run(&mut self, new_value: &Value, old_value: &Value) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| callback(new_value, old_value))).is_err() {
            tracing::error!(target: "bindery::watcher", watcher = ?self.watcher, "watch callback panicked");
        }
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        // unwatched while running: the callback just goes away
        if !self.watcher.is_alive() {
            return;
        }
        self.watcher.with_mut(|meta| {
            if meta.callback.is_none() {
                meta.callback = Some(callback);
            }
        });
    }
}

/// Evaluate one watcher and fire its callback on change.
///
/// Returns `true` if the value changed.
pub(crate) fn run_watcher(id: WatcherId) -> bool {
    let Some((component, compiled, derive)) =
        id.with(|meta| (meta.component, meta.compiled.clone(), meta.derive.clone()))
    else {
        return false;
    };
    let Some(scope) = component.scope() else {
        return false;
    };

    let new_value = match compiled.evaluate(scope, &Map::new()) {
        Ok(value) => value,
        Err(_) if compiled.error().is_some() => Value::Null,
        Err(error) => {
            tracing::warn!(target: "bindery::watcher", expression = compiled.source(), %error, "watch expression failed");
            Value::Null
        }
    };
    let new_value = match derive {
        Some(derive) => match catch_unwind(AssertUnwindSafe(|| derive(scope, new_value))) {
            Ok(value) => value,
            Err(_) => {
                tracing::error!(target: "bindery::watcher", expression = compiled.source(), "watch derivation panicked");
                Value::Null
            }
        },
        None => new_value,
    };

    let old_value = id
        .with_mut(|meta| {
            let unchanged = meta.last.as_ref().is_some_and(|last| deep_eq(last, &new_value));
            (!unchanged).then(|| meta.last.replace(new_value.clone()).unwrap_or(Value::Null))
        })
        .flatten();
    let Some(old_value) = old_value else {
        return false;
    };

    let mut guard = CallbackGuard {
        watcher: id,
        callback: id.with_mut(|meta| meta.callback.take()).flatten(),
    };
    guard.run(&new_value, &old_value);
    true
}

/// Run every watcher registered for `component`, each once.
pub(crate) fn run_component_watchers(component: ComponentId) -> WatchStats {
    let ids: Vec<WatcherId> = component
        .with(|meta| {
            meta.registry
                .values()
                .flatten()
                .copied()
                .collect::<FastIndexSet<_>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default();

    let mut stats = WatchStats::default();
    for id in ids {
        // an earlier callback may have unwatched it
        if !id.is_alive() {
            continue;
        }
        stats.watchers_run += 1;
        if run_watcher(id) {
            stats.changes_detected += 1;
        }
    }
    stats
}
