//! Shadow state: the runtime's copy of what bound nodes should show.
//!
//! Bindings never write control values or text content directly. They stage
//! the new state here, which marks the node dirty, and the flush at the end
//! of every digest pass writes dirty nodes in one go. In the other direction
//! [`sync`] notices live state the user changed (typing into a control) and
//! adopts it, and the flush writes it back to the model of a two-way binding.
//!
//! A dirty node is never overwritten by [`sync`]: a pending write wins over
//! whatever the node shows until it has been flushed.

use std::cell::RefCell;

use crate::arena::ComponentId;
use crate::component::owning_component;
use crate::digest::schedule_digest;
use crate::dom::{ControlKind, ControlState, NodeId};
use crate::hash::FastIndexMap;
use crate::value::deep_eq;
use serde_json::Value;

/// The staged state of one node.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    /// A form control.
    Control(ControlState),
    /// A text node.
    Text(String),
}

/// A staged control change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ControlUpdate {
    Value(String),
    Checked(bool),
}

struct ShadowNode {
    owner: ComponentId,
    snapshot: Snapshot,
    dirty: bool,
}

thread_local! {
    static SHADOW: RefCell<FastIndexMap<NodeId, ShadowNode>> = RefCell::new(FastIndexMap::default());
}

fn register(node: NodeId, owner: ComponentId, snapshot: Snapshot) {
    SHADOW.with_borrow_mut(|shadow| {
        shadow.entry(node).or_insert(ShadowNode {
            owner,
            snapshot,
            dirty: false,
        });
    });
}

/// Start tracking a control. Already tracked nodes are left as they are.
pub(crate) fn register_control(node: NodeId, owner: ComponentId) {
    if let Some(control) = node.control() {
        register(node, owner, Snapshot::Control(control));
    }
}

/// Start tracking a text node.
pub(crate) fn register_text(node: NodeId, owner: ComponentId) {
    if let Some(text) = node.text_value() {
        register(node, owner, Snapshot::Text(text));
    }
}

/// Stage new text. Returns true if it differs from what was staged.
pub(crate) fn stage_text(node: NodeId, text: String) -> bool {
    SHADOW.with_borrow_mut(|shadow| {
        let Some(entry) = shadow.get_mut(&node) else {
            return false;
        };
        match &mut entry.snapshot {
            Snapshot::Text(current) if *current != text => {
                *current = text;
                entry.dirty = true;
                true
            }
            _ => false,
        }
    })
}

/// Stage a control change. Returns true if it differs from what was staged.
pub(crate) fn stage_control(node: NodeId, update: ControlUpdate) -> bool {
    SHADOW.with_borrow_mut(|shadow| {
        let Some(entry) = shadow.get_mut(&node) else {
            return false;
        };
        let Snapshot::Control(state) = &mut entry.snapshot else {
            return false;
        };
        let changed = match update {
            ControlUpdate::Value(value) if state.value != value => {
                state.value = value;
                true
            }
            ControlUpdate::Checked(checked) if state.checked != checked => {
                state.checked = checked;
                true
            }
            _ => false,
        };
        entry.dirty |= changed;
        changed
    })
}

/// Whether `node` has a staged write not yet flushed.
pub fn is_dirty(node: NodeId) -> bool {
    SHADOW.with_borrow(|shadow| shadow.get(&node).is_some_and(|entry| entry.dirty))
}

/// The staged state of `node`, if tracked.
pub fn snapshot(node: NodeId) -> Option<Snapshot> {
    SHADOW.with_borrow(|shadow| shadow.get(&node).map(|entry| entry.snapshot.clone()))
}

fn is_tracked(node: NodeId) -> bool {
    SHADOW.with_borrow(|shadow| shadow.contains_key(&node))
}

/// Compare the live state of the nodes under `component` with the shadow
/// and mark those that drifted. Controls not tracked yet are picked up.
///
/// Returns the number of nodes marked.
pub(crate) fn sync(component: ComponentId) -> usize {
    let Some(root) = component.node() else {
        return 0;
    };
    let mut marked = 0;
    for node in std::iter::once(root).chain(root.descendants()) {
        let live = if let Some(control) = node.control() {
            Snapshot::Control(control)
        } else if node.is_text() && is_tracked(node) {
            Snapshot::Text(node.text_value().unwrap_or_default())
        } else {
            continue;
        };
        if !is_tracked(node) {
            register(node, owning_component(node).unwrap_or(component), live);
            continue;
        }
        let drifted = SHADOW.with_borrow_mut(|shadow| {
            let Some(entry) = shadow.get_mut(&node) else {
                return false;
            };
            if entry.dirty {
                cov_mark::hit!(sync_keeps_pending_write);
                return false;
            }
            if entry.snapshot == live {
                return false;
            }
            entry.snapshot = live;
            entry.dirty = true;
            true
        });
        marked += usize::from(drifted);
    }
    marked
}

fn model_value(state: &ControlState) -> Option<Value> {
    match state.kind {
        ControlKind::Radio if !state.checked => None,
        ControlKind::Radio => Some(Value::String(state.value.clone())),
        _ => Some(state.typed_value()),
    }
}

/// Write the control's state back into the model of its two-way binding.
fn write_back(node: NodeId, owner: ComponentId, path: &str, state: &ControlState) {
    let Some(typed) = model_value(state) else {
        return;
    };
    let Some(scope) = owner.scope() else {
        return;
    };
    if deep_eq(&scope.lookup_path(path), &typed) {
        return;
    }
    cov_mark::hit!(shadow_write_back);
    tracing::trace!(target: "bindery::shadow", ?node, path, %typed, "write back");
    scope.set_path(path, typed);
    schedule_digest(Some(owner));
}

/// Write every dirty node, then clear its mark. Dead nodes are dropped.
///
/// Properties a binding manages directly are not written. Returns the
/// number of writes.
pub(crate) fn flush() -> usize {
    let dirty: Vec<(NodeId, ComponentId, Snapshot)> = SHADOW.with_borrow(|shadow| {
        shadow
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(node, entry)| (*node, entry.owner, entry.snapshot.clone()))
            .collect()
    });

    let mut written = 0;
    for (node, owner, snapshot) in dirty {
        if !node.is_alive() {
            SHADOW.with_borrow_mut(|shadow| shadow.shift_remove(&node));
            continue;
        }
        let (managed, two_way) = owner
            .with(|meta| {
                meta.node_bindings
                    .get(&node)
                    .map(|binding| (binding.managed.clone(), binding.two_way.clone()))
            })
            .flatten()
            .unwrap_or_default();

        match &snapshot {
            Snapshot::Text(text) => {
                if node.text_value().as_ref() != Some(text) {
                    node.set_text(text.clone());
                    written += 1;
                }
            }
            Snapshot::Control(state) => {
                let live = node.control();
                if !managed.contains("value")
                    && live.as_ref().is_some_and(|live| live.value != state.value)
                {
                    node.set_value(&state.value);
                    written += 1;
                }
                if state.kind.is_checkable()
                    && !managed.contains("checked")
                    && live.as_ref().is_some_and(|live| live.checked != state.checked)
                {
                    node.set_checked(state.checked);
                    written += 1;
                }
                let property = if state.kind.is_checkable() { "checked" } else { "value" };
                if let Some(path) = two_way.filter(|_| !managed.contains(property)) {
                    write_back(node, owner, &path, state);
                }
            }
        }

        SHADOW.with_borrow_mut(|shadow| {
            if let Some(entry) = shadow.get_mut(&node) {
                entry.dirty = false;
            }
        });
    }
    written
}

/// Stop tracking every node owned by `component`.
pub(crate) fn release_component(component: ComponentId) {
    SHADOW.with_borrow_mut(|shadow| shadow.retain(|_, entry| entry.owner != component));
}

/// Stop tracking `nodes`.
pub(crate) fn release_nodes(nodes: &[NodeId]) {
    SHADOW.with_borrow_mut(|shadow| {
        for node in nodes {
            shadow.shift_remove(node);
        }
    });
}

/// Forget everything.
pub(crate) fn clear() {
    SHADOW.with_borrow_mut(|shadow| shadow.clear());
}

/// Number of tracked nodes.
pub fn tracked_count() -> usize {
    SHADOW.with_borrow(|shadow| shadow.len())
}
