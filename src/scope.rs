use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::arena::scope_arena::{ScopeData, scope_arena_insert, scope_arena_remove};
use crate::arena::{ComponentId, ScopeFn, ScopeId};
use crate::digest::schedule_digest;
use crate::dom::NodeId;
use crate::{bindings, value};

/// Handle to a component's scope: the data and functions its templates see.
///
/// Scopes chain to the scope of the enclosing component. Reads that miss
/// locally continue up the chain; writes go to the local scope unless routed
/// explicitly. Handles are copyable; once the owning component is destroyed
/// every read yields `null` and every write is ignored.
///
/// # Usage
///
/// ```ignore
/// register_bind_fn("todo", |scope, _ctx| {
///     scope.set("title", "Groceries");
///     scope.set("items", json!([]));
///     scope.define_fn("add", |scope, args| {
///         scope.list("items").push(args.first().cloned().unwrap_or_default());
///         Value::Null
///     });
///     scope.on_destroy(|_| tracing::info!("todo list gone"));
/// });
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Scope {
    id: ScopeId,
}

impl Scope {
    pub(crate) fn allocate(
        parent: Option<Scope>,
        element: Option<NodeId>,
        component: Option<ComponentId>,
    ) -> Self {
        let id = scope_arena_insert(ScopeData {
            parent: parent.map(|p| p.id),
            element,
            component,
            ..ScopeData::default()
        });
        Self { id }
    }

    /// A scope not attached to any component, chained to `parent` if given.
    ///
    /// Useful for evaluating expressions outside of a component. Release it
    /// with [`dispose`](Self::dispose).
    pub fn standalone(parent: Option<Scope>) -> Self {
        Self::allocate(parent, None, None)
    }

    /// Free a scope created with [`standalone`](Self::standalone).
    pub fn dispose(self) {
        drop(scope_arena_remove(self.id));
    }

    pub(crate) fn id(self) -> ScopeId {
        self.id
    }

    /// Whether the scope still exists.
    pub fn is_alive(self) -> bool {
        self.id.is_alive()
    }

    /// Parent scope (`$parent` in expressions).
    pub fn parent(self) -> Option<Scope> {
        self.id.parent().map(|id| Scope { id })
    }

    /// Root element of the owning component (`$elem`).
    pub fn element(self) -> Option<NodeId> {
        self.id.with(|data| data.element).flatten()
    }

    /// Component owning this scope.
    pub fn component(self) -> Option<ComponentId> {
        self.id.with(|data| data.component).flatten()
    }

    /// The first scope in the chain, starting here, that defines `name`.
    pub fn owner_of(self, name: &str) -> Option<Scope> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.has_own(name) {
                return Some(scope);
            }
            current = scope.parent();
        }
        None
    }

    /// Read a variable through the scope chain. Missing names read as `null`.
    pub fn get(self, name: &str) -> Value {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(found) = scope.get_own(name) {
                return found;
            }
            current = scope.parent();
        }
        Value::Null
    }

    /// Read a variable defined on this scope itself.
    pub fn get_own(self, name: &str) -> Option<Value> {
        self.id.with(|data| data.vars.get(name).cloned()).flatten()
    }

    /// Whether `name` is defined anywhere in the chain.
    pub fn has(self, name: &str) -> bool {
        self.owner_of(name).is_some()
    }

    /// Whether `name` is defined on this scope itself.
    pub fn has_own(self, name: &str) -> bool {
        self.id
            .with(|data| data.vars.contains_key(name))
            .unwrap_or(false)
    }

    /// Write a variable on this scope.
    pub fn set(self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        self.id.with_mut(|data| {
            data.vars.insert(name.to_owned(), value);
        });
    }

    /// Write a variable where the chain defines it, or locally if nowhere.
    pub fn assign(self, name: &str, value: impl Into<Value>) {
        self.owner_of(name).unwrap_or(self).set(name, value);
    }

    /// Remove a variable from this scope.
    pub fn remove(self, name: &str) -> Option<Value> {
        self.id
            .with_mut(|data| data.vars.shift_remove(name))
            .flatten()
    }

    /// Snapshot of the variables defined on this scope.
    pub fn vars(self) -> Map<String, Value> {
        self.id.with(|data| data.vars.clone()).unwrap_or_default()
    }

    /// Read a dotted path such as `user.address.city` or `items[0].name`.
    pub fn lookup_path(self, path: &str) -> Value {
        let segments = value::split_path(path);
        let Some((root, rest)) = segments.split_first() else {
            return Value::Null;
        };
        value::get_path(&self.get(root), rest)
    }

    /// Write a dotted path.
    ///
    /// A single name is written locally. A nested path is written into the
    /// value owned by whichever scope defines its root name, so that
    /// `user.name` updates the `user` of an ancestor instead of shadowing it.
    pub fn set_path(self, path: &str, new_value: Value) {
        let segments = value::split_path(path);
        let Some((root, rest)) = segments.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.set(root, new_value);
        } else {
            self.assign_path(root, rest, new_value);
        }
    }

    pub(crate) fn assign_path(self, root: &str, rest: &[String], new_value: Value) {
        let owner = self.owner_of(root).unwrap_or(self);
        let mut target = owner.get_own(root).unwrap_or(Value::Null);
        if value::set_path(&mut target, rest, new_value) {
            owner.set(root, target);
        }
    }

    /// Bind a function callable from expressions as `name(args)`.
    pub fn define_fn<F>(self, name: &str, f: F)
    where
        F: Fn(Scope, &[Value]) -> Value + 'static,
    {
        let f: ScopeFn = Rc::new(f);
        self.id.with_mut(|data| {
            data.functions.insert(name.to_owned(), f);
        });
    }

    /// Look a function up through the scope chain.
    pub fn function(self, name: &str) -> Option<ScopeFn> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(f) = scope.id.with(|data| data.functions.get(name).cloned()).flatten() {
                return Some(f);
            }
            current = scope.parent();
        }
        None
    }

    /// Call a scope function. Returns `None` if no such function exists or it
    /// panicked.
    pub fn call(self, name: &str, args: &[Value]) -> Option<Value> {
        let f = self.function(name)?;
        match catch_unwind(AssertUnwindSafe(|| f(self, args))) {
            Ok(result) => Some(result),
            Err(_) => {
                tracing::error!(target: "bindery::scope", function = name, "scope function panicked");
                None
            }
        }
    }

    /// Merge the fields of `partial` into this scope and re-render the
    /// component (`$render`).
    pub fn render(self, partial: Value) {
        if let Value::Object(fields) = partial {
            self.id.with_mut(|data| data.vars.extend(fields));
        }
        schedule_digest(self.component());
    }

    /// Re-render the component and its parent (`$refresh`).
    pub fn refresh(self) {
        let Some(component) = self.component() else {
            schedule_digest(None);
            return;
        };
        schedule_digest(Some(component));
        if let Some(parent) = component.parent() {
            schedule_digest(Some(parent));
        }
    }

    /// Run `f` once the component's subtree has been bound (`$onInit`).
    pub fn on_init(self, f: impl FnOnce(Scope) + 'static) {
        self.id.with_mut(|data| data.on_init = Some(Box::new(f)));
    }

    /// Run `f` when the component is destroyed (`$onDestroy`).
    pub fn on_destroy(self, f: impl FnOnce(Scope) + 'static) {
        self.id.with_mut(|data| data.on_destroy = Some(Box::new(f)));
    }

    pub(crate) fn take_on_init(self) -> Option<Box<dyn FnOnce(Scope)>> {
        self.id.with_mut(|data| data.on_init.take()).flatten()
    }

    pub(crate) fn take_on_destroy(self) -> Option<Box<dyn FnOnce(Scope)>> {
        self.id.with_mut(|data| data.on_destroy.take()).flatten()
    }

    /// Find the node bound to a model path (`$findBinding`).
    ///
    /// `name` finds the element with `bind="name"` in the component;
    /// `contacts[1].name` finds `bind="contact.name"` (or `bind="name"`)
    /// inside the second instance of the repeat over `contacts`.
    pub fn find_binding(self, path: &str) -> Option<NodeId> {
        bindings::find_binding(self.component()?, path)
    }

    /// Observed access to the array stored under `name`.
    pub fn list(self, name: &str) -> ObservedList {
        ObservedList {
            scope: self,
            name: name.to_owned(),
        }
    }
}

/// Array accessor whose structural operations write back and re-render.
///
/// Every mutating call writes the array back into the scope that defines it
/// (or this scope, if none does) and schedules a refresh of the component
/// owning that scope, so repeats over the array follow along.
#[derive(Clone, Debug)]
pub struct ObservedList {
    scope: Scope,
    name: String,
}

impl ObservedList {
    fn owner(&self) -> Scope {
        self.scope.owner_of(&self.name).unwrap_or(self.scope)
    }

    /// Current contents; non-arrays read as empty.
    pub fn items(&self) -> Vec<Value> {
        match self.scope.get(&self.name) {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items().into_iter().nth(index)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let owner = self.owner();
        let mut items = self.items();
        let result = f(&mut items);
        owner.set(&self.name, Value::Array(items));
        owner.refresh();
        result
    }

    /// Append an element.
    pub fn push(&self, item: impl Into<Value>) {
        let item = item.into();
        self.mutate(|items| items.push(item));
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate(Vec::pop)
    }

    /// Insert at `index`, clamped to the length.
    pub fn insert(&self, index: usize, item: impl Into<Value>) {
        let item = item.into();
        self.mutate(|items| items.insert(index.min(items.len()), item));
    }

    /// Remove and return the element at `index`.
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.mutate(|items| (index < items.len()).then(|| items.remove(index)))
    }

    /// Replace the element at `index`.
    pub fn set(&self, index: usize, item: impl Into<Value>) {
        let item = item.into();
        self.mutate(|items| {
            if index < items.len() {
                items[index] = item;
            }
        });
    }

    /// Swap two elements.
    pub fn swap(&self, a: usize, b: usize) {
        self.mutate(|items| {
            if a < items.len() && b < items.len() {
                items.swap(a, b);
            }
        });
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.mutate(|items| items.reverse());
    }

    /// Stable sort with a comparator.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> std::cmp::Ordering) {
        self.mutate(|items| items.sort_by(compare));
    }

    /// Keep the elements matching `predicate`.
    pub fn retain(&self, predicate: impl FnMut(&Value) -> bool) {
        self.mutate(|items| items.retain(predicate));
    }

    /// Shorten to `len` elements.
    pub fn truncate(&self, len: usize) {
        self.mutate(|items| items.truncate(len));
    }

    /// Remove every element.
    pub fn clear(&self) {
        self.mutate(Vec::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_fall_through_to_parent_and_writes_stay_local() {
        let parent = Scope::standalone(None);
        let child = Scope::standalone(Some(parent));
        parent.set("title", "outer");

        assert_eq!(child.get("title"), json!("outer"));
        assert!(!child.has_own("title"));

        child.set("title", "inner");
        assert_eq!(child.get("title"), json!("inner"));
        assert_eq!(parent.get("title"), json!("outer"));

        child.assign("title", "assigned");
        assert_eq!(child.get("title"), json!("assigned"));
        child.remove("title");
        child.assign("title", "routed");
        assert_eq!(parent.get("title"), json!("routed"));
        assert!(!child.has_own("title"));
    }

    #[test]
    fn nested_paths_write_into_the_owning_scope() {
        let parent = Scope::standalone(None);
        let child = Scope::standalone(Some(parent));
        parent.set("user", json!({"name": "Ada"}));

        child.set_path("user.name", json!("Grace"));
        assert_eq!(parent.lookup_path("user.name"), json!("Grace"));
        assert!(!child.has_own("user"));

        child.set_path("draft", json!(true));
        assert!(child.has_own("draft"));
        assert_eq!(child.lookup_path("missing.deep.path"), Value::Null);
    }

    #[test]
    fn functions_resolve_through_the_chain() {
        let parent = Scope::standalone(None);
        let child = Scope::standalone(Some(parent));
        parent.define_fn("double", |_, args| {
            value::number(value::to_number(args.first().unwrap_or(&Value::Null)) * 2.0)
        });
        assert_eq!(child.call("double", &[json!(21)]), Some(json!(42)));
        assert_eq!(child.call("missing", &[]), None);

        child.define_fn("explode", |_, _| panic!("bad function"));
        assert_eq!(child.call("explode", &[]), None);
    }

    #[test]
    fn disposed_scopes_ignore_access() {
        let scope = Scope::standalone(None);
        scope.set("a", 1);
        scope.dispose();
        assert!(!scope.is_alive());
        assert_eq!(scope.get("a"), Value::Null);
        scope.set("a", 2);
        assert_eq!(scope.get_own("a"), None);
    }

    #[test]
    fn observed_list_writes_back_to_the_owner() {
        let parent = Scope::standalone(None);
        let child = Scope::standalone(Some(parent));
        parent.set("items", json!([1, 2]));

        let list = child.list("items");
        list.push(3);
        list.insert(0, 0);
        assert_eq!(list.remove(1), Some(json!(1)));
        list.reverse();
        assert_eq!(parent.get("items"), json!([3, 2, 0]));
        assert!(!child.has_own("items"));
        assert_eq!(list.pop(), Some(json!(0)));
        list.clear();
        assert!(list.is_empty());
    }
}
