//! Components: a root element bound to a scope.
//!
//! A component is created for every element carrying `bind-function`. Its
//! scope chains to the scope of the nearest enclosing component, its bind
//! function (registered by name with [`register_bind_fn`]) seeds the scope,
//! and the traversal of its subtree wires every binding it finds.
//!
//! # Usage
//!
//! ```ignore
//! register_bind_fn("greeter", |scope, _ctx| {
//!     scope.set("name", "Ada");
//! });
//!
//! let root = el("div")
//!     .attr("bind-function", "greeter")
//!     .child(el("p").text("Hello {{name}}!"))
//!     .build();
//! start(root);
//! flush_digests();
//! ```

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::arena::component_arena::{
    component_arena_clear, component_arena_insert, component_arena_remove, live_component_ids,
    node_component, register_node_component, unregister_node_component,
};
use crate::arena::scope_arena::{scope_arena_clear, scope_arena_remove};
use crate::arena::watcher_arena::{watcher_arena_clear, watcher_arena_remove};
use crate::arena::{ComponentId, ComponentMetadata, NodeBinding};
use crate::config::{self, RESERVED_INPUTS};
use crate::digest::{self, schedule_digest};
use crate::dom::NodeId;
use crate::hash::FastHashMap;
use crate::scope::Scope;
use crate::value::{is_truthy, to_display};
use crate::watcher::{self, WatchHandle};
use crate::{shadow, traverse};

/// How a component takes part in digests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Every digest that reaches the component runs its watchers.
    #[default]
    Default,
    /// Watchers only run when the component's inputs changed or a check was
    /// requested (`bind-strategy="onPush"`).
    OnPush,
}

impl UpdateStrategy {
    /// Parse a `bind-strategy` attribute value.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "onpush" | "on-push" => Some(Self::OnPush),
            _ => None,
        }
    }
}

/// What a bind function receives besides the scope.
#[derive(Clone, Debug)]
pub struct BindContext {
    /// The component's root element.
    pub elem: NodeId,
    /// The root element's attributes at creation time.
    pub attrs: IndexMap<String, String>,
    /// Inputs supplied by whoever created the component.
    pub inputs: Map<String, Value>,
    /// The component being created.
    pub component: ComponentId,
}

/// A bind function: seeds the scope of a new component.
pub type BindFn = Rc<dyn Fn(Scope, &BindContext)>;

thread_local! {
    static BIND_FUNCTIONS: RefCell<FastHashMap<String, BindFn>> = RefCell::new(FastHashMap::default());
}

/// Register the bind function used by elements with `bind-function="name"`.
pub fn register_bind_fn<F>(name: &str, f: F)
where
    F: Fn(Scope, &BindContext) + 'static,
{
    let f: BindFn = Rc::new(f);
    let previous = BIND_FUNCTIONS.with_borrow_mut(|functions| functions.insert(name.to_owned(), f));
    if previous.is_some() {
        tracing::debug!(target: "bindery::component", name, "bind function replaced");
    }
}

/// Look a registered bind function up.
pub fn bind_fn(name: &str) -> Option<BindFn> {
    BIND_FUNCTIONS.with_borrow(|functions| functions.get(name).cloned())
}

/// The component whose root is `node` or the nearest ancestor of it.
pub(crate) fn owning_component(node: NodeId) -> Option<ComponentId> {
    std::iter::once(node)
        .chain(node.ancestors())
        .find_map(|candidate| node_component(candidate).filter(|c| c.is_alive()))
}

fn enclosing_component(node: NodeId) -> Option<ComponentId> {
    node.ancestors()
        .into_iter()
        .find_map(|candidate| node_component(candidate).filter(|c| c.is_alive()))
}

fn sanitize_inputs(inputs: Map<String, Value>) -> Map<String, Value> {
    inputs
        .into_iter()
        .map(|(key, value)| {
            if RESERVED_INPUTS.contains(&key.as_str()) {
                let renamed = format!("{}{key}", config::reserved_prefix());
                tracing::warn!(target: "bindery::component", input = %key, %renamed, "input name is reserved, renamed");
                (renamed, value)
            } else {
                (key, value)
            }
        })
        .collect()
}

fn split_names(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn insert_component(meta: ComponentMetadata) -> ComponentId {
    let (node, scope, parent) = (meta.node, meta.scope, meta.parent);
    let component = component_arena_insert(meta);
    scope.id().with_mut(|data| data.component = Some(component));
    register_node_component(node, component);
    if let Some(parent) = parent {
        parent.with_mut(|meta| meta.children.push(component));
    }
    component
}

/// Create the component rooted at `node`, or return the existing one.
///
/// `bind_fn` overrides the function named by the `bind-function`
/// attribute. The bind function runs before the subtree is traversed, so
/// watchers take their baseline from the data it set; `on_init` runs after.
/// A first digest of the component is scheduled.
pub fn create_component(
    node: NodeId,
    bind_fn: Option<BindFn>,
    inputs: Map<String, Value>,
) -> ComponentId {
    if let Some(existing) = node_component(node).filter(|c| c.is_alive()) {
        cov_mark::hit!(component_creation_is_idempotent);
        return existing;
    }

    let parent = enclosing_component(node);
    let scope = Scope::allocate(parent.and_then(ComponentId::scope), Some(node), None);
    let mut meta = ComponentMetadata::new(node, scope, parent);
    meta.strategy = node
        .attr("bind-strategy")
        .and_then(|text| UpdateStrategy::parse(&text))
        .unwrap_or_else(config::default_strategy);
    meta.declared_inputs = node
        .attr("bind-inputs")
        .map(|text| split_names(&text))
        .unwrap_or_default();
    let component = insert_component(meta);

    let name = node.attr("bind-function").unwrap_or_default();
    tracing::debug!(target: "bindery::component", ?component, ?parent, name = %name, "component created");

    let bind_fn = bind_fn.or_else(|| self::bind_fn(&name));
    match bind_fn {
        Some(f) => {
            let context = BindContext {
                elem: node,
                attrs: node.attributes().into_iter().collect(),
                inputs: sanitize_inputs(inputs),
                component,
            };
            if catch_unwind(AssertUnwindSafe(|| f(scope, &context))).is_err() {
                tracing::error!(target: "bindery::component", ?component, name = %name, "bind function panicked");
            }
        }
        None if !name.is_empty() => {
            tracing::warn!(target: "bindery::component", name = %name, "no bind function registered under this name");
        }
        None => {}
    }
    if !component.is_alive() {
        return component;
    }

    traverse::process_subtree(node, component);

    if let Some(hook) = scope.take_on_init() {
        if catch_unwind(AssertUnwindSafe(|| hook(scope))).is_err() {
            tracing::error!(target: "bindery::component", ?component, "on_init hook panicked");
        }
    }
    schedule_digest(Some(component));
    component
}

/// Create a component for one rendered repeat instance.
///
/// The instance scope chains to the owner's and starts with `vars` (the
/// item variable and the positional helpers).
pub(crate) fn create_repeat_item(
    root: NodeId,
    owner: ComponentId,
    vars: Map<String, Value>,
) -> Option<ComponentId> {
    let scope = Scope::allocate(Some(owner.scope()?), Some(root), None);
    for (name, value) in vars {
        scope.set(&name, value);
    }
    let mut meta = ComponentMetadata::new(root, scope, Some(owner));
    meta.repeat_item = true;
    let component = insert_component(meta);
    traverse::process_subtree(root, component);
    Some(component)
}

/// Create components for `root` and every element below it that carries
/// `bind-function`, outermost first.
///
/// Nested components are created by their parent's traversal; the rest of
/// the walk finds them already registered.
pub fn start(root: NodeId) -> Vec<ComponentId> {
    let candidates: Vec<NodeId> = std::iter::once(root)
        .chain(root.descendants())
        .filter(|node| node.has_attr("bind-function"))
        .collect();
    let mut created = Vec::new();
    for node in candidates {
        // templates taken out of the tree (repeat, bind-if) are not components
        if !root.contains(node) {
            continue;
        }
        let component = create_component(node, None, Map::new());
        if !created.contains(&component) {
            created.push(component);
        }
    }
    tracing::info!(target: "bindery::component", count = created.len(), "started");
    created
}

/// The component rooted at `node`, if any.
pub fn component_for_node(node: NodeId) -> Option<ComponentId> {
    node_component(node).filter(|c| c.is_alive())
}

/// Every live component, in creation order.
pub fn live_components() -> Vec<ComponentId> {
    live_component_ids()
}

/// Destroy every component and forget every pending digest.
pub fn teardown() {
    let roots: Vec<ComponentId> = live_component_ids()
        .into_iter()
        .filter(|c| c.parent().is_none())
        .collect();
    for root in roots {
        root.destroy();
    }
    let leftovers = (component_arena_clear(), watcher_arena_clear(), scope_arena_clear());
    drop(leftovers);
    shadow::clear();
    digest::reset();
    tracing::info!(target: "bindery::component", "torn down");
}

fn release_binding(node: NodeId, binding: NodeBinding) {
    for (_, (_, listener)) in binding.listeners {
        node.unlisten(listener);
    }
    for id in binding.watchers {
        watcher::unwatch(id);
    }
    if let Some(template) = binding.template {
        template.remove();
    }
}

/// Unbind and free a subtree bound by `owner`: components rooted inside are
/// destroyed, then the owner's watchers, listeners and shadow entries for
/// those nodes are dropped and the nodes removed.
pub(crate) fn release_subtree(root: NodeId, owner: ComponentId) {
    let nodes: Vec<NodeId> = std::iter::once(root).chain(root.descendants()).collect();
    for node in &nodes {
        if let Some(component) = component_for_node(*node) {
            component.destroy();
        }
    }
    let bindings: Vec<(NodeId, NodeBinding)> = owner
        .with_mut(|meta| {
            nodes
                .iter()
                .filter_map(|node| meta.node_bindings.remove(node).map(|b| (*node, b)))
                .collect()
        })
        .unwrap_or_default();
    for (node, binding) in bindings {
        release_binding(node, binding);
    }
    shadow::release_nodes(&nodes);
    root.remove();
}

fn class_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| is_truthy(item))
            .map(to_display)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => map
            .iter()
            .filter(|(_, on)| is_truthy(on))
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        other => to_display(other),
    }
}

fn write_property(node: NodeId, property: &str, value: &Value) {
    match property {
        "class" => node.set_attr("class", class_value(value)),
        "style" => match value {
            Value::Object(map) => {
                for (name, entry) in map {
                    let entry = match entry {
                        Value::Null | Value::Bool(false) => None,
                        other => Some(to_display(other)).filter(|text| !text.is_empty()),
                    };
                    node.set_style(name, entry);
                }
            }
            Value::Null => node.remove_attr("style"),
            other => node.set_attr("style", to_display(other)),
        },
        "value" if node.is_control() => node.set_value(&to_display(value)),
        "checked" if node.is_control() => node.set_checked(is_truthy(value)),
        _ => match value {
            Value::Null | Value::Bool(false) => node.remove_attr(property),
            Value::Bool(true) => node.set_attr(property, ""),
            other => node.set_attr(property, to_display(other)),
        },
    }
}

impl ComponentId {
    /// Root element.
    pub fn node(self) -> Option<NodeId> {
        self.with(|meta| meta.node)
    }

    /// The component's scope.
    pub fn scope(self) -> Option<Scope> {
        self.with(|meta| meta.scope)
    }

    /// Enclosing component.
    pub fn parent(self) -> Option<ComponentId> {
        self.with(|meta| meta.parent).flatten()
    }

    /// Child components, repeat instances included.
    pub fn children(self) -> Vec<ComponentId> {
        self.with(|meta| meta.children.clone()).unwrap_or_default()
    }

    /// Update strategy.
    pub fn strategy(self) -> UpdateStrategy {
        self.with(|meta| meta.strategy).unwrap_or_default()
    }

    /// Change the update strategy.
    pub fn set_strategy(self, strategy: UpdateStrategy) {
        self.with_mut(|meta| meta.strategy = strategy);
    }

    /// Declare scope paths that count as inputs for [`UpdateStrategy::OnPush`].
    pub fn declare_inputs(self, names: &[&str]) {
        self.with_mut(|meta| {
            for name in names {
                if !meta.declared_inputs.iter().any(|n| n == name) {
                    meta.declared_inputs.push((*name).to_owned());
                }
            }
        });
    }

    /// Force the next digest to run this component's watchers even if it is
    /// [`OnPush`](UpdateStrategy::OnPush) and its inputs did not change.
    pub fn mark_for_check(self) {
        self.with_mut(|meta| meta.check_requested = true);
    }

    /// Number of live watchers owned by the component.
    pub fn watcher_count(self) -> usize {
        self.with(|meta| meta.watchers.len()).unwrap_or(0)
    }

    /// Whether this component renders one item of a repeat.
    pub fn is_repeat_item(self) -> bool {
        self.with(|meta| meta.repeat_item).unwrap_or(false)
    }

    /// Watch an expression in this component's scope.
    pub fn watch<F>(self, expression: &str, callback: F) -> WatchHandle
    where
        F: FnMut(&Value, &Value) + 'static,
    {
        watcher::watch(self, expression, callback)
    }

    /// Write a property of `node` and remember that the binding owns it, so
    /// the shadow flush leaves it alone.
    ///
    /// `class` takes a string, an array or an object of flags; `style` takes
    /// an object of properties or a string; `value` and `checked` write
    /// control state. Anything else is an attribute: `null` and `false`
    /// remove it, `true` sets it empty.
    pub fn update_property(self, node: NodeId, property: &str, value: &Value) {
        self.with_binding(node, |binding| {
            binding.managed.insert(property.to_owned());
        });
        write_property(node, property, value);
    }

    /// Tear the component down: children first, then its watchers, listeners
    /// and shadow entries. `on_destroy` runs last, with the scope still
    /// readable, and the scope is freed after it.
    pub fn destroy(self) {
        let Some(children) = self.with(|meta| meta.children.clone()) else {
            return;
        };
        for child in children.into_iter().rev() {
            child.destroy();
        }

        let Some(meta) = component_arena_remove(self) else {
            return;
        };
        unregister_node_component(meta.node, self);
        if let Some(parent) = meta.parent {
            parent.with_mut(|parent| parent.children.retain(|c| *c != self));
        }

        let watchers: Vec<_> = meta
            .watchers
            .iter()
            .filter_map(|id| watcher_arena_remove(*id))
            .collect();
        for (node, binding) in meta.node_bindings {
            release_binding(node, binding);
        }
        shadow::release_component(self);

        let scope = meta.scope;
        if let Some(hook) = scope.take_on_destroy() {
            if catch_unwind(AssertUnwindSafe(|| hook(scope))).is_err() {
                tracing::error!(target: "bindery::component", component = ?self, "on_destroy hook panicked");
            }
        }
        drop(scope_arena_remove(scope.id()));
        drop(watchers);
        tracing::debug!(target: "bindery::component", component = ?self, "component destroyed");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::dom::el;

    #[test]
    fn creation_is_idempotent() {
        let node = el("div").build();
        let first = create_component(node, None, Map::new());
        cov_mark::check!(component_creation_is_idempotent);
        let second = create_component(node, None, Map::new());
        assert_eq!(first, second);
    }

    #[test]
    fn nested_scope_chains_to_parent() {
        register_bind_fn("outer", |scope, _| scope.set("title", "Inbox"));
        register_bind_fn("inner", |scope, _| scope.set("count", 3));
        let inner = el("section").attr("bind-function", "inner");
        let root = el("div").attr("bind-function", "outer").child(inner).build();
        let components = start(root);
        assert_eq!(components.len(), 2);
        let child = components[1];
        assert_eq!(child.parent(), Some(components[0]));
        let scope = child.scope().unwrap();
        assert_eq!(scope.get("title"), json!("Inbox"));
        assert_eq!(scope.get("count"), json!(3));
    }

    #[test]
    fn bind_fn_receives_sanitized_inputs() {
        let seen = Rc::new(RefCell::new(Map::new()));
        let sink = seen.clone();
        let f: BindFn = Rc::new(move |_: Scope, ctx: &BindContext| *sink.borrow_mut() = ctx.inputs.clone());
        let mut inputs = Map::new();
        inputs.insert("elem".into(), json!(1));
        inputs.insert("title".into(), json!("x"));
        create_component(el("div").build(), Some(f), inputs);
        let seen = seen.borrow();
        assert!(seen.contains_key("_elem"));
        assert!(!seen.contains_key("elem"));
        assert_eq!(seen["title"], json!("x"));
    }

    #[test]
    fn strategy_and_inputs_come_from_attributes() {
        let node = el("div")
            .attr("bind-strategy", "onPush")
            .attr("bind-inputs", "user, limit")
            .build();
        let component = create_component(node, None, Map::new());
        assert_eq!(component.strategy(), UpdateStrategy::OnPush);
        let declared = component.with(|meta| meta.declared_inputs.clone()).unwrap();
        assert_eq!(declared, vec!["user".to_owned(), "limit".to_owned()]);

        component.set_strategy(UpdateStrategy::Default);
        component.declare_inputs(&["limit", "page"]);
        assert_eq!(component.strategy(), UpdateStrategy::Default);
        let declared = component.with(|meta| meta.declared_inputs.clone()).unwrap();
        assert_eq!(declared, ["user", "limit", "page"]);
        assert!(!component.is_repeat_item());
    }

    #[test]
    fn destroy_releases_everything_and_survives_hook_panic() {
        let destroyed = Rc::new(Cell::new(false));
        let flag = destroyed.clone();
        register_bind_fn("doomed", move |scope, _| {
            let flag = flag.clone();
            scope.set("n", 1);
            scope.on_destroy(move |scope| {
                flag.set(scope.get("n") == json!(1));
                panic!("cleanup failed");
            });
        });
        let button = el("button").attr("on-click", "n = n + 1");
        let root = el("div")
            .attr("bind-function", "doomed")
            .child(el("p").text("{{n}}"))
            .child(button)
            .build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        let button = root.child_elements()[1];
        assert_eq!(button.listener_count("click"), 1);
        assert!(component.watcher_count() > 0);

        component.destroy();
        assert!(destroyed.get());
        assert!(!component.is_alive());
        assert!(!scope.is_alive());
        assert_eq!(button.listener_count("click"), 0);
        assert_eq!(component_for_node(root), None);
        // second destroy is a no-op
        component.destroy();
    }

    #[test]
    fn destroying_parent_destroys_children() {
        let inner = el("section").attr("bind-function", "leaf");
        let root = el("div").attr("bind-function", "branch").child(inner).build();
        let components = start(root);
        components[0].destroy();
        assert!(components.iter().all(|c| !c.is_alive()));
    }

    #[test]
    fn update_property_marks_managed() {
        let node = el("div").build();
        let component = create_component(el("div").build(), None, Map::new());
        component.update_property(node, "disabled", &json!(true));
        assert_eq!(node.attr("disabled").as_deref(), Some(""));
        component.update_property(node, "disabled", &json!(false));
        assert!(!node.has_attr("disabled"));
        component.update_property(node, "class", &json!({"active": true, "hidden": false}));
        assert_eq!(node.attr("class").as_deref(), Some("active"));
        component.update_property(node, "style", &json!({"color": "red"}));
        assert_eq!(node.style("color").as_deref(), Some("red"));
        let managed = component
            .with_binding(node, |binding| binding.managed.len())
            .unwrap();
        assert_eq!(managed, 3);
    }
}
