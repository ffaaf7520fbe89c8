//! In-memory host UI tree.
//!
//! The runtime reads and writes the UI exclusively through this module: element,
//! text and comment nodes addressed by copyable [`NodeId`]s, attribute and style
//! maps, form-control state, and event listeners. A host embedding the runtime
//! mirrors its real tree into this one; tests build trees with [`el`].
//!
//! # Usage
//!
//! ```ignore
//! let root = el("div")
//!     .attr("bind-function", "counter")
//!     .child(el("input").attr("type", "number").attr("bind", "count"))
//!     .child(el("span").text("{{count}}"))
//!     .build();
//!
//! start(root);
//! flush_digests();
//!
//! let input = root.children()[0];
//! input.simulate_input("5"); // dispatch runs the resulting digest
//! ```

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::arena::{Arena, Key};
use crate::batch::MacroTask;
use crate::value;

thread_local! {
    static TREE: RefCell<Arena<NodeData>> = const { RefCell::new(Arena::new()) };
    static NEXT_LISTENER: Cell<u64> = const { Cell::new(1) };
}

/// Handle to a node of the host UI tree.
///
/// Ids are generation-checked: once a node is removed, every accessor on a
/// stale id returns `None` (or does nothing).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(Key);

/// Handle returned by [`NodeId::listen`], used to remove the listener again.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ListenerId(u64);

/// Kind of form control an element represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    /// `<input>` with a textual type.
    Text,
    /// `<input type="number">`.
    Number,
    /// `<input type="range">`.
    Range,
    /// `<input type="checkbox">`.
    Checkbox,
    /// `<input type="radio">`.
    Radio,
    /// `<select>`.
    Select,
    /// `<textarea>`.
    TextArea,
}

impl ControlKind {
    fn detect(tag: &str, input_type: Option<&str>) -> Option<Self> {
        match tag {
            "input" => Some(match input_type.map(str::to_ascii_lowercase).as_deref() {
                Some("number") => Self::Number,
                Some("range") => Self::Range,
                Some("checkbox") => Self::Checkbox,
                Some("radio") => Self::Radio,
                _ => Self::Text,
            }),
            "select" => Some(Self::Select),
            "textarea" => Some(Self::TextArea),
            _ => None,
        }
    }

    /// Number and range inputs hold numeric values.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Range)
    }

    /// Checkboxes and radios carry their state in `checked`.
    pub fn is_checkable(self) -> bool {
        matches!(self, Self::Checkbox | Self::Radio)
    }

    /// The event a two-way binding listens to.
    pub fn edit_event(self) -> &'static str {
        match self {
            Self::Checkbox | Self::Radio | Self::Select => "change",
            _ => "input",
        }
    }
}

/// Live state of a form control.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    /// Kind of control.
    pub kind: ControlKind,
    /// Current value text.
    pub value: String,
    /// Checked flag of checkboxes and radios.
    pub checked: bool,
    /// Index of the selected option of a select.
    pub selected_index: Option<usize>,
    /// Whether a select allows multiple selection.
    pub multiple: bool,
}

impl ControlState {
    fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            value: if kind.is_checkable() { "on".to_owned() } else { String::new() },
            checked: false,
            selected_index: None,
            multiple: false,
        }
    }

    /// The control's value as the model sees it: checkboxes yield their
    /// checked flag, numeric inputs a number (unparseable text reads as zero),
    /// everything else the value text.
    pub fn typed_value(&self) -> Value {
        match self.kind {
            ControlKind::Checkbox => Value::Bool(self.checked),
            ControlKind::Number | ControlKind::Range => {
                value::coerce_number(&Value::String(self.value.clone()))
            }
            _ => Value::String(self.value.clone()),
        }
    }
}

/// An event delivered to listeners.
#[derive(Clone, Debug)]
pub struct Event {
    /// Event name, e.g. `click`.
    pub name: String,
    /// Node the event was dispatched on.
    pub target: NodeId,
    /// Host supplied payload.
    pub detail: Value,
}

impl Event {
    /// Create an event without payload.
    pub fn new(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
            detail: Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    /// The event as handler statements see it through `$event`.
    pub(crate) fn to_value(&self) -> Value {
        let control = self.target.control();
        json!({
            "type": self.name,
            "detail": self.detail,
            "value": control.as_ref().map_or(Value::Null, |c| Value::String(c.value.clone())),
            "checked": control.as_ref().is_some_and(|c| c.checked),
        })
    }
}

#[derive(Clone, Debug)]
struct Element {
    tag: String,
    attributes: IndexMap<String, String>,
    style: IndexMap<String, String>,
    inner_html: Option<String>,
    control: Option<ControlState>,
}

#[derive(Clone, Debug)]
enum NodeKind {
    Element(Element),
    Text(String),
    Comment(String),
}

struct Listener {
    id: ListenerId,
    event: String,
    handler: Rc<dyn Fn(&Event)>,
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<Listener>,
}

fn insert(kind: NodeKind) -> NodeId {
    TREE.with_borrow_mut(|tree| {
        NodeId(tree.insert(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        }))
    })
}

fn detach_in(tree: &mut Arena<NodeData>, id: NodeId) {
    let Some(parent) = tree.get_mut(id.0).and_then(|node| node.parent.take()) else {
        return;
    };
    if let Some(parent) = tree.get_mut(parent.0) {
        parent.children.retain(|child| *child != id);
    }
}

fn subtree_in(tree: &Arena<NodeData>, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(next) = stack.pop() {
        let Some(node) = tree.get(next.0) else { continue };
        out.push(next);
        stack.extend(node.children.iter().rev().copied());
    }
    out
}

fn clone_in(tree: &mut Arena<NodeData>, id: NodeId, parent: Option<NodeId>) -> Option<NodeId> {
    let (kind, children) = {
        let node = tree.get(id.0)?;
        (node.kind.clone(), node.children.clone())
    };
    let copy = NodeId(tree.insert(NodeData {
        kind,
        parent,
        children: Vec::with_capacity(children.len()),
        listeners: Vec::new(),
    }));
    for child in children {
        if let Some(child_copy) = clone_in(tree, child, Some(copy)) {
            if let Some(node) = tree.get_mut(copy.0) {
                node.children.push(child_copy);
            }
        }
    }
    Some(copy)
}

impl NodeId {
    /// Create a detached element.
    pub fn element(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        let control = ControlKind::detect(&tag, None).map(ControlState::new);
        insert(NodeKind::Element(Element {
            tag,
            attributes: IndexMap::new(),
            style: IndexMap::new(),
            inner_html: None,
            control,
        }))
    }

    /// Create a detached text node.
    pub fn text(content: impl Into<String>) -> Self {
        insert(NodeKind::Text(content.into()))
    }

    /// Create a detached comment node.
    pub fn comment(content: impl Into<String>) -> Self {
        insert(NodeKind::Comment(content.into()))
    }

    fn with<R>(self, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        TREE.with_borrow(|tree| tree.get(self.0).map(f))
    }

    fn with_mut<R>(self, f: impl FnOnce(&mut NodeData) -> R) -> Option<R> {
        TREE.with_borrow_mut(|tree| tree.get_mut(self.0).map(f))
    }

    fn with_element<R>(self, f: impl FnOnce(&Element) -> R) -> Option<R> {
        self.with(|node| match &node.kind {
            NodeKind::Element(element) => Some(f(element)),
            _ => None,
        })
        .flatten()
    }

    fn with_element_mut<R>(self, f: impl FnOnce(&mut Element) -> R) -> Option<R> {
        self.with_mut(|node| match &mut node.kind {
            NodeKind::Element(element) => Some(f(element)),
            _ => None,
        })
        .flatten()
    }

    /// Whether the node still exists.
    pub fn is_alive(self) -> bool {
        TREE.with_borrow(|tree| tree.contains(self.0))
    }

    /// Whether the node is an element.
    pub fn is_element(self) -> bool {
        self.with(|node| matches!(node.kind, NodeKind::Element(_)))
            .unwrap_or(false)
    }

    /// Whether the node is a text node.
    pub fn is_text(self) -> bool {
        self.with(|node| matches!(node.kind, NodeKind::Text(_)))
            .unwrap_or(false)
    }

    /// Whether the node is a comment.
    pub fn is_comment(self) -> bool {
        self.with(|node| matches!(node.kind, NodeKind::Comment(_)))
            .unwrap_or(false)
    }

    /// Lowercase tag name of an element.
    pub fn tag(self) -> Option<String> {
        self.with_element(|element| element.tag.clone())
    }

    /// Parent node, if attached.
    pub fn parent(self) -> Option<NodeId> {
        self.with(|node| node.parent).flatten()
    }

    /// Direct children in order.
    pub fn children(self) -> Vec<NodeId> {
        self.with(|node| node.children.clone()).unwrap_or_default()
    }

    /// Child elements in order, skipping text and comments.
    pub fn child_elements(self) -> Vec<NodeId> {
        self.children()
            .into_iter()
            .filter(|child| child.is_element())
            .collect()
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            out.push(node);
            current = node.parent();
        }
        out
    }

    /// This node and the siblings after it, stopping before `stop` (or at
    /// the last sibling). A detached node yields itself only.
    pub fn siblings_until(self, stop: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent() else {
            return vec![self];
        };
        parent
            .children()
            .into_iter()
            .skip_while(|node| *node != self)
            .take_while(|node| *node != stop)
            .collect()
    }

    /// Every node below this one, in document order.
    pub fn descendants(self) -> Vec<NodeId> {
        let mut all = TREE.with_borrow(|tree| subtree_in(tree, self));
        if !all.is_empty() {
            all.remove(0);
        }
        all
    }

    /// Whether `other` is this node or lies below it.
    pub fn contains(self, other: NodeId) -> bool {
        other == self || other.ancestors().contains(&self)
    }

    /// Append `child` as the last child, moving it from its old position.
    ///
    /// Appending an ancestor of `self` would create a cycle and is ignored.
    pub fn append(self, child: NodeId) {
        if child.contains(self) {
            tracing::warn!(target: "bindery::dom", ?child, parent = ?self, "refusing to append an ancestor");
            return;
        }
        TREE.with_borrow_mut(|tree| {
            if !tree.contains(self.0) || !tree.contains(child.0) {
                return;
            }
            detach_in(tree, child);
            if let Some(node) = tree.get_mut(child.0) {
                node.parent = Some(self);
            }
            if let Some(node) = tree.get_mut(self.0) {
                node.children.push(child);
            }
        });
    }

    fn insert_relative(self, new_node: NodeId, offset: usize) -> bool {
        if new_node.contains(self) {
            return false;
        }
        TREE.with_borrow_mut(|tree| {
            if !tree.contains(new_node.0) {
                return false;
            }
            let Some(parent) = tree.get(self.0).and_then(|node| node.parent) else {
                return false;
            };
            detach_in(tree, new_node);
            let Some(parent_node) = tree.get_mut(parent.0) else {
                return false;
            };
            let Some(position) = parent_node.children.iter().position(|c| *c == self) else {
                return false;
            };
            parent_node.children.insert(position + offset, new_node);
            if let Some(node) = tree.get_mut(new_node.0) {
                node.parent = Some(parent);
            }
            true
        })
    }

    /// Insert `new_node` right after this node. Returns false when this node
    /// has no parent.
    pub fn insert_after(self, new_node: NodeId) -> bool {
        self.insert_relative(new_node, 1)
    }

    /// Insert `new_node` right before this node. Returns false when this node
    /// has no parent.
    pub fn insert_before(self, new_node: NodeId) -> bool {
        self.insert_relative(new_node, 0)
    }

    /// Detach from the parent, keeping the subtree alive.
    pub fn detach(self) {
        TREE.with_borrow_mut(|tree| detach_in(tree, self));
    }

    /// Detach and free this node, its subtree and their listeners.
    pub fn remove(self) {
        let removed = TREE.with_borrow_mut(|tree| {
            detach_in(tree, self);
            subtree_in(tree, self)
                .into_iter()
                .filter_map(|id| tree.remove(id.0))
                .collect::<Vec<_>>()
        });
        // handlers may own captured state with drop glue; drop outside the borrow
        drop(removed);
    }

    /// Copy this node and its subtree. Listeners are not copied.
    pub fn deep_clone(self) -> Option<NodeId> {
        TREE.with_borrow_mut(|tree| clone_in(tree, self, None))
    }

    /// Attribute value.
    pub fn attr(self, name: &str) -> Option<String> {
        self.with_element(|element| element.attributes.get(name).cloned())
            .flatten()
    }

    /// Whether the attribute is present.
    pub fn has_attr(self, name: &str) -> bool {
        self.with_element(|element| element.attributes.contains_key(name))
            .unwrap_or(false)
    }

    /// All attributes in declaration order.
    pub fn attributes(self) -> Vec<(String, String)> {
        self.with_element(|element| {
            element
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Set an attribute. `type`, `value`, `checked` and `multiple` also
    /// initialize the matching control state.
    pub fn set_attr(self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.with_element_mut(|element| {
            match name {
                "type" => {
                    if let Some(kind) = ControlKind::detect(&element.tag, Some(value.as_str())) {
                        let mut control = ControlState::new(kind);
                        if let Some(old) = element.control.take() {
                            if !old.value.is_empty() {
                                control.value = old.value;
                            }
                            control.checked = old.checked;
                        }
                        element.control = Some(control);
                    }
                }
                "value" => {
                    if let Some(control) = element.control.as_mut() {
                        control.value = value.clone();
                    }
                }
                "checked" => {
                    if let Some(control) = element.control.as_mut() {
                        control.checked = true;
                    }
                }
                "multiple" => {
                    if let Some(control) = element.control.as_mut() {
                        control.multiple = true;
                    }
                }
                _ => {}
            }
            element.attributes.insert(name.to_owned(), value);
        });
    }

    /// Remove an attribute.
    pub fn remove_attr(self, name: &str) {
        self.with_element_mut(|element| {
            element.attributes.shift_remove(name);
        });
    }

    /// Content of a text or comment node.
    pub fn text_value(self) -> Option<String> {
        self.with(|node| match &node.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text.clone()),
            NodeKind::Element(_) => None,
        })
        .flatten()
    }

    /// Replace the content of a text or comment node.
    pub fn set_text(self, content: impl Into<String>) {
        let content = content.into();
        self.with_mut(|node| match &mut node.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => *text = content,
            NodeKind::Element(_) => {}
        });
    }

    /// Concatenated text of every text node in the subtree.
    pub fn text_content(self) -> String {
        let mut out = self.text_value().filter(|_| self.is_text()).unwrap_or_default();
        for node in self.descendants() {
            if node.is_text() {
                out.push_str(&node.text_value().unwrap_or_default());
            }
        }
        out
    }

    /// Inline style property.
    pub fn style(self, property: &str) -> Option<String> {
        self.with_element(|element| element.style.get(property).cloned())
            .flatten()
    }

    /// Set (or with `None`, remove) an inline style property.
    pub fn set_style(self, property: &str, value: Option<String>) {
        self.with_element_mut(|element| match value {
            Some(value) => {
                element.style.insert(property.to_owned(), value);
            }
            None => {
                element.style.shift_remove(property);
            }
        });
    }

    /// Raw markup assigned through [`set_inner_html`](Self::set_inner_html).
    pub fn inner_html(self) -> Option<String> {
        self.with_element(|element| element.inner_html.clone())
            .flatten()
    }

    /// Replace the children with host markup. The markup is stored verbatim
    /// for the host to render.
    pub fn set_inner_html(self, markup: impl Into<String>) {
        for child in self.children() {
            child.remove();
        }
        let markup = markup.into();
        self.with_element_mut(|element| element.inner_html = Some(markup));
    }

    /// Live form-control state, for controls.
    pub fn control(self) -> Option<ControlState> {
        self.with_element(|element| element.control.clone())
            .flatten()
    }

    /// Whether this node is a form control.
    pub fn is_control(self) -> bool {
        self.with_element(|element| element.control.is_some())
            .unwrap_or(false)
    }

    fn option_values(self) -> Vec<String> {
        self.descendants()
            .into_iter()
            .filter(|node| node.tag().as_deref() == Some("option"))
            .map(|option| option.attr("value").unwrap_or_else(|| option.text_content()))
            .collect()
    }

    /// Set a control's value. Selects move their selection to the option with
    /// that value.
    pub fn set_value(self, new_value: &str) {
        let options = match self.control() {
            Some(control) if control.kind == ControlKind::Select => Some(self.option_values()),
            Some(_) => None,
            None => return,
        };
        self.with_element_mut(|element| {
            let Some(control) = element.control.as_mut() else { return };
            control.value = new_value.to_owned();
            if let Some(options) = options {
                control.selected_index = options.iter().position(|option| option == new_value);
            }
        });
    }

    /// Set a checkbox or radio's checked flag.
    pub fn set_checked(self, checked: bool) {
        self.with_element_mut(|element| {
            if let Some(control) = element.control.as_mut() {
                control.checked = checked;
            }
        });
    }

    /// Register an event listener.
    pub fn listen(self, event: impl Into<String>, handler: impl Fn(&Event) + 'static) -> ListenerId {
        let id = NEXT_LISTENER.with(|next| {
            let id = next.get();
            next.set(id + 1);
            ListenerId(id)
        });
        let event = event.into();
        self.with_mut(|node| {
            node.listeners.push(Listener {
                id,
                event,
                handler: Rc::new(handler),
            });
        });
        id
    }

    /// Remove a listener registered with [`listen`](Self::listen).
    pub fn unlisten(self, listener: ListenerId) {
        let removed = self.with_mut(|node| {
            node.listeners
                .iter()
                .position(|l| l.id == listener)
                .map(|index| node.listeners.remove(index))
        });
        drop(removed);
    }

    /// Number of listeners registered for an event.
    pub fn listener_count(self, event: &str) -> usize {
        self.with(|node| node.listeners.iter().filter(|l| l.event == event).count())
            .unwrap_or(0)
    }

    /// Deliver an event to this node's listeners.
    ///
    /// Handlers run inside one macro task, so digests they request have run
    /// by the time this returns. A panicking handler is logged and the rest
    /// still run.
    pub fn dispatch(self, event: Event) {
        let handlers: Vec<_> = self
            .with(|node| {
                node.listeners
                    .iter()
                    .filter(|l| l.event == event.name)
                    .map(|l| l.handler.clone())
                    .collect()
            })
            .unwrap_or_default();
        if handlers.is_empty() {
            return;
        }
        tracing::trace!(target: "bindery::event", node = ?self, event = %event.name, "dispatch");
        MacroTask::run(|| {
            for handler in handlers {
                if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                    tracing::error!(target: "bindery::event", node = ?self, event = %event.name, "event handler panicked");
                }
            }
        });
    }

    /// Dispatch an event without payload.
    pub fn emit(self, name: &str) {
        self.dispatch(Event::new(name, self));
    }

    /// Behave like a user typing `text` into this control: set the value,
    /// then dispatch `input` and `change`.
    pub fn simulate_input(self, text: &str) {
        if !self.is_control() {
            return;
        }
        MacroTask::run(|| {
            self.set_value(text);
            self.emit("input");
            self.emit("change");
        });
    }

    /// Behave like a user toggling this checkbox or radio.
    pub fn simulate_toggle(self, checked: bool) {
        if !self.is_control() {
            return;
        }
        MacroTask::run(|| {
            self.set_checked(checked);
            self.emit("input");
            self.emit("change");
        });
    }
}

/// Number of live nodes on this thread.
pub fn node_count() -> usize {
    TREE.with_borrow(Arena::len)
}

/// Fluent builder for element subtrees.
#[derive(Clone, Debug)]
pub struct ElementBuilder {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Child>,
}

#[derive(Clone, Debug)]
enum Child {
    Element(ElementBuilder),
    Text(String),
    Node(NodeId),
}

/// Start building an element.
pub fn el(tag: &str) -> ElementBuilder {
    ElementBuilder {
        tag: tag.to_owned(),
        attributes: Vec::new(),
        children: Vec::new(),
    }
}

impl ElementBuilder {
    /// Add an attribute.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Add a text child.
    pub fn text(mut self, content: &str) -> Self {
        self.children.push(Child::Text(content.to_owned()));
        self
    }

    /// Add an element child.
    pub fn child(mut self, child: ElementBuilder) -> Self {
        self.children.push(Child::Element(child));
        self
    }

    /// Adopt an existing node as the next child.
    pub fn node(mut self, node: NodeId) -> Self {
        self.children.push(Child::Node(node));
        self
    }

    /// Create the nodes.
    pub fn build(self) -> NodeId {
        let element = NodeId::element(&self.tag);
        // `type` first so the control kind is known before `value`/`checked`
        let (typed, rest): (Vec<_>, Vec<_>) =
            self.attributes.into_iter().partition(|(name, _)| name == "type");
        for (name, value) in typed.into_iter().chain(rest) {
            element.set_attr(&name, value);
        }
        for child in self.children {
            let node = match child {
                Child::Element(builder) => builder.build(),
                Child::Text(text) => NodeId::text(text),
                Child::Node(node) => node,
            };
            element.append(node);
        }
        if element.control().is_some_and(|c| c.kind == ControlKind::Select) {
            let options = element.option_values();
            let selected = element
                .descendants()
                .into_iter()
                .filter(|node| node.tag().as_deref() == Some("option"))
                .position(|option| option.has_attr("selected"))
                .or(if options.is_empty() { None } else { Some(0) });
            if let Some(value) = selected.and_then(|index| options.get(index)) {
                element.set_value(value);
            }
        }
        element
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn builder_creates_tree_and_controls() {
        let root = el("div")
            .child(el("input").attr("value", "3").attr("type", "number"))
            .text("hello")
            .build();
        let children = root.children();
        assert_eq!(children.len(), 2);
        let control = children[0].control().unwrap();
        assert_eq!(control.kind, ControlKind::Number);
        assert_eq!(control.value, "3");
        assert_eq!(control.typed_value(), json!(3));
        assert_eq!(root.text_content(), "hello");
    }

    #[test]
    fn select_tracks_selected_option() {
        let select = el("select")
            .child(el("option").attr("value", "a").text("A"))
            .child(el("option").attr("value", "b").attr("selected", "").text("B"))
            .build();
        assert_eq!(select.control().unwrap().value, "b");
        assert_eq!(select.control().unwrap().selected_index, Some(1));
        select.set_value("a");
        assert_eq!(select.control().unwrap().selected_index, Some(0));
    }

    #[test]
    fn remove_frees_the_subtree() {
        let root = el("ul").child(el("li").text("one")).build();
        let item = root.children()[0];
        let text = item.children()[0];
        item.remove();
        assert!(!item.is_alive());
        assert!(!text.is_alive());
        assert!(root.children().is_empty());
    }

    #[test]
    fn sibling_ranges() {
        let root = el("ul").child(el("a")).child(el("b")).child(el("c")).build();
        let children = root.children();
        assert_eq!(children[0].siblings_until(children[2]), children[..2].to_vec());
        assert_eq!(children[1].siblings_until(children[0]), children[1..].to_vec());
        assert!(children[2].siblings_until(children[2]).is_empty());
        let loose = el("p").build();
        assert_eq!(loose.siblings_until(children[0]), vec![loose]);
    }

    #[test]
    fn insert_after_and_clone() {
        let root = el("div").child(el("a")).child(el("c")).build();
        let children = root.children();
        let (a, c) = (children[0], children[1]);
        let b = el("b").attr("x", "1").text("t").build();
        assert!(a.insert_after(b));
        assert_eq!(root.children(), vec![a, b, c]);

        let copy = b.deep_clone().unwrap();
        assert_ne!(copy, b);
        assert_eq!(copy.parent(), None);
        assert_eq!(copy.attr("x").as_deref(), Some("1"));
        assert_eq!(copy.text_content(), "t");
    }

    #[test]
    fn listeners_receive_events_and_can_be_removed() {
        let node = el("button").build();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let id = node.listen("click", move |event| {
            seen_clone.borrow_mut().push(event.name.clone());
        });
        node.emit("click");
        node.emit("keyup");
        node.unlisten(id);
        node.emit("click");
        assert_eq!(*seen.borrow(), vec!["click".to_owned()]);
    }

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let node = el("button").build();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        node.listen("click", |_| panic!("boom"));
        node.listen("click", move |_| ran_clone.set(true));
        node.emit("click");
        assert!(ran.get());
    }

    #[test]
    fn appending_an_ancestor_is_ignored() {
        let root = el("div").child(el("span")).build();
        let span = root.children()[0];
        span.append(root);
        assert_eq!(root.parent(), None);
        assert_eq!(span.parent(), Some(root));
    }
}
