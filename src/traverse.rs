//! Binding a component's subtree.
//!
//! The walk visits each node once per component. Elements are checked in a
//! fixed order: `bind-repeat` and `bind-if` take the whole node; a nested
//! `bind-function` hands the node to a new component; otherwise each attribute
//! is an event binding, a directive, or an interpolated attribute. Text nodes
//! containing `{{ }}` become text bindings.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::arena::ComponentId;
use crate::arena::component_arena::node_component;
use crate::component::create_component;
use crate::digest::schedule_digest;
use crate::dom::{Event, NodeId};
use crate::expression::{self, Segment, has_interpolation, parse_interpolation, render_segments};
use crate::value::deep_eq;
use crate::watcher::watch_node;
use crate::{config, directive, shadow};

/// Attributes the traversal itself consumes.
const STRUCTURAL_ATTRIBUTES: [&str; 3] = ["bind-function", "bind-strategy", "bind-inputs"];

/// Mark `node` processed for `component`. Returns false if it already was.
fn claim(node: NodeId, component: ComponentId) -> bool {
    component
        .with_binding(node, |binding| !std::mem::replace(&mut binding.processed, true))
        .unwrap_or(false)
}

fn mark_initialized(node: NodeId, component: ComponentId) {
    component.with_binding(node, |binding| binding.initialized = true);
}

/// Bind `node` and everything below it for `component`.
pub(crate) fn process_subtree(node: NodeId, component: ComponentId) {
    if !node.is_alive() || !component.is_alive() {
        return;
    }
    if node.is_text() {
        bind_text(node, component);
        return;
    }
    if !node.is_element() {
        return;
    }

    // a repeat or condition owns the whole element, bind-function included
    let structural = ["bind-repeat", "bind-if"]
        .into_iter()
        .find_map(|name| node.attr(name).map(|expression| (name, expression)));
    if let Some((name, expression)) = structural {
        if !claim(node, component) {
            cov_mark::hit!(node_processed_once);
            return;
        }
        directive::dispatch(name, node, &expression, component);
        mark_initialized(node, component);
        return;
    }

    if component.node() != Some(node) && node.has_attr("bind-function") {
        if node_component(node).is_none_or(|existing| !existing.is_alive()) {
            create_component(node, None, Map::new());
        }
        return;
    }

    if !claim(node, component) {
        cov_mark::hit!(node_processed_once);
        return;
    }
    if node.is_control() {
        shadow::register_control(node, component);
    }

    let mut skip_children = false;
    for (name, value) in node.attributes() {
        if let Some(event) = config::event_for_attribute(&name) {
            bind_event(node, &event, &value, component);
        } else if STRUCTURAL_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        } else if directive::is_registered(&name) {
            skip_children |= directive::dispatch(&name, node, &value, component).skip_children;
        } else if has_interpolation(&value) {
            bind_attribute(node, &name, &value, component);
        }
    }
    mark_initialized(node, component);

    if skip_children {
        return;
    }
    for child in node.children() {
        process_subtree(child, component);
    }
}

/// Run `statement` whenever `event` fires on `node`.
///
/// The statement sees the event as `$event`. Afterwards the component, and
/// every component whose scope the statement assigned to, is digested.
pub(crate) fn bind_event(node: NodeId, event: &str, statement: &str, component: ComponentId) {
    let key = format!("{event}:{statement}");
    let exists = component
        .with_binding(node, |binding| binding.listeners.contains_key(&key))
        .unwrap_or(true);
    if exists {
        return;
    }
    let event_name = event.to_owned();
    let statement: Rc<str> = statement.into();
    let listener = node.listen(event, move |fired: &Event| {
        handle_event(node, component, &event_name, &statement, fired);
    });
    component.with_binding(node, |binding| {
        binding.listeners.insert(key, (event.to_owned(), listener));
    });
}

fn is_duplicate_edit(node: NodeId, component: ComponentId, event: &str) -> bool {
    if event != "input" && event != "change" {
        return false;
    }
    let Some(current) = node.control().map(|control| control.typed_value()) else {
        return false;
    };
    component
        .with_binding(node, |binding| {
            let duplicate = binding
                .last_event_values
                .get(event)
                .is_some_and(|last| deep_eq(last, &current));
            if !duplicate {
                binding.last_event_values.insert(event.to_owned(), current);
            }
            duplicate
        })
        .unwrap_or(true)
}

fn handle_event(node: NodeId, component: ComponentId, event: &str, statement: &str, fired: &Event) {
    if !component.is_alive() {
        return;
    }
    if is_duplicate_edit(node, component, event) {
        cov_mark::hit!(duplicate_control_event_skipped);
        return;
    }
    let Some(scope) = component.scope() else {
        return;
    };
    let (written, result) = expression::execute_tracked(statement, scope, Some(fired.to_value()));
    if let Err(error) = result {
        tracing::warn!(target: "bindery::event", event, statement, %error, "event handler failed");
    }
    component.mark_for_check();
    schedule_digest(Some(component));
    for target in written.into_iter().filter_map(|scope| scope.component()) {
        if target != component {
            target.mark_for_check();
            schedule_digest(Some(target));
        }
    }
}

/// Keep an attribute whose value contains `{{ }}` rendered.
fn bind_attribute(node: NodeId, attribute: &str, template: &str, component: ComponentId) {
    let segments: Rc<[Segment]> = parse_interpolation(template).into();
    for segment in segments.iter() {
        let Segment::Expression(source) = segment else {
            continue;
        };
        let segments = segments.clone();
        let attribute = attribute.to_owned();
        watch_node(component, Some(node), source, move |_, _| {
            let Some(scope) = component.scope() else {
                return;
            };
            let rendered = render_segments(&segments, scope);
            if node.attr(&attribute).as_deref() != Some(rendered.as_str()) {
                component.update_property(node, &attribute, &Value::String(rendered));
            }
        });
    }
}

/// Keep a text node whose content contains `{{ }}` rendered, through the
/// shadow state.
fn bind_text(node: NodeId, component: ComponentId) {
    let Some(text) = node.text_value() else {
        return;
    };
    if !has_interpolation(&text) || !claim(node, component) {
        return;
    }
    shadow::register_text(node, component);
    let segments: Rc<[Segment]> = parse_interpolation(&text).into();
    for segment in segments.iter() {
        let Segment::Expression(source) = segment else {
            continue;
        };
        let segments = segments.clone();
        watch_node(component, Some(node), source, move |_, _| {
            if let Some(scope) = component.scope() {
                shadow::stage_text(node, render_segments(&segments, scope));
            }
        });
    }
}
