//! `bind="path"`: two-way binding between a form control and the model.

use serde_json::Value;

use super::{Directive, DirectiveOutcome};
use crate::arena::ComponentId;
use crate::digest::schedule_digest;
use crate::dom::{ControlKind, ControlState, NodeId};
use crate::error::DirectiveError;
use crate::shadow::{self, ControlUpdate};
use crate::value::{coerce_number, deep_eq, is_truthy, to_display};
use crate::watcher::watch_node;

pub(crate) struct TwoWayBinding;

/// The model value a control represents. A radio that is not checked
/// represents nothing.
fn control_model(control: &ControlState) -> Option<Value> {
    match control.kind {
        ControlKind::Radio if !control.checked => None,
        ControlKind::Radio => Some(Value::String(control.value.clone())),
        _ => Some(control.typed_value()),
    }
}

/// Stage the model value onto the control.
fn apply_model(node: NodeId, model: &Value) {
    let Some(live) = node.control() else {
        return;
    };
    match live.kind {
        ControlKind::Checkbox => {
            shadow::stage_control(node, ControlUpdate::Checked(is_truthy(model)));
        }
        ControlKind::Radio => {
            shadow::stage_control(node, ControlUpdate::Checked(to_display(model) == live.value));
        }
        _ => {
            // what the user typed already means this; keep their text
            if deep_eq(&live.typed_value(), model) {
                cov_mark::hit!(model_matches_typed_text);
                return;
            }
            shadow::stage_control(node, ControlUpdate::Value(to_display(model)));
        }
    }
}

impl Directive for TwoWayBinding {
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError> {
        let Some(control) = node.control() else {
            return Err(DirectiveError::NotAControl {
                directive: "bind",
                tag: node.tag().unwrap_or_default(),
            });
        };
        let path = expression.trim().to_owned();
        if path.is_empty() {
            return Err(DirectiveError::InvalidSyntax {
                directive: "bind",
                expression: expression.to_owned(),
            });
        }
        let scope = component.scope().ok_or(DirectiveError::Detached { directive: "bind" })?;

        let current = scope.lookup_path(&path);
        if current.is_null() {
            if let Some(initial) = control_model(&control) {
                scope.set_path(&path, initial);
            }
        } else if control.kind.is_numeric() && !current.is_number() {
            scope.set_path(&path, coerce_number(&current));
        }

        component.with_binding(node, |binding| binding.two_way = Some(path.clone()));
        shadow::register_control(node, component);

        let event = control.kind.edit_event();
        let listener_path = path.clone();
        let listener = node.listen(event, move |_| {
            if !component.is_alive() {
                return;
            }
            let (Some(control), Some(scope)) = (node.control(), component.scope()) else {
                return;
            };
            let Some(typed) = control_model(&control) else {
                return;
            };
            if deep_eq(&scope.lookup_path(&listener_path), &typed) {
                return;
            }
            tracing::trace!(target: "bindery::directive", path = %listener_path, %typed, "control edited");
            scope.set_path(&listener_path, typed);
            component.mark_for_check();
            schedule_digest(Some(component));
        });
        component.with_binding(node, |binding| {
            binding
                .listeners
                .insert(format!("{event}:bind={path}"), (event.to_owned(), listener));
        });

        watch_node(component, Some(node), &path, move |model, _| apply_model(node, model));
        Ok(DirectiveOutcome::APPLIED)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use crate::component::create_component;
    use crate::digest::{flush_digests, schedule_digest};
    use crate::dom::el;

    #[test]
    fn number_input_round_trip() {
        let input = el("input").attr("type", "number").attr("bind", "count").build();
        let label = el("span").text("{{count * 2}}").build();
        let root = el("div").node(input).node(label).build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        scope.set("count", 1);
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(input.control().unwrap().value, "1");

        input.simulate_input("5");
        assert_eq!(scope.get("count"), json!(5));
        assert_eq!(label.text_content(), "10");

        scope.set("count", 6);
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(input.control().unwrap().value, "6");
    }

    #[test]
    fn typed_text_is_not_rewritten() {
        let input = el("input").attr("type", "number").attr("bind", "price").build();
        let root = el("div").node(input).build();
        let component = create_component(root, None, Map::new());
        flush_digests();
        cov_mark::check!(model_matches_typed_text);
        input.simulate_input("2.50");
        assert_eq!(component.scope().unwrap().get("price"), json!(2.5));
        assert_eq!(input.control().unwrap().value, "2.50");
    }

    #[test]
    fn empty_model_is_initialized_from_the_control() {
        let input = el("input").attr("type", "text").attr("value", "draft").attr("bind", "note").build();
        let root = el("div").node(input).build();
        let component = create_component(root, None, Map::new());
        assert_eq!(component.scope().unwrap().get("note"), json!("draft"));
    }

    #[test]
    fn checkbox_and_radio() {
        let agree = el("input").attr("type", "checkbox").attr("bind", "agree").build();
        let small = el("input").attr("type", "radio").attr("value", "s").attr("bind", "size").build();
        let large = el("input").attr("type", "radio").attr("value", "l").attr("bind", "size").build();
        let root = el("div").node(agree).node(small).node(large).build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        assert_eq!(scope.get("agree"), json!(false));

        agree.simulate_toggle(true);
        assert_eq!(scope.get("agree"), json!(true));

        large.simulate_toggle(true);
        assert_eq!(scope.get("size"), json!("l"));

        scope.set("size", "s");
        schedule_digest(Some(component));
        flush_digests();
        assert!(small.control().unwrap().checked);
        assert!(!large.control().unwrap().checked);
    }

    #[test]
    fn non_control_is_rejected() {
        let root = el("div").child(el("p").attr("bind", "x")).build();
        let component = create_component(root, None, Map::new());
        assert_eq!(component.watcher_count(), 0);
    }
}
