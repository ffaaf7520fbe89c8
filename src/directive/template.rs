//! `bind-component="name"`: fill the element from a named template.
//!
//! Templates come from the host through a [`TemplateSource`]. The template
//! is cloned and its children moved into the container. When the template
//! root declares `bind-function` the container becomes a component of that
//! name and the value of its `data` attribute is assigned into the new
//! scope; otherwise the content is bound by the enclosing component.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

use super::{Directive, DirectiveOutcome};
use crate::arena::ComponentId;
use crate::component::create_component;
use crate::digest::schedule_digest;
use crate::dom::NodeId;
use crate::error::DirectiveError;
use crate::expression;
use crate::traverse::process_subtree;

/// Where `bind-component` finds its templates.
///
/// Returned nodes are cloned, never consumed, so a source may hand out the
/// same node every time.
pub trait TemplateSource {
    /// The template named `name`.
    fn template(&self, name: &str) -> Option<NodeId>;
}

impl<F> TemplateSource for F
where
    F: Fn(&str) -> Option<NodeId>,
{
    fn template(&self, name: &str) -> Option<NodeId> {
        self(name)
    }
}

thread_local! {
    static TEMPLATE_SOURCE: RefCell<Option<Rc<dyn TemplateSource>>> = const { RefCell::new(None) };
}

/// Install the template source, replacing any previous one.
pub fn set_template_source<S>(source: S)
where
    S: TemplateSource + 'static,
{
    TEMPLATE_SOURCE.with_borrow_mut(|slot| *slot = Some(Rc::new(source)));
}

/// Remove the template source.
pub fn clear_template_source() {
    let previous = TEMPLATE_SOURCE.with_borrow_mut(Option::take);
    drop(previous);
}

/// Attributes carried over from a template root onto its container.
const COMPONENT_ATTRIBUTES: [&str; 3] = ["bind-function", "bind-strategy", "bind-inputs"];

pub(crate) struct ComponentLoader;

impl ComponentLoader {
    /// The expression usually is a quoted name; anything that does not
    /// evaluate to a non-empty string is taken literally.
    fn template_name(expression: &str, component: ComponentId) -> String {
        let evaluated = component
            .scope()
            .map(|scope| expression::try_evaluate(expression, scope));
        match evaluated {
            Some(Ok(Value::String(name))) if !name.trim().is_empty() => name.trim().to_owned(),
            _ => expression.trim().to_owned(),
        }
    }

    fn data(node: NodeId, component: ComponentId) -> Map<String, Value> {
        let (Some(source), Some(scope)) = (node.attr("data"), component.scope()) else {
            return Map::new();
        };
        match expression::try_evaluate(&source, scope) {
            Ok(Value::Object(data)) => data,
            Ok(Value::Null) => Map::new(),
            Ok(other) => {
                tracing::warn!(target: "bindery::directive", data = %source, %other, "bind-component data is not an object");
                Map::new()
            }
            Err(error) => {
                tracing::warn!(target: "bindery::directive", data = %source, %error, "bind-component data failed");
                Map::new()
            }
        }
    }
}

impl Directive for ComponentLoader {
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError> {
        let name = Self::template_name(expression, component);
        if name.is_empty() {
            return Err(DirectiveError::InvalidSyntax {
                directive: "bind-component",
                expression: expression.to_owned(),
            });
        }
        let source = TEMPLATE_SOURCE
            .with_borrow(Clone::clone)
            .ok_or(DirectiveError::NoTemplateSource)?;
        let copy = source
            .template(&name)
            .and_then(NodeId::deep_clone)
            .ok_or_else(|| DirectiveError::TemplateNotFound { name: name.clone() })?;
        let data = Self::data(node, component);

        // the container is processed again as a component root below
        node.remove_attr("bind-component");
        node.set_attr("data-component-name", name.as_str());
        for child in node.children() {
            child.remove();
        }
        for child in copy.children() {
            node.append(child);
        }
        let declared: Vec<(&str, String)> = COMPONENT_ATTRIBUTES
            .into_iter()
            .filter_map(|attribute| copy.attr(attribute).map(|value| (attribute, value)))
            .collect();
        copy.remove();

        if declared.iter().any(|(attribute, _)| *attribute == "bind-function") {
            for (attribute, value) in declared {
                node.set_attr(attribute, value);
            }
            let loaded = create_component(node, None, data.clone());
            if let Some(scope) = loaded.scope() {
                for (key, value) in data {
                    scope.set(&key, value);
                }
            }
            schedule_digest(Some(loaded));
            tracing::debug!(target: "bindery::directive", template = %name, component = ?loaded, "component loaded");
        } else {
            for child in node.children() {
                process_subtree(child, component);
            }
            tracing::debug!(target: "bindery::directive", template = %name, "template content bound");
        }
        Ok(DirectiveOutcome::OWNS_CHILDREN)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::component::{BindContext, BindFn, register_bind_fn};
    use crate::digest::flush_digests;
    use crate::dom::el;
    use crate::scope::Scope;

    fn install(templates: Vec<(&'static str, NodeId)>) {
        set_template_source(move |name: &str| {
            templates
                .iter()
                .find(|(candidate, _)| *candidate == name)
                .map(|(_, node)| *node)
        });
    }

    #[test]
    fn loads_a_component_template() {
        register_bind_fn("user-card", |scope, _| scope.set("greeting", "Hi"));
        let card = el("template")
            .attr("bind-function", "user-card")
            .child(el("h3").text("{{greeting}} {{user.name}}"))
            .build();
        install(vec![("user-card", card)]);

        let slot = el("div")
            .attr("bind-component", "'user-card'")
            .attr("data", "{user: current}")
            .build();
        let root = el("main").node(slot).build();
        let bind: BindFn = Rc::new(|scope: Scope, _: &BindContext| scope.set("current", json!({"name": "Ada"})));
        create_component(root, Some(bind), Map::new());
        flush_digests();

        assert_eq!(slot.text_content(), "Hi Ada");
        assert_eq!(slot.attr("data-component-name").as_deref(), Some("user-card"));
        // the source keeps its template
        assert_eq!(card.child_elements().len(), 1);
        clear_template_source();
    }

    #[test]
    fn data_is_assigned_into_the_new_scope() {
        register_bind_fn("badge", |_, _| {});
        let badge = el("template")
            .attr("bind-function", "badge")
            .child(el("span").text("{{label}}"))
            .build();
        install(vec![("badge", badge)]);

        let slot = el("div")
            .attr("bind-component", "badge")
            .attr("data", "{label: 'new'}")
            .build();
        let root = el("main").node(slot).build();
        let parent = create_component(root, None, Map::new());
        flush_digests();
        let loaded = parent.children()[0];
        assert_eq!(loaded.scope().unwrap().get("label"), json!("new"));
        assert_eq!(slot.text_content(), "new");
        clear_template_source();
    }

    #[test]
    fn plain_template_binds_with_the_enclosing_component() {
        let footer = el("template").child(el("p").text("{{year}}")).build();
        install(vec![("footer", footer)]);

        let slot = el("footer").attr("bind-component", "'footer'").build();
        let root = el("main").node(slot).build();
        let parent = create_component(root, None, Map::new());
        parent.scope().unwrap().set("year", 2024);
        schedule_digest(Some(parent));
        flush_digests();
        assert_eq!(slot.text_content(), "2024");
        assert!(parent.children().is_empty());
        clear_template_source();
    }

    #[test]
    fn missing_template_leaves_the_container() {
        install(vec![]);
        let slot = el("div").attr("bind-component", "'nowhere'").text("fallback").build();
        let root = el("main").node(slot).build();
        create_component(root, None, Map::new());
        assert_eq!(slot.text_content(), "fallback");
        clear_template_source();
    }
}
