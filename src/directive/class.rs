//! `bind-class`: classes from a string, an array or an object of flags,
//! added to the classes the element was written with.

use serde_json::Value;

use super::{Directive, DirectiveOutcome};
use crate::arena::ComponentId;
use crate::dom::NodeId;
use crate::error::DirectiveError;
use crate::expression::{ExpressionShape, classify};
use crate::value::{is_truthy, to_display};
use crate::watcher::watch_node;

pub(crate) struct ClassBinding;

fn dynamic_classes(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => text.split_whitespace().map(str::to_owned).collect(),
        Value::Array(items) => items
            .iter()
            .filter(|item| is_truthy(item))
            .flat_map(|item| {
                to_display(item)
                    .split_whitespace()
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .collect(),
        Value::Object(flags) => flags
            .iter()
            .filter(|(_, on)| is_truthy(on))
            .map(|(name, _)| name.clone())
            .collect(),
        _ => Vec::new(),
    }
}

/// Original classes first, then dynamic ones, without duplicates.
fn combine(original: &str, value: &Value) -> String {
    let mut classes: Vec<String> = original.split_whitespace().map(str::to_owned).collect();
    for class in dynamic_classes(value) {
        if !classes.contains(&class) {
            classes.push(class);
        }
    }
    classes.join(" ")
}

impl Directive for ClassBinding {
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError> {
        let source = match classify(expression) {
            ExpressionShape::Object(_) if !expression.trim().starts_with('{') => {
                format!("{{{}}}", expression.trim())
            }
            ExpressionShape::Object(_) | ExpressionShape::Ternary(_) => expression.trim().to_owned(),
            ExpressionShape::Simple(source) if source.is_empty() => {
                return Err(DirectiveError::InvalidSyntax {
                    directive: "bind-class",
                    expression: expression.to_owned(),
                });
            }
            ExpressionShape::Simple(source) => source,
        };

        let original = node.attr("class").unwrap_or_default();
        component.with_binding(node, |binding| binding.original_classes = Some(original.clone()));

        watch_node(component, Some(node), &source, move |value, _| {
            let combined = combine(&original, value);
            if node.attr("class").unwrap_or_default() != combined {
                component.update_property(node, "class", &Value::String(combined));
            }
        });
        Ok(DirectiveOutcome::APPLIED)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::component::create_component;
    use crate::digest::{flush_digests, schedule_digest};
    use crate::dom::el;

    #[test]
    fn combines_without_duplicates() {
        assert_eq!(combine("btn", &json!("btn primary")), "btn primary");
        assert_eq!(combine("", &json!(["a", null, "b"])), "a b");
        assert_eq!(combine("x", &json!({"on": true, "off": 0})), "x on");
        assert_eq!(combine("x", &Value::Null), "x");
    }

    #[test]
    fn keeps_original_classes() {
        let item = el("li")
            .attr("class", "row")
            .attr("bind-class", "'text-bold': selected, muted: !active")
            .build();
        let root = el("ul").node(item).build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        scope.set("selected", true);
        scope.set("active", true);
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(item.attr("class").as_deref(), Some("row text-bold"));

        scope.set("selected", false);
        scope.set("active", false);
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(item.attr("class").as_deref(), Some("row muted"));
    }
}
