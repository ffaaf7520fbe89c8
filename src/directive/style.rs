//! `bind-style="{ color: tone, width: size + 'px' }"`: inline styles.

use serde_json::{Map, Value};

use super::{Directive, DirectiveOutcome};
use crate::arena::ComponentId;
use crate::dom::NodeId;
use crate::error::DirectiveError;
use crate::expression::{ExpressionShape, classify};
use crate::watcher::watch_node;

pub(crate) struct StyleBinding;

impl Directive for StyleBinding {
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError> {
        match classify(expression) {
            ExpressionShape::Object(pairs) => {
                for pair in pairs {
                    let property = pair.key;
                    watch_node(component, Some(node), &pair.expression, move |value, _| {
                        let mut style = Map::new();
                        style.insert(property.clone(), value.clone());
                        component.update_property(node, "style", &Value::Object(style));
                    });
                }
            }
            ExpressionShape::Simple(source) | ExpressionShape::Ternary(source) => {
                if source.is_empty() {
                    return Err(DirectiveError::InvalidSyntax {
                        directive: "bind-style",
                        expression: expression.to_owned(),
                    });
                }
                watch_node(component, Some(node), &source, move |value, old| {
                    let mut style = match value {
                        Value::Object(map) => map.clone(),
                        _ => Map::new(),
                    };
                    // properties the new value no longer sets are cleared
                    if let Value::Object(previous) = old {
                        for name in previous.keys() {
                            style.entry(name.clone()).or_insert(Value::Null);
                        }
                    }
                    component.update_property(node, "style", &Value::Object(style));
                });
            }
        }
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
    fn pairs_set_and_clear_properties() {
        let bar = el("div").attr("bind-style", "{ width: pct + '%', color: tone }").build();
        let root = el("div").node(bar).build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        scope.set("pct", 40);
        scope.set("tone", "green");
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(bar.style("width").as_deref(), Some("40%"));
        assert_eq!(bar.style("color").as_deref(), Some("green"));

        scope.set("tone", json!(null));
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(bar.style("color"), None);
    }

    #[test]
    fn object_expression_replaces_properties() {
        let node = el("div").attr("bind-style", "look").build();
        let root = el("div").node(node).build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        scope.set("look", json!({"color": "red", "margin": "2px"}));
        schedule_digest(Some(component));
        flush_digests();
        scope.set("look", json!({"color": "blue"}));
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(node.style("color").as_deref(), Some("blue"));
        assert_eq!(node.style("margin"), None);
    }
}
