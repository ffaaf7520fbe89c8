//! `bind-attr="{ disabled: busy, title: hint }"`: attributes from expressions.

use serde_json::Value;

use super::{Directive, DirectiveOutcome};
use crate::arena::ComponentId;
use crate::dom::NodeId;
use crate::error::DirectiveError;
use crate::expression::{ExpressionShape, classify};
use crate::watcher::watch_node;

pub(crate) struct AttrBinding;

impl Directive for AttrBinding {
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError> {
        match classify(expression) {
            ExpressionShape::Object(pairs) => {
                for pair in pairs {
                    let attribute = pair.key;
                    watch_node(component, Some(node), &pair.expression, move |value, _| {
                        component.update_property(node, &attribute, value);
                    });
                }
            }
            ExpressionShape::Simple(source) | ExpressionShape::Ternary(source) => {
                if source.is_empty() {
                    return Err(DirectiveError::InvalidSyntax {
                        directive: "bind-attr",
                        expression: expression.to_owned(),
                    });
                }
                tracing::debug!(target: "bindery::directive", expression, "bind-attr without pairs, expecting an object");
                watch_node(component, Some(node), &source, move |value, old| {
                    let Value::Object(attributes) = value else {
                        return;
                    };
                    for (name, entry) in attributes {
                        component.update_property(node, name, entry);
                    }
                    // attributes the object no longer names are removed
                    if let Value::Object(previous) = old {
                        for name in previous.keys().filter(|name| !attributes.contains_key(*name)) {
                            component.update_property(node, name, &Value::Null);
                        }
                    }
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
    fn pairs_drive_attributes() {
        let button = el("button").attr("bind-attr", "{ disabled: busy, title: 'Save ' + name }").build();
        let root = el("div").node(button).build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        scope.set("busy", true);
        scope.set("name", "draft");
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(button.attr("disabled").as_deref(), Some(""));
        assert_eq!(button.attr("title").as_deref(), Some("Save draft"));

        scope.set("busy", false);
        schedule_digest(Some(component));
        flush_digests();
        assert!(!button.has_attr("disabled"));
    }

    #[test]
    fn object_expression_adds_and_removes() {
        let link = el("a").attr("bind-attr", "attrs").build();
        let root = el("div").node(link).build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        scope.set("attrs", json!({"href": "/a", "target": "_blank"}));
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(link.attr("target").as_deref(), Some("_blank"));

        scope.set("attrs", json!({"href": "/b"}));
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(link.attr("href").as_deref(), Some("/b"));
        assert!(!link.has_attr("target"));
    }
}
