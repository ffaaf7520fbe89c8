//! `bind-text="expression"`: the element's whole text content.

use super::{Directive, DirectiveOutcome};
use crate::arena::ComponentId;
use crate::dom::NodeId;
use crate::error::DirectiveError;
use crate::shadow;
use crate::value::to_display;
use crate::watcher::watch_node;

pub(crate) struct TextBinding;

impl Directive for TextBinding {
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError> {
        if expression.trim().is_empty() {
            return Err(DirectiveError::InvalidSyntax {
                directive: "bind-text",
                expression: expression.to_owned(),
            });
        }
        let reusable = match node.children().as_slice() {
            [only] if only.is_text() => Some(*only),
            _ => None,
        };
        let text = match reusable {
            Some(text) => text,
            None => {
                for child in node.children() {
                    child.remove();
                }
                let text = NodeId::text("");
                node.append(text);
                text
            }
        };
        shadow::register_text(text, component);
        watch_node(component, Some(text), expression, move |value, _| {
            shadow::stage_text(text, to_display(value));
        });
        Ok(DirectiveOutcome::OWNS_CHILDREN)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use crate::component::create_component;
    use crate::digest::{flush_digests, schedule_digest};
    use crate::dom::el;

    #[test]
    fn renders_expression_as_text() {
        let total = el("span").attr("bind-text", "items.length + ' items'").text("…").build();
        let root = el("div").node(total).build();
        let component = create_component(root, None, Map::new());
        let scope = component.scope().unwrap();
        scope.set("items", json!([1, 2]));
        schedule_digest(Some(component));
        flush_digests();
        assert_eq!(total.text_content(), "2 items");

        scope.list("items").push(3);
        flush_digests();
        assert_eq!(total.text_content(), "3 items");
    }
}
