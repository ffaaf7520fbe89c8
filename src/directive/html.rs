//! `bind-html="markup"`: host markup as the element's content.

use serde_json::Value;

use super::{Directive, DirectiveOutcome};
use crate::arena::ComponentId;
use crate::dom::NodeId;
use crate::error::DirectiveError;
use crate::value::to_display;
use crate::watcher::watch_node;

pub(crate) struct HtmlBinding;

impl Directive for HtmlBinding {
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError> {
        if expression.trim().is_empty() {
            return Err(DirectiveError::InvalidSyntax {
                directive: "bind-html",
                expression: expression.to_owned(),
            });
        }
        component.with_binding(node, |binding| {
            binding.managed.insert("innerHTML".to_owned());
        });
        watch_node(component, Some(node), expression, move |value, _| {
            let markup = match value {
                Value::Null => String::new(),
                other => to_display(other),
            };
            if node.inner_html().as_deref() != Some(markup.as_str()) {
                node.set_inner_html(markup);
            }
        });
        Ok(DirectiveOutcome::OWNS_CHILDREN)
    }
}
