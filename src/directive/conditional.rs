//! `bind-if="expression"`: render the element only while the expression is
//! truthy.
//!
//! The element is taken out of the tree and kept as a template; a comment
//! marks where it belongs. Each time the condition turns true a fresh copy
//! is inserted after the marker and bound; when it turns false the copy is
//! unbound and removed.

use std::cell::Cell;
use std::rc::Rc;

use super::{Directive, DirectiveOutcome};
use crate::arena::ComponentId;
use crate::component::release_subtree;
use crate::dom::NodeId;
use crate::error::DirectiveError;
use crate::traverse::process_subtree;
use crate::value::is_truthy;
use crate::watcher::watch_node;

pub(crate) struct Conditional;

impl Directive for Conditional {
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError> {
        if expression.trim().is_empty() {
            return Err(DirectiveError::InvalidSyntax {
                directive: "bind-if",
                expression: expression.to_owned(),
            });
        }
        let marker = NodeId::comment(format!(" bind-if: {} ", expression.trim()));
        if !node.insert_before(marker) {
            marker.remove();
            return Err(DirectiveError::Detached { directive: "bind-if" });
        }
        node.detach();
        node.remove_attr("bind-if");
        component.with_binding(marker, |binding| binding.template = Some(node));

        let shown: Rc<Cell<Option<NodeId>>> = Rc::default();
        watch_node(component, Some(marker), expression, move |value, _| {
            match (is_truthy(value), shown.get()) {
                (true, None) => {
                    let Some(instance) = node.deep_clone() else {
                        return;
                    };
                    if !marker.insert_after(instance) {
                        instance.remove();
                        return;
                    }
                    shown.set(Some(instance));
                    tracing::trace!(target: "bindery::directive", ?marker, "bind-if shown");
                    process_subtree(instance, component);
                }
                (false, Some(instance)) => {
                    shown.set(None);
                    tracing::trace!(target: "bindery::directive", ?marker, "bind-if hidden");
                    release_subtree(instance, component);
                }
                _ => {}
            }
        });
        Ok(DirectiveOutcome::OWNS_CHILDREN)
    }
}
