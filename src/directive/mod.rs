//! Directives: attributes with behavior.
//!
//! Every directive is registered under its attribute name. When the
//! traversal meets a registered attribute it hands the node, the attribute
//! value and the owning component to the directive, which typically installs
//! watchers through the component. A directive that takes over its node's
//! children (`bind-html`, `bind-if`, ...) says so in its outcome and the
//! traversal does not descend.
//!
//! Built-ins: `bind`, `bind-attr`, `bind-class`, `bind-style`, `bind-html`,
//! `bind-text`, `bind-if`, `bind-repeat` and `bind-component`.
//!
//! # Usage
//!
//! ```ignore
//! struct Autofocus;
//!
//! impl Directive for Autofocus {
//!     fn process(&self, node: NodeId, _: &str, _: ComponentId) -> Result<DirectiveOutcome, DirectiveError> {
//!         node.set_attr("data-focus", "true");
//!         Ok(DirectiveOutcome::APPLIED)
//!     }
//! }
//!
//! register_directive("bind-autofocus", Autofocus);
//! ```

mod attr;
mod class;
mod conditional;
mod html;
mod model;
mod repeat;
mod style;
mod template;
mod text;

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use crate::arena::ComponentId;
use crate::dom::NodeId;
use crate::error::DirectiveError;
use crate::hash::FastIndexMap;

pub use template::{TemplateSource, clear_template_source, set_template_source};

/// Result of setting a directive up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectiveOutcome {
    /// Whether the directive took effect.
    pub success: bool,
    /// Whether the directive owns the node's children.
    pub skip_children: bool,
}

impl DirectiveOutcome {
    /// Applied; the traversal continues into the children.
    pub const APPLIED: Self = Self {
        success: true,
        skip_children: false,
    };

    /// Applied; the directive manages the children itself.
    pub const OWNS_CHILDREN: Self = Self {
        success: true,
        skip_children: true,
    };

    /// Not applied.
    pub const FAILED: Self = Self {
        success: false,
        skip_children: false,
    };
}

/// Behavior attached to an attribute name.
pub trait Directive {
    /// Set the directive up on `node` for `component`. `expression` is the
    /// attribute value.
    fn process(
        &self,
        node: NodeId,
        expression: &str,
        component: ComponentId,
    ) -> Result<DirectiveOutcome, DirectiveError>;
}

thread_local! {
    static DIRECTIVES: RefCell<FastIndexMap<String, Rc<dyn Directive>>> = RefCell::new(builtin_directives());
}

fn builtin_directives() -> FastIndexMap<String, Rc<dyn Directive>> {
    let builtins: [(&str, Rc<dyn Directive>); 9] = [
        ("bind", Rc::new(model::TwoWayBinding)),
        ("bind-attr", Rc::new(attr::AttrBinding)),
        ("bind-class", Rc::new(class::ClassBinding)),
        ("bind-style", Rc::new(style::StyleBinding)),
        ("bind-html", Rc::new(html::HtmlBinding)),
        ("bind-text", Rc::new(text::TextBinding)),
        ("bind-if", Rc::new(conditional::Conditional)),
        ("bind-repeat", Rc::new(repeat::Repeat)),
        ("bind-component", Rc::new(template::ComponentLoader)),
    ];
    builtins
        .into_iter()
        .map(|(name, directive)| (name.to_owned(), directive))
        .collect()
}

/// Register a directive under an attribute name, replacing any directive of
/// that name (built-ins included).
pub fn register_directive<D>(name: &str, directive: D)
where
    D: Directive + 'static,
{
    let directive: Rc<dyn Directive> = Rc::new(directive);
    let previous = DIRECTIVES.with_borrow_mut(|directives| directives.insert(name.to_owned(), directive));
    if previous.is_some() {
        tracing::debug!(target: "bindery::directive", name, "directive replaced");
    }
}

/// Names of every registered directive.
pub fn directive_names() -> Vec<String> {
    DIRECTIVES.with_borrow(|directives| directives.keys().cloned().collect())
}

pub(crate) fn is_registered(name: &str) -> bool {
    DIRECTIVES.with_borrow(|directives| directives.contains_key(name))
}

/// Run the directive registered as `name`. Errors and panics are logged and
/// reported as [`DirectiveOutcome::FAILED`].
pub(crate) fn dispatch(
    name: &str,
    node: NodeId,
    expression: &str,
    component: ComponentId,
) -> DirectiveOutcome {
    let Some(directive) = DIRECTIVES.with_borrow(|directives| directives.get(name).cloned()) else {
        return DirectiveOutcome::FAILED;
    };
    match catch_unwind(AssertUnwindSafe(|| directive.process(node, expression, component))) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(error)) => {
            tracing::warn!(target: "bindery::directive", directive = name, expression, %error, "directive failed");
            DirectiveOutcome::FAILED
        }
        Err(_) => {
            tracing::error!(target: "bindery::directive", directive = name, expression, "directive panicked");
            DirectiveOutcome::FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::Map;

    use super::*;
    use crate::component::create_component;
    use crate::dom::el;

    struct Marker(Rc<Cell<usize>>);

    impl Directive for Marker {
        fn process(
            &self,
            node: NodeId,
            expression: &str,
            _: ComponentId,
        ) -> Result<DirectiveOutcome, DirectiveError> {
            self.0.set(self.0.get() + 1);
            node.set_attr("data-marked", expression);
            Ok(DirectiveOutcome::OWNS_CHILDREN)
        }
    }

    struct Broken;

    impl Directive for Broken {
        fn process(&self, _: NodeId, _: &str, _: ComponentId) -> Result<DirectiveOutcome, DirectiveError> {
            panic!("setup failed");
        }
    }

    #[test]
    fn builtins_are_registered() {
        let names = directive_names();
        for name in ["bind", "bind-if", "bind-repeat", "bind-component"] {
            assert!(names.iter().any(|n| n == name), "{name}");
        }
    }

    #[test]
    fn custom_directive_can_own_children() {
        let calls = Rc::new(Cell::new(0));
        register_directive("bind-mark", Marker(calls.clone()));
        let inner = el("span").text("{{never}}").build();
        let root = el("div")
            .child(el("p").attr("bind-mark", "yes").node(inner))
            .build();
        let component = create_component(root, None, Map::new());
        assert_eq!(calls.get(), 1);
        assert_eq!(root.child_elements()[0].attr("data-marked").as_deref(), Some("yes"));
        assert_eq!(component.watcher_count(), 0);
    }

    #[test]
    fn panicking_directive_is_contained() {
        register_directive("bind-broken", Broken);
        let root = el("div").child(el("p").attr("bind-broken", "x")).build();
        let component = create_component(root, None, Map::new());
        assert!(component.is_alive());
    }
}
