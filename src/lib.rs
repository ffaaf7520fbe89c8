#![deny(missing_docs)]

//! Declarative two-way data binding over a host UI tree.
//!
//! Components attach to elements marked `bind-function`. Each owns a scope of
//! plain JSON data; templates read it through `{{ }}` interpolation and
//! `bind-*` directives, and event attributes (`on-click="count = count + 1"`)
//! write to it. Changes are picked up by dirty checking: a digest re-evaluates
//! the watchers of the affected components, and bindings stage what their
//! nodes should show in a shadow copy that is written out once per pass.
//!
//! # Quick Start
//!
//! ```ignore
//! use bindery::{el, flush_digests, register_bind_fn, start};
//!
//! register_bind_fn("counter", |scope, _| {
//!     scope.set("count", 0);
//! });
//!
//! let button = el("button").attr("on-click", "count = count + 1").text("+").build();
//! let root = el("div")
//!     .attr("bind-function", "counter")
//!     .child(el("span").text("Clicked {{count}} times"))
//!     .node(button)
//!     .build();
//!
//! start(root);
//! flush_digests();
//!
//! // events are delivered in a macro task that digests when it ends
//! button.emit("click");
//! assert_eq!(root.text_content(), "Clicked 1 times+");
//! ```
//!
//! # Core Types
//!
//! - [`NodeId`] - A node of the host tree. Build trees with [`el`].
//! - [`ComponentId`] - A bound component: root node, scope, watchers.
//! - [`Scope`] - Component data and functions, chained to the parent's.
//! - [`WatchHandle`] - A watcher on an expression, see [`watch`].
//!
//! # Digests
//!
//! ```ignore
//! scope.set("user", json!({"name": "Ada"}));
//! schedule_digest(Some(component));   // or scope.refresh()
//! flush_digests();                    // run until nothing is pending
//!
//! set_wake_hook(|| host.post(tick));  // let the host drive digests
//! ```
//!
//! Requests coalesce: while a digest is pending, further requests for the
//! same components (or their descendants) add nothing. A request for every
//! root absorbs the rest.
//!
//! # Directives
//!
//! ```text
//! <input type="text" bind="user.name">
//! <p bind-if="user.admin">Admin</p>
//! <li bind-repeat="item, i in items" sort="name: 1">{{i}}. {{item.name}}</li>
//! <div bind-class="{active: selected == id}" bind-style="color: tint"></div>
//! <section bind-component="'user-card'" data="{user: current}"></section>
//! ```
//!
//! Custom behavior is added with [`register_directive`].

// Internal modules
pub(crate) mod arena;
mod batch;
mod bindings;
mod component;
mod config;
mod digest;
mod directive;
mod dom;
mod error;
mod executor;
mod hash;
mod scope;
mod traverse;
mod watcher;

// Helper modules
pub mod expression;
pub mod shadow;
pub mod value;

// Core types
pub use arena::{ComponentId, ScopeFn, WatchCallback};
pub use component::{BindContext, BindFn, UpdateStrategy};
pub use dom::{ControlKind, ControlState, ElementBuilder, Event, ListenerId, NodeId};
pub use scope::{ObservedList, Scope};
pub use watcher::{WatchHandle, WatchStats};

// Key functions
pub use component::{
    bind_fn, component_for_node, create_component, live_components, register_bind_fn, start, teardown,
};
pub use dom::{el, node_count};
pub use watcher::watch;

// Digest cycle
pub use batch::{MacroTask, is_macro_task_active};
pub use digest::{DigestReport, flush_digests, is_digest_scheduled, schedule_digest, tick};
pub use executor::{clear_wake_hook, set_wake_hook};

// Directives
pub use directive::{
    Directive, DirectiveOutcome, TemplateSource, clear_template_source, directive_names, register_directive,
    set_template_source,
};

// Configuration and errors
pub use config::{DEFAULT_EVENT_ALIASES, DEFAULT_MAX_DIGEST_PASSES, RESERVED_INPUTS, RuntimeConfig};
pub use error::{DirectiveError, ExprError};
