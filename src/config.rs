//! Process-wide runtime configuration.
//!
//! ## Usage
//!
//! ```ignore
//! // Defaults are used until something is installed
//! RuntimeConfig::new()
//!     .event_alias("on-swipe", "swipe")
//!     .max_digest_passes(32)
//!     .install();
//! ```

use std::sync::LazyLock;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::component::UpdateStrategy;

static CONFIG: LazyLock<RwLock<RuntimeConfig>> =
    LazyLock::new(|| RwLock::new(RuntimeConfig::default()));

/// Default upper bound on digest passes run back to back by
/// [`flush_digests`](crate::flush_digests).
pub const DEFAULT_MAX_DIGEST_PASSES: usize = 64;

/// Event attribute aliases recognized out of the box.
pub const DEFAULT_EVENT_ALIASES: [(&str, &str); 16] = [
    ("on-click", "click"),
    ("on-change", "change"),
    ("on-input", "input"),
    ("on-submit", "submit"),
    ("on-blur", "blur"),
    ("on-focus", "focus"),
    ("on-double-click", "dblclick"),
    ("on-middle-click", "auxclick"),
    ("on-right-click", "contextmenu"),
    ("on-keyup", "keyup"),
    ("on-keydown", "keydown"),
    ("on-keypress", "keypress"),
    ("on-mouseover", "mouseover"),
    ("on-mouseout", "mouseout"),
    ("on-mouseenter", "mouseenter"),
    ("on-mouseleave", "mouseleave"),
];

/// Input names a bind function receives from the runtime itself. Caller
/// inputs using one of these names are renamed with a `_` prefix.
pub const RESERVED_INPUTS: [&str; 3] = ["elem", "attrs", "bindings"];

/// Builder for the process-wide runtime configuration.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    event_aliases: IndexMap<String, String>,
    max_digest_passes: usize,
    reserved_prefix: char,
    default_strategy: UpdateStrategy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeConfig {
    /// Create a configuration holding the defaults.
    pub fn new() -> Self {
        Self {
            event_aliases: DEFAULT_EVENT_ALIASES
                .iter()
                .map(|(attr, event)| ((*attr).to_owned(), (*event).to_owned()))
                .collect(),
            max_digest_passes: DEFAULT_MAX_DIGEST_PASSES,
            reserved_prefix: '$',
            default_strategy: UpdateStrategy::Default,
        }
    }

    /// Map an attribute name (e.g. `on-swipe`) to a host event name.
    pub fn event_alias(mut self, attribute: impl Into<String>, event: impl Into<String>) -> Self {
        self.event_aliases.insert(attribute.into(), event.into());
        self
    }

    /// Bound the number of passes a single flush runs before giving up.
    ///
    /// A value of zero is treated as one.
    pub fn max_digest_passes(mut self, passes: usize) -> Self {
        self.max_digest_passes = passes.max(1);
        self
    }

    /// Keys starting with this character are skipped when iterating objects.
    pub fn reserved_prefix(mut self, prefix: char) -> Self {
        self.reserved_prefix = prefix;
        self
    }

    /// Strategy used by components without a `bind-strategy` attribute.
    pub fn default_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Replace the process-wide configuration.
    pub fn install(self) {
        tracing::debug!(
            target: "bindery::config",
            aliases = self.event_aliases.len(),
            max_digest_passes = self.max_digest_passes,
            "installing runtime configuration"
        );
        *CONFIG.write() = self;
    }

    /// A copy of the configuration currently installed.
    pub fn current() -> Self {
        CONFIG.read().clone()
    }
}

pub(crate) fn event_for_attribute(attribute: &str) -> Option<String> {
    CONFIG.read().event_aliases.get(attribute).cloned()
}

pub(crate) fn max_digest_passes() -> usize {
    CONFIG.read().max_digest_passes
}

pub(crate) fn reserved_prefix() -> char {
    CONFIG.read().reserved_prefix
}

pub(crate) fn default_strategy() -> UpdateStrategy {
    CONFIG.read().default_strategy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_builtin_aliases() {
        let config = RuntimeConfig::new();
        assert_eq!(config.event_aliases.len(), DEFAULT_EVENT_ALIASES.len());
        assert_eq!(config.event_aliases["on-double-click"], "dblclick");
        assert_eq!(config.event_aliases["on-right-click"], "contextmenu");
        assert_eq!(config.reserved_prefix, '$');
    }

    #[test]
    fn builder_overrides() {
        let config = RuntimeConfig::new()
            .event_alias("on-click", "pointerdown")
            .max_digest_passes(0)
            .reserved_prefix('_');
        assert_eq!(config.event_aliases["on-click"], "pointerdown");
        assert_eq!(config.max_digest_passes, 1);
        assert_eq!(config.reserved_prefix, '_');
    }

    #[test]
    fn installed_aliases_are_visible_to_lookup() {
        RuntimeConfig::current()
            .event_alias("on-config-test-tap", "tap")
            .install();
        assert_eq!(event_for_attribute("on-config-test-tap").as_deref(), Some("tap"));
        assert_eq!(event_for_attribute("on-click").as_deref(), Some("click"));
        assert_eq!(event_for_attribute("bind-if"), None);
    }
}
