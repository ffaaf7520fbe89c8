//! Digest scheduling and the digest pass.
//!
//! Requests coalesce: any number of [`schedule_digest`] calls before the
//! next [`tick`] produce a single pass. A pass walks the requested component
//! trees (or every tree for a global request), runs their watchers, and
//! finally flushes the shadow state to the nodes.
//!
//! Requests made while a pass runs are kept for the following pass, so a
//! watcher that changes data another watcher reads settles within a few
//! passes. [`flush_digests`] runs passes until nothing is pending, bounded
//! by [`RuntimeConfig::max_digest_passes`](crate::RuntimeConfig::max_digest_passes).
//!
//! # Usage
//!
//! ```ignore
//! scope.set("count", 2);
//! schedule_digest(scope.component());
//! schedule_digest(scope.component()); // coalesced
//!
//! // host loop
//! while let Some(report) = tick() {
//!     tracing::debug!(?report);
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use crate::arena::ComponentId;
use crate::arena::component_arena::live_component_ids;
use crate::component::UpdateStrategy;
use crate::hash::FastIndexSet;
use crate::value::deep_eq;
use crate::watcher::{WatchStats, run_component_watchers};
use crate::{config, executor, shadow};
use serde_json::{Map, Value};

/// What the next pass has to cover.
#[derive(Debug, Default)]
enum PendingDigest {
    #[default]
    Idle,
    Roots(FastIndexSet<ComponentId>),
    Global,
}

impl PendingDigest {
    fn add(&mut self, root: Option<ComponentId>) {
        let Some(root) = root else {
            *self = PendingDigest::Global;
            return;
        };
        match self {
            PendingDigest::Global => cov_mark::hit!(global_digest_absorbs_root),
            PendingDigest::Roots(roots) => {
                roots.insert(root);
            }
            PendingDigest::Idle => {
                let mut roots = FastIndexSet::default();
                roots.insert(root);
                *self = PendingDigest::Roots(roots);
            }
        }
    }

    fn is_idle(&self) -> bool {
        matches!(self, PendingDigest::Idle)
    }
}

thread_local! {
    static DIGEST_SCHEDULED: Cell<bool> = const { Cell::new(false) };
    static PENDING: RefCell<PendingDigest> = RefCell::new(PendingDigest::Idle);
    static IN_PASS: Cell<bool> = const { Cell::new(false) };
}

/// Summary of one digest pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DigestReport {
    /// Watchers evaluated.
    pub watchers_run: usize,
    /// Watchers whose value changed.
    pub changes_detected: usize,
    /// Nodes whose live state differed from the shadow and were marked.
    pub nodes_synced: usize,
    /// Node writes performed by the shadow flush.
    pub nodes_flushed: usize,
    /// Wall time of the pass.
    pub duration: Duration,
}

/// Request a digest of `root` and its descendants, or of every component
/// when `root` is `None`.
///
/// Only the first request after a pass wakes the host (see
/// [`set_wake_hook`](crate::set_wake_hook)); later ones join the pending set.
pub fn schedule_digest(root: Option<ComponentId>) {
    PENDING.with_borrow_mut(|pending| pending.add(root));
    if DIGEST_SCHEDULED.replace(true) {
        cov_mark::hit!(digest_request_coalesced);
        return;
    }
    tracing::trace!(target: "bindery::digest", ?root, "digest scheduled");
    if !IN_PASS.get() {
        executor::notify_host();
    }
}

/// Whether a digest is pending.
pub fn is_digest_scheduled() -> bool {
    DIGEST_SCHEDULED.get()
}

/// Run one digest pass if one is pending.
///
/// Returns `None` when nothing was pending, or when called from inside a
/// running pass (the request stays pending for the pass after).
pub fn tick() -> Option<DigestReport> {
    if !DIGEST_SCHEDULED.get() || IN_PASS.get() {
        return None;
    }
    let target = PENDING.take();
    let report = {
        let _pass = PassGuard::enter();
        run_pass(&target)
    };
    if PENDING.with_borrow(PendingDigest::is_idle) {
        DIGEST_SCHEDULED.set(false);
    } else {
        // requested during the pass; the host gets another turn
        executor::notify_host();
    }
    Some(report)
}

/// Run passes until nothing is pending. Returns the number of passes run.
///
/// Stops after the configured maximum number of passes and logs a warning
/// if watchers keep scheduling each other.
pub fn flush_digests() -> usize {
    let max_passes = config::max_digest_passes();
    let mut passes = 0;
    while passes < max_passes {
        if tick().is_none() {
            break;
        }
        passes += 1;
    }
    if passes == max_passes && is_digest_scheduled() {
        tracing::warn!(target: "bindery::digest", passes, "digest did not settle");
    }
    passes
}

/// Forget every pending request.
pub(crate) fn reset() {
    PENDING.take();
    DIGEST_SCHEDULED.set(false);
}

struct PassGuard;

impl PassGuard {
    fn enter() -> Self {
        IN_PASS.set(true);
        PassGuard
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        IN_PASS.set(false);
    }
}

fn run_pass(target: &PendingDigest) -> DigestReport {
    let started = Instant::now();
    let mut report = DigestReport::default();
    match target {
        PendingDigest::Idle => {}
        PendingDigest::Global => {
            let roots: Vec<ComponentId> = live_component_ids()
                .into_iter()
                .filter(|c| c.parent().is_none_or(|parent| !parent.is_alive()))
                .collect();
            for root in roots {
                digest_root(root, &mut report, false);
            }
        }
        PendingDigest::Roots(roots) => {
            for &root in roots {
                if !root.is_alive() {
                    continue;
                }
                if has_ancestor_in(root, roots) {
                    cov_mark::hit!(digest_root_covered_by_ancestor);
                    continue;
                }
                digest_root(root, &mut report, true);
            }
        }
    }
    report.nodes_flushed = shadow::flush();
    report.duration = started.elapsed();
    tracing::debug!(
        target: "bindery::digest",
        watchers = report.watchers_run,
        changes = report.changes_detected,
        synced = report.nodes_synced,
        flushed = report.nodes_flushed,
        elapsed = ?report.duration,
        "digest pass"
    );
    report
}

fn has_ancestor_in(component: ComponentId, roots: &FastIndexSet<ComponentId>) -> bool {
    let mut current = component.parent();
    while let Some(ancestor) = current {
        if roots.contains(&ancestor) {
            return true;
        }
        current = ancestor.parent();
    }
    false
}

fn digest_root(root: ComponentId, report: &mut DigestReport, sync_parent: bool) {
    report.nodes_synced += shadow::sync(root);
    let stats = update_tree(root);
    report.watchers_run += stats.watchers_run;
    report.changes_detected += stats.changes_detected;
    if sync_parent && stats.changes_detected > 0 {
        if let Some(parent) = root.parent() {
            report.nodes_synced += shadow::sync(parent);
        }
    }
}

/// Update a component and then its children, in order. Children are read
/// after the component's own watchers ran, so instances a repeat created in
/// this pass are included.
fn update_tree(component: ComponentId) -> WatchStats {
    let mut stats = update_component(component);
    for child in component.children() {
        if child.is_alive() {
            stats += update_tree(child);
        }
    }
    stats
}

fn update_component(component: ComponentId) -> WatchStats {
    if !should_update(component) {
        cov_mark::hit!(on_push_component_skipped);
        return WatchStats::default();
    }
    run_component_watchers(component)
}

fn should_update(component: ComponentId) -> bool {
    let Some((strategy, requested)) =
        component.with_mut(|meta| (meta.strategy, std::mem::take(&mut meta.check_requested)))
    else {
        return false;
    };
    if strategy == UpdateStrategy::Default {
        return true;
    }
    let current = capture_inputs(component);
    component
        .with_mut(|meta| {
            let changed = requested
                || meta
                    .previous_inputs
                    .as_ref()
                    .is_none_or(|previous| !deep_eq(previous, &current));
            if changed {
                meta.previous_inputs = Some(current);
            }
            changed
        })
        .unwrap_or(false)
}

/// Snapshot of what an onPush component reads from outside: its declared
/// inputs, plus every watched path whose root name the component's own scope
/// does not define.
fn capture_inputs(component: ComponentId) -> Value {
    let Some((scope, declared, paths)) = component.with(|meta| {
        (
            meta.scope,
            meta.declared_inputs.clone(),
            meta.registry.keys().cloned().collect::<Vec<_>>(),
        )
    }) else {
        return Value::Null;
    };
    let mut snapshot = Map::new();
    for name in declared {
        let value = scope.lookup_path(&name);
        snapshot.insert(name, value);
    }
    for path in paths {
        let root = path.split(['.', '[']).next().unwrap_or_default();
        if root.starts_with('$') || scope.has_own(root) || snapshot.contains_key(&path) {
            continue;
        }
        let value = scope.lookup_path(&path);
        snapshot.insert(path, value);
    }
    Value::Object(snapshot)
}
