//! Waking the host when digest work appears.
//!
//! Digests run on the thread that owns the component tree, at a moment the
//! host chooses. The host installs a wake hook; the runtime calls it once per
//! idle-to-scheduled transition, and the host answers by calling
//! [`tick`](crate::tick) or [`flush_digests`](crate::flush_digests) on its
//! next turn.
//!
//! ## Usage
//!
//! ```ignore
//! // an event loop with a task queue
//! let queue = queue.clone();
//! set_wake_hook(move || queue.post(|| { flush_digests(); }));
//!
//! // or, for tests and synchronous hosts, no hook at all:
//! scope.set("count", 1);
//! schedule_digest(None);
//! flush_digests();
//! ```
//!
//! Events delivered through [`NodeId::dispatch`](crate::NodeId::dispatch)
//! flush on their own when the macro task ends, so the hook only matters for
//! changes made outside of event delivery.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

thread_local! {
    static WAKE_HOOK: RefCell<Option<Rc<dyn Fn()>>> = const { RefCell::new(None) };
}

/// Install the function called when a digest becomes pending.
///
/// Replaces any previous hook. The hook should not run the digest
/// synchronously; it schedules it with the host.
pub fn set_wake_hook<F>(hook: F)
where
    F: Fn() + 'static,
{
    WAKE_HOOK.with_borrow_mut(|slot| *slot = Some(Rc::new(hook)));
}

/// Remove the wake hook.
pub fn clear_wake_hook() {
    let previous = WAKE_HOOK.with_borrow_mut(Option::take);
    drop(previous);
}

/// Call the wake hook, if any. Skipped while a macro task is running, since
/// the task flushes when it ends.
pub(crate) fn notify_host() {
    if crate::batch::is_macro_task_active() {
        return;
    }
    let Some(hook) = WAKE_HOOK.with_borrow(Clone::clone) else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
        tracing::error!(target: "bindery::digest", "wake hook panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::batch::MacroTask;
    use crate::digest::{flush_digests, schedule_digest};

    #[test]
    fn hook_fires_once_per_idle_transition() {
        let wakes = Rc::new(Cell::new(0));
        let counter = wakes.clone();
        set_wake_hook(move || counter.set(counter.get() + 1));

        schedule_digest(None);
        schedule_digest(None);
        assert_eq!(wakes.get(), 1);

        flush_digests();
        schedule_digest(None);
        assert_eq!(wakes.get(), 2);
        flush_digests();
        clear_wake_hook();
    }

    #[test]
    fn macro_task_suppresses_the_hook() {
        let wakes = Rc::new(Cell::new(0));
        let counter = wakes.clone();
        set_wake_hook(move || counter.set(counter.get() + 1));
        MacroTask::run(|| schedule_digest(None));
        assert_eq!(wakes.get(), 0);
        clear_wake_hook();
    }
}
