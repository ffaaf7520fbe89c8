use std::cell::Cell;

use crate::digest::flush_digests;

// Thread-local macro task depth counter
// When > 0, digest requests are only recorded; the outermost task flushes them
thread_local! {
    static TASK_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// RAII guard that ensures the depth is restored even on panic.
///
/// When the outermost task exits normally the pending digests are flushed.
/// During unwinding they stay scheduled for the host's next turn instead.
struct MacroTaskGuard;

impl Drop for MacroTaskGuard {
    fn drop(&mut self) {
        let outermost = TASK_DEPTH.with(|depth| {
            let next = depth.get().saturating_sub(1);
            depth.set(next);
            next == 0
        });
        if outermost && !std::thread::panicking() {
            flush_digests();
        }
    }
}

/// Check if currently inside a macro task.
pub fn is_macro_task_active() -> bool {
    TASK_DEPTH.with(|depth| depth.get() > 0)
}

/// One turn of host work, such as delivering an event.
///
/// Any number of digest requests made while a macro task runs coalesce, and
/// the resulting passes run once the outermost task returns, so the caller
/// observes a fully reconciled UI afterwards.
///
/// # Example
/// ```ignore
/// MacroTask::run(|| {
///     scope.set("first", "Ada");
///     scope.set("last", "Lovelace");
///     schedule_digest(None);
///     schedule_digest(None);
/// }); // one digest pass runs here
/// ```
pub struct MacroTask;

impl MacroTask {
    /// Run a function as a macro task.
    pub fn run<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        TASK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        let _guard = MacroTaskGuard;
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{is_digest_scheduled, schedule_digest};

    #[test]
    fn nested_tasks_flush_only_at_the_outermost_exit() {
        MacroTask::run(|| {
            assert!(is_macro_task_active());
            MacroTask::run(|| schedule_digest(None));
            assert!(is_digest_scheduled());
        });
        assert!(!is_macro_task_active());
        assert!(!is_digest_scheduled());
    }

    #[test]
    fn macro_task_returns_value() {
        assert_eq!(MacroTask::run(|| 42), 42);
    }

    #[test]
    fn depth_is_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            MacroTask::run(|| panic!("handler failed"));
        });
        assert!(result.is_err());
        assert!(!is_macro_task_active());
    }
}
