//! Panic containment shared by the dispatch boundary and the panic hook.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

thread_local! {
    static CONTAINED: Cell<bool> = const { Cell::new(false) };
}

/// Runs `f`, turning a panic into the text of its payload.
///
/// While `f` runs, [`is_contained`] reports `true` on this thread so the
/// process-wide hook can tell a recovered panic from a fatal one.
pub(crate) fn contain<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    let outer = CONTAINED.replace(true);
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    CONTAINED.set(outer);
    outcome.map_err(|payload| payload_message(payload.as_ref()).to_owned())
}

/// Whether the current thread is running inside [`contain`].
pub(crate) fn is_contained() -> bool {
    CONTAINED.get()
}

/// Text carried by a panic payload.
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
