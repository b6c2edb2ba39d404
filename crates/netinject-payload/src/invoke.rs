//! Entry invoker: call the managed entry point once and contain anything
//! that escapes it.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use netinject_shared::{Error, FrameSink, Result, WorkerArgs};

use crate::hosting::ManagedEntryPointFn;

/// Hook for extracting detail from a fault that crossed the managed
/// boundary. The default extracts nothing, matching the current contract
/// that no detail is available there; a richer strategy can be plugged in
/// if the managed side ever starts attaching one.
pub trait FaultDetail {
    fn describe(&self, fault: &(dyn Any + Send)) -> Option<String>;
}

/// The documented no-detail boundary.
pub struct NoDetail;

impl FaultDetail for NoDetail {
    fn describe(&self, _fault: &(dyn Any + Send)) -> Option<String> {
        None
    }
}

/// Invoke the entry point exactly once with the argument block. A fault
/// unwinding back into native code is caught here, reported as a generic
/// execution failure, and never re-thrown.
pub fn invoke_entry<S: FrameSink>(
    entry: ManagedEntryPointFn,
    args: WorkerArgs,
    detail: &dyn FaultDetail,
    sink: &mut S,
) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| unsafe { entry(args) })) {
        Ok(()) => Ok(()),
        Err(fault) => {
            let err = Error::Execution;
            let mut frame = err.frame();
            if let Some(text) = detail.describe(fault.as_ref()) {
                frame.message = format!("{}: {}", frame.message, text);
            }
            sink.send(&frame);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ENTRY_CALLS, empty_args, entry_ok, entry_panics};
    use netinject_shared::error::EXECUTION_FAILURE_CODE;
    use netinject_shared::frame::VecSink;
    use std::sync::atomic::Ordering;

    #[test]
    fn successful_entry_writes_nothing() {
        let mut sink = VecSink::default();
        let before = ENTRY_CALLS.load(Ordering::SeqCst);

        invoke_entry(entry_ok, empty_args(), &NoDetail, &mut sink).unwrap();

        assert_eq!(ENTRY_CALLS.load(Ordering::SeqCst), before + 1);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn fault_is_contained_and_reported_generically() {
        let mut sink = VecSink::default();
        let err = invoke_entry(entry_panics, empty_args(), &NoDetail, &mut sink).unwrap_err();

        assert!(matches!(err, Error::Execution));
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].code, EXECUTION_FAILURE_CODE);
        // The panic payload text must not leak through the default boundary.
        assert!(!sink.frames[0].message.contains("blew up"));
    }

    #[test]
    fn detail_hook_can_enrich_the_frame() {
        struct PanicText;
        impl FaultDetail for PanicText {
            fn describe(&self, fault: &(dyn Any + Send)) -> Option<String> {
                fault.downcast_ref::<&str>().map(|s| s.to_string())
            }
        }

        let mut sink = VecSink::default();
        invoke_entry(entry_panics, empty_args(), &PanicText, &mut sink).unwrap_err();

        assert!(sink.frames[0].message.contains("blew up"));
    }
}
