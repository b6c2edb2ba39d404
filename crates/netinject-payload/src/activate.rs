//! Assembly activator: load the worker assembly and resolve its entry
//! point through the generic loader delegate.

use std::ffi::c_void;
use std::path::Path;
use std::ptr;

use netinject_shared::{Error, FrameSink, Result};

use crate::hosting::{
    HOST_SUCCESS, LoadAssemblyAndGetFunctionPointerFn, ManagedEntryPointFn, wide_path, wide_str,
};

/// Fully-qualified type name holding the managed entry point. Part of the
/// contract with the managed side, never derived from the argument block.
pub const WORKER_TYPE_NAME: &str = "NetInject.Worker, NetInject";

/// Method resolved on [`WORKER_TYPE_NAME`].
pub const WORKER_METHOD_NAME: &str = "Main";

/// Marker passed as the delegate type name: the method is declared
/// UnmanagedCallersOnly and gets no marshalling wrapper.
const UNMANAGED_CALLERS_ONLY_METHOD: isize = -1;

/// Load `assembly_path` into the runtime and resolve the fixed worker
/// entry point inside it.
pub fn resolve_entry_point<S: FrameSink>(
    loader: LoadAssemblyAndGetFunctionPointerFn,
    assembly_path: &Path,
    sink: &mut S,
) -> Result<ManagedEntryPointFn> {
    let assembly = wide_path(assembly_path);
    let type_name = wide_str(WORKER_TYPE_NAME);
    let method_name = wide_str(WORKER_METHOD_NAME);

    let mut entry: *mut c_void = ptr::null_mut();
    let rc = unsafe {
        loader(
            assembly.as_ptr(),
            type_name.as_ptr(),
            method_name.as_ptr(),
            UNMANAGED_CALLERS_ONLY_METHOD as *const u16,
            ptr::null_mut(),
            &mut entry,
        )
    };

    if rc != HOST_SUCCESS || entry.is_null() {
        let err = Error::Activation { code: rc };
        sink.send(&err.frame());
        return Err(err);
    }

    // SAFETY: the delegate resolved this pointer for an
    // UnmanagedCallersOnly method with the worker's fixed signature.
    Ok(unsafe { std::mem::transmute::<*mut c_void, ManagedEntryPointFn>(entry) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{entry_ok, loader_missing_assembly, loader_null_entry, loader_ok};
    use netinject_shared::frame::VecSink;

    #[test]
    fn resolves_entry_through_delegate() {
        let mut sink = VecSink::default();
        let entry = resolve_entry_point(loader_ok, Path::new("NetInject.dll"), &mut sink).unwrap();
        assert_eq!(entry as usize, entry_ok as usize);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn missing_assembly_reports_rc() {
        let mut sink = VecSink::default();
        let err = resolve_entry_point(loader_missing_assembly, Path::new("gone.dll"), &mut sink)
            .unwrap_err();

        assert_eq!(err.status(), 4);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].code, 0x80070002u32 as i32);
        assert!(sink.frames[0].message.contains("entry point"));
    }

    #[test]
    fn null_entry_with_ok_rc_is_still_a_failure() {
        let mut sink = VecSink::default();
        let err =
            resolve_entry_point(loader_null_entry, Path::new("NetInject.dll"), &mut sink).unwrap_err();

        assert!(matches!(err, Error::Activation { code: 0 }));
        assert_eq!(sink.frames.len(), 1);
    }
}
