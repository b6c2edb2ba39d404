//! Runtime bootstrapper: bring up one hostfxr context and extract the
//! assembly loader delegate from it.

use std::ffi::c_void;
use std::path::PathBuf;
use std::ptr;

use netinject_shared::{Error, FrameSink, Result};

use crate::hosting::{
    HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER, HOST_ALREADY_INITIALIZED,
    HOST_DIFFERENT_RUNTIME_PROPERTIES, HOST_SUCCESS, HostingApi,
    LoadAssemblyAndGetFunctionPointerFn, RawContext, wide_path,
};

/// How the runtime context is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStrategy {
    /// `hostfxr_initialize_for_runtime_config` with a runtimeconfig.json
    /// path. Accepts the "already initialized / compatible" success codes
    /// in addition to plain success.
    RuntimeConfig(PathBuf),
    /// `hostfxr_initialize_for_dotnet_command_line` simulating a
    /// single-argument command line. Accepts only plain success.
    CommandLine(PathBuf),
}

impl InitStrategy {
    /// Whether the given initialization result counts as success for this
    /// mode.
    pub fn accepts(&self, rc: i32) -> bool {
        match self {
            InitStrategy::RuntimeConfig(_) => matches!(
                rc,
                HOST_SUCCESS | HOST_ALREADY_INITIALIZED | HOST_DIFFERENT_RUNTIME_PROPERTIES
            ),
            InitStrategy::CommandLine(_) => rc == HOST_SUCCESS,
        }
    }
}

/// Scoped wrapper around a live hostfxr context. Guarantees the context is
/// closed exactly once on every exit path.
pub struct HostContext<'a, A: HostingApi> {
    api: &'a A,
    raw: RawContext,
    closed: bool,
}

impl<'a, A: HostingApi> HostContext<'a, A> {
    fn new(api: &'a A, raw: RawContext) -> Self {
        Self {
            api,
            raw,
            closed: raw.is_null(),
        }
    }

    fn raw(&self) -> RawContext {
        self.raw
    }

    /// Close the context now rather than at end of scope.
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.api.close(self.raw);
        }
    }
}

impl<A: HostingApi> Drop for HostContext<'_, A> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Initialize the runtime and extract the generic assembly loader delegate.
///
/// The context is closed before this returns on every path: it is only
/// needed to hand out the delegate.
pub fn obtain_loader_delegate<A: HostingApi, S: FrameSink>(
    api: &A,
    strategy: &InitStrategy,
    sink: &mut S,
) -> Result<LoadAssemblyAndGetFunctionPointerFn> {
    let mut raw: RawContext = ptr::null_mut();
    let rc = match strategy {
        InitStrategy::RuntimeConfig(path) => {
            api.initialize_for_runtime_config(&wide_path(path), &mut raw)
        }
        InitStrategy::CommandLine(path) => api.initialize_for_command_line(&wide_path(path), &mut raw),
    };

    let mut context = HostContext::new(api, raw);
    if !strategy.accepts(rc) || raw.is_null() {
        let err = Error::Initialization {
            code: rc,
            detail: api.last_host_error(),
        };
        sink.send(&err.frame());
        return Err(err);
    }

    let mut delegate: *mut c_void = ptr::null_mut();
    let rc = api.get_runtime_delegate(
        context.raw(),
        HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER,
        &mut delegate,
    );

    // The context has served its purpose either way.
    context.close();

    if rc != HOST_SUCCESS || delegate.is_null() {
        let err = Error::Delegate { code: rc };
        sink.send(&err.frame());
        return Err(err);
    }

    // SAFETY: hostfxr returned this pointer for the delegate kind we asked
    // for; its signature is fixed by the hosting ABI.
    Ok(unsafe { std::mem::transmute::<*mut c_void, LoadAssemblyAndGetFunctionPointerFn>(delegate) })
}
