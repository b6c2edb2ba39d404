//! Types shared by the hostfxr state machine.
//!
//! The [`HostingApi`] trait is the seam between the bootstrap logic and the
//! resolved hostfxr exports, so the activation sequence can be exercised
//! without a real runtime installation.

use std::ffi::c_void;
use std::path::PathBuf;

use netinject_shared::WorkerArgs;

/// Opaque hostfxr context handle for one initialization session.
pub type RawContext = *mut c_void;

/// Delegate kind identifier for the generic assembly loader
/// (`hdt_load_assembly_and_get_function_pointer`).
pub const HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER: i32 = 5;

/// hostfxr `Success`.
pub const HOST_SUCCESS: i32 = 0;
/// hostfxr `Success_HostAlreadyInitialized`.
pub const HOST_ALREADY_INITIALIZED: i32 = 1;
/// hostfxr `Success_DifferentRuntimeProperties`.
pub const HOST_DIFFERENT_RUNTIME_PROPERTIES: i32 = 2;

/// The generic "load assembly and get function pointer" delegate obtained
/// from a runtime context.
pub type LoadAssemblyAndGetFunctionPointerFn = unsafe extern "system" fn(
    assembly_path: *const u16,
    type_name: *const u16,
    method_name: *const u16,
    delegate_type_name: *const u16,
    reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32;

/// The resolved managed entry point. Declared with the unwinding ABI so a
/// fault crossing back into native code reaches the invoker's catch
/// boundary instead of aborting outright.
pub type ManagedEntryPointFn = unsafe extern "system-unwind" fn(WorkerArgs);

/// How the hosting library is located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFxrLocation {
    /// The directory containing hostfxr.dll is known up front.
    Directory(PathBuf),
    /// Consult the nethost discovery library (in the given directory) for
    /// the hosting library's path first.
    Nethost(PathBuf),
}

/// Resolved hostfxr exports. Implementations own the loaded library and
/// release it when dropped.
pub trait HostingApi {
    /// `hostfxr_initialize_for_runtime_config`. `config_path` is
    /// nul-terminated UTF-16.
    fn initialize_for_runtime_config(&self, config_path: &[u16], context: &mut RawContext) -> i32;

    /// `hostfxr_initialize_for_dotnet_command_line` with a single-element
    /// argv. `argv0` is nul-terminated UTF-16.
    fn initialize_for_command_line(&self, argv0: &[u16], context: &mut RawContext) -> i32;

    /// `hostfxr_get_runtime_delegate`.
    fn get_runtime_delegate(
        &self,
        context: RawContext,
        kind: i32,
        delegate: &mut *mut c_void,
    ) -> i32;

    /// `hostfxr_close`.
    fn close(&self, context: RawContext) -> i32;

    /// Diagnostic text captured from the host's own error writer since the
    /// last call, if any.
    fn last_host_error(&self) -> Option<String> {
        None
    }
}

/// Encode a string as nul-terminated UTF-16 for the hosting ABI.
pub fn wide_str(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Encode a path as nul-terminated UTF-16 for the hosting ABI.
pub fn wide_path(path: &std::path::Path) -> Vec<u16> {
    wide_str(&path.to_string_lossy())
}
