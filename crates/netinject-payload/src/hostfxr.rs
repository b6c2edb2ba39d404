//! Runtime library loader: load hostfxr.dll and resolve its exports.
//!
//! Resolution is all-or-nothing: a missing export fails the whole load and
//! nothing partial is ever handed out.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use netinject_shared::{Error, FrameSink, Result};
use windows::Win32::Foundation::{FreeLibrary, HMODULE};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows::core::{PCSTR, PCWSTR, s};

use crate::hosting::{HostFxrLocation, HostingApi, RawContext, wide_path};

/// Windows name of the hosting library.
const HOSTFXR_DLL: &str = "hostfxr.dll";
/// Windows name of the discovery library for the two-stage variant.
const NETHOST_DLL: &str = "nethost.dll";

/// nethost `HostApiBufferTooSmall`.
const HOST_API_BUFFER_TOO_SMALL: i32 = 0x80008098u32 as i32;

type InitializeForRuntimeConfigFn =
    unsafe extern "system" fn(*const u16, *const c_void, *mut RawContext) -> i32;
type InitializeForCommandLineFn =
    unsafe extern "system" fn(i32, *const *const u16, *const c_void, *mut RawContext) -> i32;
type GetRuntimeDelegateFn = unsafe extern "system" fn(RawContext, i32, *mut *mut c_void) -> i32;
type CloseFn = unsafe extern "system" fn(RawContext) -> i32;
type ErrorWriterFn = unsafe extern "system" fn(*const u16);
type SetErrorWriterFn = unsafe extern "system" fn(Option<ErrorWriterFn>) -> Option<ErrorWriterFn>;
type GetHostFxrPathFn = unsafe extern "system" fn(*mut u16, *mut usize, *const c_void) -> i32;

/// Text captured from hostfxr's own error writer, used to enrich
/// initialization failures. Write-mostly from the single bootstrap thread.
static LAST_HOST_ERROR: Mutex<Option<String>> = Mutex::new(None);

unsafe extern "system" fn capture_host_error(message: *const u16) {
    if message.is_null() {
        return;
    }
    let len = unsafe { (0..).take_while(|&i| *message.add(i) != 0).count() };
    let text = unsafe { String::from_utf16_lossy(std::slice::from_raw_parts(message, len)) };
    if let Ok(mut slot) = LAST_HOST_ERROR.lock() {
        *slot = Some(text);
    }
}

/// Owned hostfxr library handle plus its resolved exports.
pub struct HostFxr {
    module: HMODULE,
    init_config: InitializeForRuntimeConfigFn,
    init_command_line: InitializeForCommandLineFn,
    get_delegate: GetRuntimeDelegateFn,
    close: CloseFn,
}

// SAFETY: the resolved function pointers stay valid for as long as the
// module handle is held, and hostfxr's hosting entry points are callable
// from any thread.
unsafe impl Send for HostFxr {}

impl HostFxr {
    /// Load the hosting library per `location` and resolve the required
    /// export list. Reports its own failure over `sink`.
    pub fn load<S: FrameSink>(location: &HostFxrLocation, sink: &mut S) -> Result<Self> {
        match Self::load_inner(location) {
            Ok(api) => Ok(api),
            Err(err) => {
                sink.send(&err.frame());
                Err(err)
            }
        }
    }

    fn load_inner(location: &HostFxrLocation) -> Result<Self> {
        let hostfxr_path = match location {
            HostFxrLocation::Directory(dir) => dir.join(HOSTFXR_DLL),
            HostFxrLocation::Nethost(dir) => discover_hostfxr(dir)?,
        };

        let module = load_library(&hostfxr_path)?;
        let library = OwnedModule(module);

        // Required exports, resolved in a fixed order. The table is only
        // assembled once every one of them resolved.
        let init_config: InitializeForRuntimeConfigFn =
            unsafe { export(module, s!("hostfxr_initialize_for_runtime_config"), "hostfxr_initialize_for_runtime_config")? };
        let init_command_line: InitializeForCommandLineFn =
            unsafe { export(module, s!("hostfxr_initialize_for_dotnet_command_line"), "hostfxr_initialize_for_dotnet_command_line")? };
        let get_delegate: GetRuntimeDelegateFn =
            unsafe { export(module, s!("hostfxr_get_runtime_delegate"), "hostfxr_get_runtime_delegate")? };
        let set_error_writer: SetErrorWriterFn =
            unsafe { export(module, s!("hostfxr_set_error_writer"), "hostfxr_set_error_writer")? };
        let close: CloseFn = unsafe { export(module, s!("hostfxr_close"), "hostfxr_close")? };

        unsafe { set_error_writer(Some(capture_host_error)) };

        std::mem::forget(library);
        Ok(Self {
            module,
            init_config,
            init_command_line,
            get_delegate,
            close,
        })
    }
}

impl HostingApi for HostFxr {
    fn initialize_for_runtime_config(&self, config_path: &[u16], context: &mut RawContext) -> i32 {
        unsafe { (self.init_config)(config_path.as_ptr(), std::ptr::null(), context) }
    }

    fn initialize_for_command_line(&self, argv0: &[u16], context: &mut RawContext) -> i32 {
        let argv = [argv0.as_ptr()];
        unsafe { (self.init_command_line)(1, argv.as_ptr(), std::ptr::null(), context) }
    }

    fn get_runtime_delegate(
        &self,
        context: RawContext,
        kind: i32,
        delegate: &mut *mut c_void,
    ) -> i32 {
        unsafe { (self.get_delegate)(context, kind, delegate) }
    }

    fn close(&self, context: RawContext) -> i32 {
        unsafe { (self.close)(context) }
    }

    fn last_host_error(&self) -> Option<String> {
        LAST_HOST_ERROR.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl Drop for HostFxr {
    fn drop(&mut self) {
        unsafe {
            let _ = FreeLibrary(self.module);
        }
    }
}

/// Library handle that frees itself on drop, for the resolution window
/// before `HostFxr` takes ownership.
struct OwnedModule(HMODULE);

impl Drop for OwnedModule {
    fn drop(&mut self) {
        unsafe {
            let _ = FreeLibrary(self.0);
        }
    }
}

fn load_library(path: &Path) -> Result<HMODULE> {
    let wide = wide_path(path);
    unsafe { LoadLibraryW(PCWSTR(wide.as_ptr())) }.map_err(|e| Error::LibraryLoad {
        path: path.display().to_string(),
        code: e.code().0,
    })
}

/// Resolve one export, capturing the last-error code when it is missing.
///
/// # Safety
/// `T` must be the extern fn type matching the named export's actual ABI.
unsafe fn export<T>(module: HMODULE, name: PCSTR, name_str: &'static str) -> Result<T> {
    let address = unsafe { GetProcAddress(module, name) }.ok_or_else(|| Error::MissingSymbol {
        symbol: name_str,
        code: windows::core::Error::from_win32().code().0,
    })?;
    // SAFETY: caller guarantees T matches the export's signature; size
    // equality between fn pointer types holds by construction.
    Ok(unsafe { std::mem::transmute_copy(&address) })
}

/// Two-stage discovery: ask nethost for the hosting library path. The
/// discovery library is freed again as soon as the path is known.
fn discover_hostfxr(nethost_dir: &Path) -> Result<PathBuf> {
    let nethost = OwnedModule(load_library(&nethost_dir.join(NETHOST_DLL))?);
    let get_hostfxr_path: GetHostFxrPathFn =
        unsafe { export(nethost.0, s!("get_hostfxr_path"), "get_hostfxr_path")? };

    let mut buffer = vec![0u16; 260];
    let mut size = buffer.len();
    let mut rc = unsafe { get_hostfxr_path(buffer.as_mut_ptr(), &mut size, std::ptr::null()) };
    if rc == HOST_API_BUFFER_TOO_SMALL {
        buffer.resize(size, 0);
        rc = unsafe { get_hostfxr_path(buffer.as_mut_ptr(), &mut size, std::ptr::null()) };
    }
    if rc != 0 {
        return Err(Error::HostDiscovery { code: rc });
    }

    let len = buffer.iter().position(|&u| u == 0).unwrap_or(buffer.len());
    Ok(PathBuf::from(String::from_utf16_lossy(&buffer[..len])))
}
