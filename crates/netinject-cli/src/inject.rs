//! Payload DLL injection and remote bootstrap execution.

use std::ffi::{CString, c_void};
use std::path::Path;

use netinject_shared::args::FLAG_LEGACY_FRAMES;
use netinject_shared::{BOOTSTRAP_EXPORT_NAME, Error, Result, WorkerArgs};
use windows::Win32::Foundation::{CloseHandle, FreeLibrary, HANDLE, HMODULE, WAIT_OBJECT_0};
use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAllocEx, VirtualFreeEx,
};
use windows::Win32::System::ProcessStatus::{
    EnumProcessModulesEx, GetModuleFileNameExW, LIST_MODULES_ALL,
};
use windows::Win32::System::Threading::{
    CreateRemoteThread, GetExitCodeThread, INFINITE, WaitForSingleObject,
};
use windows::core::{PCSTR, PCWSTR, s, w};

/// What to run in the target process.
pub struct BootstrapSpec {
    /// Pipe handle value valid in the target process.
    pub pipe: HANDLE,
    pub runtime_dir: Option<String>,
    pub assembly_path: Option<String>,
    pub runtime_config: Option<String>,
    pub legacy_frames: bool,
}

/// Memory allocated in the target process, released on drop.
struct RemoteMemory {
    process: HANDLE,
    ptr: *mut c_void,
}

impl RemoteMemory {
    fn write(process: HANDLE, bytes: &[u8]) -> Result<Self> {
        unsafe {
            let ptr = VirtualAllocEx(
                process,
                None,
                bytes.len(),
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            );
            if ptr.is_null() {
                return Err(Error::Other(
                    "Failed to allocate memory in target process".into(),
                ));
            }

            let memory = Self { process, ptr };
            WriteProcessMemory(process, ptr, bytes.as_ptr() as *const _, bytes.len(), None)?;
            Ok(memory)
        }
    }

    fn ptr(&self) -> *mut c_void {
        self.ptr
    }
}

impl Drop for RemoteMemory {
    fn drop(&mut self) {
        unsafe {
            let _ = VirtualFreeEx(self.process, self.ptr, 0, MEM_RELEASE);
        }
    }
}

/// Inject the payload DLL and run its bootstrap export to completion.
/// Returns the bootstrap status code (0 = success).
pub fn execute(process: HANDLE, payload_path: &Path, spec: &BootstrapSpec) -> Result<i32> {
    let rva = bootstrap_rva(payload_path)?;

    load_remote_library(process, payload_path)?;

    let file_name = payload_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Other("Invalid payload path".into()))?;
    let remote_base = find_remote_module(process, file_name)?;
    let remote_bootstrap = remote_base + rva;

    // Strings first, so the args block can point at them.
    let runtime_dir = remote_utf16(process, spec.runtime_dir.as_deref())?;
    let assembly = remote_utf16(process, spec.assembly_path.as_deref())?;
    let config = remote_utf16(process, spec.runtime_config.as_deref())?;

    let args = WorkerArgs {
        pipe: spec.pipe.0,
        runtime_dir: field_ptr(&runtime_dir),
        runtime_dir_len: field_len(&runtime_dir),
        assembly_path: field_ptr(&assembly),
        assembly_path_len: field_len(&assembly),
        runtime_config: field_ptr(&config),
        runtime_config_len: field_len(&config),
        flags: if spec.legacy_frames {
            FLAG_LEGACY_FRAMES
        } else {
            0
        },
    };
    let args_bytes = unsafe {
        std::slice::from_raw_parts(
            &args as *const WorkerArgs as *const u8,
            std::mem::size_of::<WorkerArgs>(),
        )
    };
    let remote_args = RemoteMemory::write(process, args_bytes)?;

    unsafe {
        let thread = CreateRemoteThread(
            process,
            None,
            0,
            Some(std::mem::transmute(remote_bootstrap as *const c_void)),
            Some(remote_args.ptr()),
            0,
            None,
        )?;

        WaitForSingleObject(thread, INFINITE);
        let mut status = 0u32;
        let result = GetExitCodeThread(thread, &mut status);
        let _ = CloseHandle(thread);
        result?;

        Ok(status as i32)
    }
}

fn remote_utf16(process: HANDLE, value: Option<&str>) -> Result<Option<(RemoteMemory, i32)>> {
    match value {
        Some(text) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
            let memory = RemoteMemory::write(process, &bytes)?;
            Ok(Some((memory, units.len() as i32)))
        }
        None => Ok(None),
    }
}

fn field_ptr(field: &Option<(RemoteMemory, i32)>) -> *const u16 {
    field
        .as_ref()
        .map(|(memory, _)| memory.ptr() as *const u16)
        .unwrap_or(std::ptr::null())
}

fn field_len(field: &Option<(RemoteMemory, i32)>) -> i32 {
    field.as_ref().map(|(_, len)| *len).unwrap_or(0)
}

/// Offset of the bootstrap export inside the payload image, computed from
/// a copy loaded into our own process.
fn bootstrap_rva(payload_path: &Path) -> Result<usize> {
    let wide: Vec<u16> = payload_path
        .to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let export_name = CString::new(BOOTSTRAP_EXPORT_NAME)
        .map_err(|e| Error::Other(format!("Invalid export name: {}", e)))?;

    unsafe {
        let local = LoadLibraryW(PCWSTR(wide.as_ptr()))?;
        let address = GetProcAddress(local, PCSTR(export_name.as_ptr() as *const u8));
        let rva = address.map(|f| f as usize - local.0 as usize);
        let _ = FreeLibrary(local);

        rva.ok_or_else(|| {
            Error::Other(format!(
                "Payload does not export '{}'",
                BOOTSTRAP_EXPORT_NAME
            ))
        })
    }
}

/// Map the payload DLL into the target via LoadLibraryW on a remote thread.
fn load_remote_library(process: HANDLE, dll_path: &Path) -> Result<()> {
    let wide: Vec<u16> = dll_path
        .to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let bytes: Vec<u8> = wide.iter().flat_map(|u| u.to_le_bytes()).collect();
    let remote_path = RemoteMemory::write(process, &bytes)?;

    unsafe {
        let kernel32 = GetModuleHandleW(w!("kernel32.dll"))?;
        let load_library = GetProcAddress(kernel32, s!("LoadLibraryW"))
            .ok_or_else(|| Error::Other("Failed to get LoadLibraryW address".into()))?;

        let thread = CreateRemoteThread(
            process,
            None,
            0,
            Some(std::mem::transmute(load_library)),
            Some(remote_path.ptr()),
            0,
            None,
        )?;

        let wait = WaitForSingleObject(thread, 10000);
        let _ = CloseHandle(thread);
        if wait != WAIT_OBJECT_0 {
            return Err(Error::Other("Timed out loading payload in target".into()));
        }
    }

    Ok(())
}

/// Find the base address of a module in the target process by file name.
fn find_remote_module(process: HANDLE, file_name: &str) -> Result<usize> {
    let wanted = file_name.to_lowercase();

    unsafe {
        let mut modules = [HMODULE::default(); 1024];
        let mut bytes_needed = 0u32;
        EnumProcessModulesEx(
            process,
            modules.as_mut_ptr(),
            (modules.len() * std::mem::size_of::<HMODULE>()) as u32,
            &mut bytes_needed,
            LIST_MODULES_ALL,
        )?;

        let count = (bytes_needed as usize / std::mem::size_of::<HMODULE>()).min(modules.len());
        for &module in &modules[..count] {
            let mut path_buf = [0u16; 260];
            let len = GetModuleFileNameExW(Some(process), Some(module), &mut path_buf);
            if len == 0 {
                continue;
            }
            let path = String::from_utf16_lossy(&path_buf[..len as usize]).to_lowercase();
            if path.ends_with(&wanted) {
                return Ok(module.0 as usize);
            }
        }
    }

    Err(Error::Other(format!(
        "Module '{}' not found in target after injection",
        file_name
    )))
}
