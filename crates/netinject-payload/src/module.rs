//! The payload module's own identity inside the host process.
//!
//! The base address is recorded once at DLL_PROCESS_ATTACH and cleared at
//! detach; there are no concurrent writers. Everything else derives from
//! the accessor instead of touching the global.

use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::GetModuleFileNameW;

static MODULE_BASE: AtomicUsize = AtomicUsize::new(0);

/// Record the module handle at process attach.
pub fn set_module_base(instance: *mut c_void) {
    MODULE_BASE.store(instance as usize, Ordering::Release);
}

/// Forget the module handle at process detach.
pub fn clear_module_base() {
    MODULE_BASE.store(0, Ordering::Release);
}

fn module_base() -> Option<HMODULE> {
    match MODULE_BASE.load(Ordering::Acquire) {
        0 => None,
        base => Some(HMODULE(base as *mut c_void)),
    }
}

/// On-disk path of the payload DLL, if the module base has been recorded.
pub fn module_path() -> Option<PathBuf> {
    let module = module_base()?;

    // Grow until the path fits; the API truncates silently when it does not.
    let mut buffer = vec![0u16; 260];
    loop {
        let length = unsafe { GetModuleFileNameW(Some(module), &mut buffer) } as usize;
        if length == 0 {
            return None;
        }
        if length < buffer.len() - 1 {
            buffer.truncate(length);
            break;
        }
        let new_len = buffer.len() * 2;
        buffer.resize(new_len, 0);
    }

    Some(PathBuf::from(String::from_utf16_lossy(&buffer)))
}
