//! The argument block passed to the injected bootstrap entry point.
//!
//! The injector writes this structure (and the UTF-16 strings it points at)
//! into the target process, then starts a remote thread at the exported
//! `bootstrap` function with a pointer to it. Layout must stay in sync with
//! what the managed worker declares on its side.

use std::ffi::c_void;

/// Bit in [`WorkerArgs::flags`] selecting the legacy flag+length frame
/// header for compatibility with older readers.
pub const FLAG_LEGACY_FRAMES: u32 = 1;

/// Immutable input to one bootstrap attempt.
///
/// The pipe handle is owned by the injector and is never closed by the
/// payload. String fields are UTF-16 pointer + length pairs; optional
/// fields use a null pointer when absent.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WorkerArgs {
    /// Write end of the report pipe, duplicated into the target process.
    pub pipe: *mut c_void,
    /// Directory containing the runtime hosting library (hostfxr.dll).
    /// Null to discover it through nethost instead.
    pub runtime_dir: *const u16,
    pub runtime_dir_len: i32,
    /// Path of the managed assembly to load. Null to use the assembly
    /// sitting next to the payload DLL itself.
    pub assembly_path: *const u16,
    pub assembly_path_len: i32,
    /// Path of the runtimeconfig.json descriptor. Null to initialize the
    /// runtime in command-line mode instead of config-file mode.
    pub runtime_config: *const u16,
    pub runtime_config_len: i32,
    /// See [`FLAG_LEGACY_FRAMES`].
    pub flags: u32,
}

impl WorkerArgs {
    /// Whether the legacy frame header was requested.
    pub fn legacy_frames(&self) -> bool {
        self.flags & FLAG_LEGACY_FRAMES != 0
    }
}

/// Decode one UTF-16 pointer + length pair. Returns `None` for a null
/// pointer or negative length.
///
/// # Safety
/// `ptr`, when non-null, must point to at least `len` valid u16 values that
/// outlive the returned string (it is copied, so only for the duration of
/// the call).
pub unsafe fn utf16_field(ptr: *const u16, len: i32) -> Option<String> {
    if ptr.is_null() || len < 0 {
        return None;
    }
    let units = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    Some(String::from_utf16_lossy(units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn null_fields_decode_to_none() {
        assert_eq!(unsafe { utf16_field(ptr::null(), 0) }, None);
        assert_eq!(unsafe { utf16_field(ptr::null(), 10) }, None);
    }

    #[test]
    fn utf16_field_copies_contents() {
        let units: Vec<u16> = "C:\\Program Files\\dotnet".encode_utf16().collect();
        let decoded = unsafe { utf16_field(units.as_ptr(), units.len() as i32) };
        assert_eq!(decoded.as_deref(), Some("C:\\Program Files\\dotnet"));
    }

    #[test]
    fn legacy_flag_bit() {
        let mut args = WorkerArgs {
            pipe: ptr::null_mut(),
            runtime_dir: ptr::null(),
            runtime_dir_len: 0,
            assembly_path: ptr::null(),
            assembly_path_len: 0,
            runtime_config: ptr::null(),
            runtime_config_len: 0,
            flags: 0,
        };
        assert!(!args.legacy_frames());
        args.flags = FLAG_LEGACY_FRAMES;
        assert!(args.legacy_frames());
    }
}
