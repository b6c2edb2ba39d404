//! Fakes for exercising the bootstrap state machine without a runtime
//! installation.

use std::cell::Cell;
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use netinject_shared::WorkerArgs;

use crate::hosting::{HOST_SUCCESS, HostingApi, RawContext};

/// Count of invocations of [`entry_ok`], for end-to-end assertions.
pub static ENTRY_CALLS: AtomicU32 = AtomicU32::new(0);

/// A well-behaved managed entry point.
pub unsafe extern "system-unwind" fn entry_ok(_args: WorkerArgs) {
    ENTRY_CALLS.fetch_add(1, Ordering::SeqCst);
}

/// A managed entry point whose execution faults.
pub unsafe extern "system-unwind" fn entry_panics(_args: WorkerArgs) {
    panic!("managed code blew up");
}

/// Loader delegate that resolves [`entry_ok`].
pub unsafe extern "system" fn loader_ok(
    _assembly_path: *const u16,
    _type_name: *const u16,
    _method_name: *const u16,
    _delegate_type_name: *const u16,
    _reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32 {
    unsafe { *delegate = entry_ok as usize as *mut c_void };
    HOST_SUCCESS
}

/// Loader delegate that resolves [`entry_panics`].
pub unsafe extern "system" fn loader_panicking_entry(
    _assembly_path: *const u16,
    _type_name: *const u16,
    _method_name: *const u16,
    _delegate_type_name: *const u16,
    _reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32 {
    unsafe { *delegate = entry_panics as usize as *mut c_void };
    HOST_SUCCESS
}

/// Loader delegate that fails the way hostfxr reports a missing assembly
/// (COR_E_FILENOTFOUND).
pub unsafe extern "system" fn loader_missing_assembly(
    _assembly_path: *const u16,
    _type_name: *const u16,
    _method_name: *const u16,
    _delegate_type_name: *const u16,
    _reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32 {
    unsafe { *delegate = ptr::null_mut() };
    0x80070002u32 as i32
}

/// Loader delegate that claims success but hands back a null pointer.
pub unsafe extern "system" fn loader_null_entry(
    _assembly_path: *const u16,
    _type_name: *const u16,
    _method_name: *const u16,
    _delegate_type_name: *const u16,
    _reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32 {
    unsafe { *delegate = ptr::null_mut() };
    HOST_SUCCESS
}

const FAKE_CONTEXT: usize = 0x1234;

/// Scripted [`HostingApi`] with close/release counters.
pub struct FakeHosting {
    init_rc: i32,
    null_context: bool,
    delegate_rc: i32,
    delegate: *mut c_void,
    host_error: Option<String>,
    closes: Cell<u32>,
    released: Rc<Cell<u32>>,
}

impl FakeHosting {
    pub fn new() -> Self {
        Self {
            init_rc: HOST_SUCCESS,
            null_context: false,
            delegate_rc: HOST_SUCCESS,
            delegate: loader_ok as usize as *mut c_void,
            host_error: None,
            closes: Cell::new(0),
            released: Rc::new(Cell::new(0)),
        }
    }

    pub fn with_init_rc(mut self, rc: i32) -> Self {
        self.init_rc = rc;
        self
    }

    pub fn with_null_context(mut self) -> Self {
        self.null_context = true;
        self
    }

    pub fn with_delegate_rc(mut self, rc: i32) -> Self {
        self.delegate_rc = rc;
        self
    }

    pub fn with_delegate(mut self, delegate: *mut c_void) -> Self {
        self.delegate = delegate;
        self
    }

    pub fn with_host_error(mut self, text: &str) -> Self {
        self.host_error = Some(text.into());
        self
    }

    pub fn closes(&self) -> u32 {
        self.closes.get()
    }

    /// Counter incremented when this fake is dropped, standing in for the
    /// library handle release.
    pub fn release_counter(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.released)
    }

    fn initialize(&self, context: &mut RawContext) -> i32 {
        *context = if self.null_context {
            ptr::null_mut()
        } else {
            FAKE_CONTEXT as *mut c_void
        };
        self.init_rc
    }
}

impl HostingApi for FakeHosting {
    fn initialize_for_runtime_config(&self, _config_path: &[u16], context: &mut RawContext) -> i32 {
        self.initialize(context)
    }

    fn initialize_for_command_line(&self, _argv0: &[u16], context: &mut RawContext) -> i32 {
        self.initialize(context)
    }

    fn get_runtime_delegate(
        &self,
        context: RawContext,
        _kind: i32,
        delegate: &mut *mut c_void,
    ) -> i32 {
        assert_eq!(context as usize, FAKE_CONTEXT, "delegate requested on bad context");
        *delegate = if self.delegate_rc == HOST_SUCCESS {
            self.delegate
        } else {
            ptr::null_mut()
        };
        self.delegate_rc
    }

    fn close(&self, context: RawContext) -> i32 {
        assert_eq!(context as usize, FAKE_CONTEXT, "closed a context never opened");
        self.closes.set(self.closes.get() + 1);
        HOST_SUCCESS
    }

    fn last_host_error(&self) -> Option<String> {
        self.host_error.clone()
    }
}

impl Drop for FakeHosting {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

/// A [`WorkerArgs`] block with nothing in it, for invoke-level tests.
pub fn empty_args() -> WorkerArgs {
    WorkerArgs {
        pipe: ptr::null_mut(),
        runtime_dir: ptr::null(),
        runtime_dir_len: 0,
        assembly_path: ptr::null(),
        assembly_path_len: 0,
        runtime_config: ptr::null(),
        runtime_config_len: 0,
        flags: 0,
    }
}
