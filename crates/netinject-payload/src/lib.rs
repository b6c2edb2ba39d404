//! DLL that gets injected into a host process to bootstrap the .NET
//! runtime and start the managed worker.
//!
//! The injector duplicates a pipe handle into the target, writes a
//! [`WorkerArgs`] block into its memory, and starts a remote thread at the
//! exported [`bootstrap`] function. The sequence is strictly linear and
//! single-threaded: load hostfxr, initialize a runtime context, extract
//! the assembly loader delegate, resolve the worker entry point, invoke
//! it. The first failing step writes one ErrorFrame to the pipe; success
//! writes nothing and returns 0.

pub mod activate;
pub mod bootstrap;
pub mod hosting;
pub mod invoke;
pub mod runtime;

#[cfg(windows)]
mod hostfxr;
#[cfg(windows)]
mod module;
#[cfg(test)]
mod testing;

#[cfg(windows)]
use std::ffi::c_void;

#[cfg(windows)]
use netinject_shared::{FrameFormat, FrameSink, PipeWriter, WorkerArgs};

#[cfg(windows)]
use crate::bootstrap::BootstrapRequest;

/// DLL entry point for Windows. Only records where this module lives; the
/// real work waits for the injector to start [`bootstrap`] on its own
/// thread, so nothing here can trip over the loader lock.
#[cfg(windows)]
#[unsafe(no_mangle)]
pub unsafe extern "system" fn DllMain(
    hinst_dll: *mut c_void,
    fdw_reason: u32,
    _lpv_reserved: *mut c_void,
) -> i32 {
    const DLL_PROCESS_ATTACH: u32 = 1;
    const DLL_PROCESS_DETACH: u32 = 0;

    match fdw_reason {
        DLL_PROCESS_ATTACH => module::set_module_base(hinst_dll),
        DLL_PROCESS_DETACH => module::clear_module_base(),
        _ => {}
    }

    1 // TRUE
}

/// Exported bootstrap entry point, called once per injected instance on a
/// remote thread. Returns 0 on success; a non-zero status otherwise, whose
/// detail has already been written to the pipe as an ErrorFrame.
#[cfg(windows)]
#[unsafe(no_mangle)]
pub unsafe extern "system" fn bootstrap(args: *const WorkerArgs) -> i32 {
    if args.is_null() {
        eprintln!("[netinject] bootstrap called with null args");
        return netinject_shared::Error::InvalidArgs("null args".into()).status();
    }
    let args = unsafe { *args };

    let format = if args.legacy_frames() {
        FrameFormat::FlagLength
    } else {
        FrameFormat::ResultLength
    };

    let request = match unsafe { BootstrapRequest::from_args(&args, module::module_path().as_deref()) }
    {
        Ok(request) => request,
        Err(err) => {
            // A null pipe cannot carry a report; anything else can.
            if !args.pipe.is_null() {
                PipeWriter::new(args.pipe, format).send(&err.frame());
            }
            eprintln!("[netinject] bad worker args: {}", err);
            return err.status();
        }
    };

    let mut sink = PipeWriter::new(args.pipe, request.format);
    bootstrap::run(
        &request,
        |sink: &mut PipeWriter| hostfxr::HostFxr::load(&request.location, sink),
        &mut sink,
    )
}
