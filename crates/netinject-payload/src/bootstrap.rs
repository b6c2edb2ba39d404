//! Bootstrap orchestrator: the linear activation sequence behind the
//! exported entry point.
//!
//! Load hosting library -> initialize runtime -> extract delegate ->
//! activate assembly -> invoke, terminal on first failure. Whichever step
//! fails sends the one ErrorFrame for the attempt; this module only owns
//! sequencing and resource lifetime.

use std::path::{Path, PathBuf};

use netinject_shared::args::utf16_field;
use netinject_shared::{Error, FrameFormat, FrameSink, Result, WorkerArgs};

use crate::activate;
use crate::hosting::{HostFxrLocation, HostingApi};
use crate::invoke::{self, NoDetail};
use crate::runtime::{self, InitStrategy};

/// File name of the managed worker assembly when none is supplied,
/// expected next to the payload DLL.
pub const DEFAULT_WORKER_ASSEMBLY: &str = "NetInject.dll";

/// Validated, owned view of one bootstrap attempt's inputs.
#[derive(Debug)]
pub struct BootstrapRequest {
    /// How to find hostfxr.dll.
    pub location: HostFxrLocation,
    /// How to initialize the runtime context.
    pub strategy: InitStrategy,
    /// The assembly holding the worker entry point.
    pub assembly_path: PathBuf,
    /// The original argument block, passed through to the managed side.
    pub raw: WorkerArgs,
    /// Frame header shape for failure reports.
    pub format: FrameFormat,
}

impl BootstrapRequest {
    /// Decode and validate the caller's argument block. `module_path` is
    /// the payload DLL's own location, used to fill in paths the caller
    /// left out.
    ///
    /// # Safety
    /// Non-null pointers in `args` must reference valid UTF-16 of the
    /// declared lengths for the duration of the call.
    pub unsafe fn from_args(args: &WorkerArgs, module_path: Option<&Path>) -> Result<Self> {
        if args.pipe.is_null() {
            return Err(Error::InvalidArgs("null pipe handle".into()));
        }

        let module_dir = module_path.and_then(|p| p.parent().map(Path::to_path_buf));

        let location = match unsafe { utf16_field(args.runtime_dir, args.runtime_dir_len) } {
            Some(dir) => HostFxrLocation::Directory(dir.into()),
            None => {
                let dir = module_dir.clone().ok_or_else(|| {
                    Error::InvalidArgs("no runtime directory and module location unknown".into())
                })?;
                HostFxrLocation::Nethost(dir)
            }
        };

        let assembly_path = match unsafe { utf16_field(args.assembly_path, args.assembly_path_len) }
        {
            Some(path) => PathBuf::from(path),
            None => module_dir
                .ok_or_else(|| {
                    Error::InvalidArgs("no assembly path and module location unknown".into())
                })?
                .join(DEFAULT_WORKER_ASSEMBLY),
        };

        let strategy = match unsafe { utf16_field(args.runtime_config, args.runtime_config_len) } {
            Some(config) => InitStrategy::RuntimeConfig(config.into()),
            None => InitStrategy::CommandLine(assembly_path.clone()),
        };

        let format = if args.legacy_frames() {
            FrameFormat::FlagLength
        } else {
            FrameFormat::ResultLength
        };

        Ok(Self {
            location,
            strategy,
            assembly_path,
            raw: *args,
            format,
        })
    }
}

/// Run one complete bootstrap attempt. `load_host` resolves the hosting
/// library exports (reporting its own failure). Returns the status handed
/// back to the native caller: 0 on success, otherwise the failing step's
/// code, correlating with the frame already on the pipe.
pub fn run<A, L, S>(request: &BootstrapRequest, load_host: L, sink: &mut S) -> i32
where
    A: HostingApi,
    L: FnOnce(&mut S) -> Result<A>,
    S: FrameSink,
{
    match run_steps(request, load_host, sink) {
        Ok(()) => 0,
        Err(err) => err.status(),
    }
}

fn run_steps<A, L, S>(request: &BootstrapRequest, load_host: L, sink: &mut S) -> Result<()>
where
    A: HostingApi,
    L: FnOnce(&mut S) -> Result<A>,
    S: FrameSink,
{
    let api = load_host(sink)?;
    let loader = runtime::obtain_loader_delegate(&api, &request.strategy, sink)?;
    let entry = activate::resolve_entry_point(loader, &request.assembly_path, sink)?;
    invoke::invoke_entry(entry, request.raw, &NoDetail, sink)
    // `api` drops here, releasing the library handle after everything
    // derived from it.
}
