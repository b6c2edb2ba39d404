#[cfg(windows)]
mod inject;
#[cfg(windows)]
mod pipe;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "netinject")]
#[command(about = "Bootstraps the .NET runtime inside a running process")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inject the payload into a process and run the managed worker
    Run {
        /// Process ID to target
        #[arg(short, long, group = "target")]
        pid: Option<u32>,
        /// Process name to target (e.g., "notepad.exe" or "notepad")
        #[arg(short, long, group = "target")]
        name: Option<String>,
        /// Directory containing hostfxr.dll (default: discover via nethost)
        #[arg(long)]
        runtime_dir: Option<String>,
        /// Managed worker assembly (default: NetInject.dll next to the payload)
        #[arg(long)]
        assembly: Option<String>,
        /// runtimeconfig.json path; without it the runtime initializes in
        /// command-line mode over the assembly
        #[arg(long)]
        runtime_config: Option<String>,
        /// Payload DLL path (default: netinject_payload.dll next to this binary)
        #[arg(long)]
        payload: Option<String>,
        /// Use the legacy flag+length frame header
        #[arg(long)]
        legacy_frames: bool,
    },
}

#[cfg(not(windows))]
fn main() {
    let _ = Cli::parse();
    eprintln!("netinject only supports Windows targets");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pid,
            name,
            runtime_dir,
            assembly,
            runtime_config,
            payload,
            legacy_frames,
        } => {
            let target_pid = match win::resolve_target(pid, name) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };

            match win::run(
                target_pid,
                runtime_dir,
                assembly,
                runtime_config,
                payload,
                legacy_frames,
            ) {
                Ok(0) => println!("Bootstrap succeeded"),
                Ok(status) => std::process::exit(status.clamp(1, 255)),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

#[cfg(windows)]
mod win {
    use crate::inject::{self, BootstrapSpec};
    use crate::pipe::ReportPipe;
    use netinject_shared::{Error, FrameFormat, PAYLOAD_DLL_NAME, Result};
    use std::path::PathBuf;
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::ProcessStatus::{EnumProcesses, GetModuleBaseNameW};
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_ALL_ACCESS, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
    };

    pub fn run(
        pid: u32,
        runtime_dir: Option<String>,
        assembly: Option<String>,
        runtime_config: Option<String>,
        payload: Option<String>,
        legacy_frames: bool,
    ) -> Result<i32> {
        let payload_path = match payload {
            Some(p) => PathBuf::from(p),
            None => default_payload_path()?,
        };
        if !payload_path.exists() {
            return Err(Error::Other(format!(
                "Payload DLL not found at: {}",
                payload_path.display()
            )));
        }

        let format = if legacy_frames {
            FrameFormat::FlagLength
        } else {
            FrameFormat::ResultLength
        };

        let process = unsafe { OpenProcess(PROCESS_ALL_ACCESS, false, pid)? };
        let result = (|| {
            let pipe = ReportPipe::create()?;
            let remote_pipe = pipe.duplicate_write_into(process)?;

            println!("Injecting payload from: {}", payload_path.display());
            let spec = BootstrapSpec {
                pipe: remote_pipe,
                runtime_dir,
                assembly_path: assembly,
                runtime_config,
                legacy_frames,
            };
            let status = inject::execute(process, &payload_path, &spec)?;

            if status != 0 {
                let frame = pipe.reader(format).read_frame()?;
                eprintln!(
                    "Bootstrap failed at step {} (0x{:08X}): {}",
                    status, frame.code as u32, frame.message
                );
            }
            Ok(status)
        })();

        unsafe {
            let _ = CloseHandle(process);
        }
        result
    }

    fn default_payload_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().map_err(|e| Error::Other(e.to_string()))?;
        Ok(exe_path
            .parent()
            .ok_or_else(|| Error::Other("Failed to get exe directory".into()))?
            .join(PAYLOAD_DLL_NAME))
    }

    /// Resolve the target PID from --pid or --name.
    pub fn resolve_target(pid: Option<u32>, name: Option<String>) -> Result<u32> {
        match (pid, name) {
            (Some(p), _) => Ok(p),
            (None, Some(n)) => pid_by_name(&n),
            (None, None) => Err(Error::Other("Must specify either --pid or --name".into())),
        }
    }

    /// Scan running processes for one whose image name matches, with or
    /// without the .exe suffix.
    fn pid_by_name(name: &str) -> Result<u32> {
        let wanted = name.to_lowercase();
        let wanted = wanted.trim_end_matches(".exe");

        let mut pids = vec![0u32; 4096];
        let mut returned = 0u32;
        unsafe {
            EnumProcesses(
                pids.as_mut_ptr(),
                (pids.len() * std::mem::size_of::<u32>()) as u32,
                &mut returned,
            )?;
        }
        pids.truncate(returned as usize / std::mem::size_of::<u32>());

        for pid in pids.into_iter().filter(|&p| p != 0) {
            let Ok(process) =
                (unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid) })
            else {
                continue;
            };

            let mut image = [0u16; 260];
            let len = unsafe { GetModuleBaseNameW(process, None, &mut image) };
            unsafe {
                let _ = CloseHandle(process);
            }
            if len == 0 {
                continue;
            }

            let image = String::from_utf16_lossy(&image[..len as usize]).to_lowercase();
            if image.trim_end_matches(".exe") == wanted {
                return Ok(pid);
            }
        }

        Err(Error::Other(format!("Process '{}' not found", name)))
    }
}
