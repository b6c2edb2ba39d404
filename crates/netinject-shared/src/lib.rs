//! Shared types and wire protocol for netinject
//!
//! Communication between the injector and the payload DLL uses a pipe handle
//! that the injector duplicates into the target process. The payload only
//! ever writes to it: zero bytes on success, exactly one [`ErrorFrame`] on
//! failure.

pub mod args;
pub mod error;
pub mod frame;
#[cfg(windows)]
pub mod pipe;

pub use args::WorkerArgs;
pub use error::{Error, Result};
pub use frame::{ErrorFrame, FrameFormat, FrameSink};
#[cfg(windows)]
pub use pipe::{PipeReader, PipeWriter};

/// File name of the payload DLL, expected next to the injector binary.
pub const PAYLOAD_DLL_NAME: &str = "netinject_payload.dll";

/// Name of the function exported by the payload DLL.
pub const BOOTSTRAP_EXPORT_NAME: &str = "bootstrap";
