//! Error types for netinject.

use thiserror::Error;

use crate::frame::ErrorFrame;

/// Result code used for execution failures, where no detail is extractable
/// at the managed/native boundary (E_UNEXPECTED).
pub const EXECUTION_FAILURE_CODE: i32 = 0x8000FFFFu32 as i32;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load hosting library {path}: error {code}")]
    LibraryLoad { path: String, code: i32 },

    #[error("Missing hosting library export {symbol}: error {code}")]
    MissingSymbol { symbol: &'static str, code: i32 },

    #[error("Failed to locate hosting library: rc {code}")]
    HostDiscovery { code: i32 },

    #[error("Runtime initialization failed: rc {code}")]
    Initialization { code: i32, detail: Option<String> },

    #[error("Failed to get assembly loader delegate: rc {code}")]
    Delegate { code: i32 },

    #[error("Failed to load assembly or resolve entry point: rc {code}")]
    Activation { code: i32 },

    #[error("Unknown error during managed execution")]
    Execution,

    #[error("Invalid worker arguments: {0}")]
    InvalidArgs(String),

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsError(#[from] windows::core::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Step-level status returned by the exported entry point. Only useful
    /// to correlate with the ErrorFrame already sent over the pipe.
    pub fn status(&self) -> i32 {
        match self {
            Error::LibraryLoad { .. } | Error::MissingSymbol { .. } | Error::HostDiscovery { .. } => 1,
            Error::Initialization { .. } => 2,
            Error::Delegate { .. } => 3,
            Error::Activation { .. } => 4,
            Error::Execution => 5,
            _ => 6,
        }
    }

    /// Build the frame reported over the pipe for this failure. The code is
    /// the underlying numeric result (hostfxr rc or Win32 last-error) where
    /// one exists.
    pub fn frame(&self) -> ErrorFrame {
        let code = match self {
            Error::LibraryLoad { code, .. }
            | Error::MissingSymbol { code, .. }
            | Error::HostDiscovery { code }
            | Error::Initialization { code, .. }
            | Error::Delegate { code }
            | Error::Activation { code } => *code,
            Error::Execution => EXECUTION_FAILURE_CODE,
            _ => self.status(),
        };

        let message = match self {
            Error::Initialization {
                detail: Some(detail),
                ..
            } => format!("{}: {}", self, detail),
            _ => self.to_string(),
        };

        ErrorFrame::new(code, message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
