//! Pipe transport for [`ErrorFrame`]s.
//!
//! The payload side writes frames to a handle it does not own; the injector
//! side reads them back. Both directions block, there are no timeouts at
//! this layer.

use std::ffi::c_void;

use windows::Win32::Foundation::HANDLE;
use windows::Win32::Storage::FileSystem::{ReadFile, WriteFile};

use crate::frame::{ErrorFrame, FrameFormat, FrameSink};
use crate::{Error, Result};

/// Writes frames to a caller-owned pipe handle. The handle is never closed
/// here; its lifetime belongs to the injector.
pub struct PipeWriter {
    handle: HANDLE,
    format: FrameFormat,
}

impl PipeWriter {
    /// Wrap a raw pipe handle received through [`crate::WorkerArgs`].
    pub fn new(handle: *mut c_void, format: FrameFormat) -> Self {
        Self {
            handle: HANDLE(handle),
            format,
        }
    }

    fn write_all(&self, bytes: &[u8]) {
        // One blocking write per buffer; the outcome of the OS call is not
        // re-validated and a partial write is not retried.
        unsafe {
            let _ = WriteFile(self.handle, Some(bytes), None, None);
        }
    }
}

impl FrameSink for PipeWriter {
    fn send(&mut self, frame: &ErrorFrame) {
        self.write_all(&frame.header_bytes(self.format));
        let message = frame.message_bytes();
        if !message.is_empty() {
            self.write_all(&message);
        }
    }
}

/// Reads frames from the injector's end of the pipe.
pub struct PipeReader {
    handle: HANDLE,
    format: FrameFormat,
}

impl PipeReader {
    pub fn new(handle: HANDLE, format: FrameFormat) -> Self {
        Self { handle, format }
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let mut read = 0u32;
            unsafe {
                ReadFile(self.handle, Some(&mut buf[filled..]), Some(&mut read), None)?;
            }
            if read == 0 {
                return Err(Error::Other("Pipe closed mid-frame".into()));
            }
            filled += read as usize;
        }
        Ok(())
    }

    /// Blocking read of one complete frame.
    pub fn read_frame(&self) -> Result<ErrorFrame> {
        let mut header = vec![0u8; self.format.header_len()];
        self.read_exact(&mut header)?;

        let len_off = header.len() - 4;
        let msg_len = u32::from_le_bytes([
            header[len_off],
            header[len_off + 1],
            header[len_off + 2],
            header[len_off + 3],
        ]) as usize;

        let mut bytes = header;
        bytes.resize(bytes.len() + msg_len, 0);
        let header_len = self.format.header_len();
        self.read_exact(&mut bytes[header_len..])?;

        ErrorFrame::decode(&bytes, self.format)
            .map(|(frame, _)| frame)
            .ok_or_else(|| Error::Other("Malformed frame on pipe".into()))
    }
}
