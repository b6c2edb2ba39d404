//! The report pipe between injector and payload.
//!
//! An anonymous pipe whose write end is duplicated into the target
//! process. The payload writes at most one frame to it; we read only after
//! a non-zero bootstrap status.

use netinject_shared::{FrameFormat, PipeReader, Result};
use windows::Win32::Foundation::{
    CloseHandle, DUPLICATE_SAME_ACCESS, DuplicateHandle, HANDLE,
};
use windows::Win32::System::Pipes::CreatePipe;
use windows::Win32::System::Threading::GetCurrentProcess;

pub struct ReportPipe {
    read: HANDLE,
    write: HANDLE,
}

impl ReportPipe {
    /// Create the pipe pair in this process.
    pub fn create() -> Result<Self> {
        let mut read = HANDLE::default();
        let mut write = HANDLE::default();
        unsafe {
            CreatePipe(&mut read, &mut write, None, 0)?;
        }
        Ok(Self { read, write })
    }

    /// Duplicate the write end into the target process and return the
    /// handle value valid there.
    pub fn duplicate_write_into(&self, process: HANDLE) -> Result<HANDLE> {
        let mut remote = HANDLE::default();
        unsafe {
            DuplicateHandle(
                GetCurrentProcess(),
                self.write,
                process,
                &mut remote,
                0,
                false,
                DUPLICATE_SAME_ACCESS,
            )?;
        }
        Ok(remote)
    }

    /// Reader over our end, for decoding the failure frame.
    pub fn reader(&self, format: FrameFormat) -> PipeReader {
        PipeReader::new(self.read, format)
    }
}

impl Drop for ReportPipe {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.read);
            let _ = CloseHandle(self.write);
        }
    }
}
