//! Wire protocol for reporting bootstrap outcomes over the pipe
//!
//! Frame layout (little-endian throughout):
//! ```text
//! ResultLength:  [ code: i32 ][ len: u32 ][ len bytes of UTF-16LE text ]
//! FlagLength:    [ flag: u8  ][ len: u32 ][ len bytes of UTF-16LE text ]
//! ```
//!
//! `len` counts raw encoded bytes, not characters. There is no trailing
//! delimiter; the reader knows the header bounds the payload. Exactly one
//! frame is written per failing bootstrap attempt, zero on success.

/// Header shape written before the message bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// 8-byte header: signed result code + message byte length.
    ResultLength,
    /// Legacy 5-byte header: one "is this an error" flag byte + length.
    FlagLength,
}

impl FrameFormat {
    /// Header size in bytes for this format.
    pub fn header_len(&self) -> usize {
        match self {
            FrameFormat::ResultLength => 8,
            FrameFormat::FlagLength => 5,
        }
    }
}

/// One failure report: numeric result code plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    /// Underlying numeric result (hostfxr rc, Win32 error, ...).
    pub code: i32,
    /// Human-readable diagnosis for the injector to surface.
    pub message: String,
}

impl ErrorFrame {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Message bytes as they appear on the wire (UTF-16LE).
    pub fn message_bytes(&self) -> Vec<u8> {
        self.message
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect()
    }

    /// Header bytes for the given format.
    pub fn header_bytes(&self, format: FrameFormat) -> Vec<u8> {
        let msg_len = (self.message.encode_utf16().count() * 2) as u32;
        let mut header = Vec::with_capacity(format.header_len());
        match format {
            FrameFormat::ResultLength => {
                header.extend_from_slice(&self.code.to_le_bytes());
            }
            FrameFormat::FlagLength => {
                // A frame is only ever written for a failure, and the
                // underlying rc can legitimately be 0 (ok rc but null
                // pointer), so the error flag is always set.
                header.push(1);
            }
        }
        header.extend_from_slice(&msg_len.to_le_bytes());
        header
    }

    /// Serialize the whole frame (header followed by message bytes).
    pub fn encode(&self, format: FrameFormat) -> Vec<u8> {
        let mut bytes = self.header_bytes(format);
        bytes.extend_from_slice(&self.message_bytes());
        bytes
    }

    /// Deserialize one frame. Returns the frame and the number of bytes
    /// consumed, or `None` if the input is truncated or not valid UTF-16.
    pub fn decode(bytes: &[u8], format: FrameFormat) -> Option<(Self, usize)> {
        let header_len = format.header_len();
        if bytes.len() < header_len {
            return None;
        }

        let (code, len_off) = match format {
            FrameFormat::ResultLength => (
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                4,
            ),
            FrameFormat::FlagLength => (bytes[0] as i32, 1),
        };

        let msg_len = u32::from_le_bytes([
            bytes[len_off],
            bytes[len_off + 1],
            bytes[len_off + 2],
            bytes[len_off + 3],
        ]) as usize;

        if msg_len % 2 != 0 || bytes.len() < header_len + msg_len {
            return None;
        }

        let units: Vec<u16> = bytes[header_len..header_len + msg_len]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let message = String::from_utf16(&units).ok()?;

        Some((Self { code, message }, header_len + msg_len))
    }
}

/// Destination for failure reports. The payload writes to the pipe; tests
/// collect frames in memory.
pub trait FrameSink {
    /// Deliver one frame. Delivery is best-effort; a failed or partial
    /// write is not retried.
    fn send(&mut self, frame: &ErrorFrame);
}

/// Sink that collects frames in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct VecSink {
    pub frames: Vec<ErrorFrame>,
}

impl FrameSink for VecSink {
    fn send(&mut self, frame: &ErrorFrame) {
        self.frames.push(frame.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_result_length() {
        let frame = ErrorFrame::new(-2147450731, "hostfxr_initialize rc 0x80008095: config mißlungen");
        let bytes = frame.encode(FrameFormat::ResultLength);

        let (decoded, consumed) = ErrorFrame::decode(&bytes, FrameFormat::ResultLength).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn round_trip_flag_length() {
        // The legacy header only carries an error flag, so the code is 1.
        let frame = ErrorFrame::new(1, "Worker error InvalidOperationException: nope");
        let bytes = frame.encode(FrameFormat::FlagLength);

        assert_eq!(bytes[0], 1);
        let (decoded, consumed) = ErrorFrame::decode(&bytes, FrameFormat::FlagLength).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn legacy_flag_is_set_for_zero_code_failures() {
        // Activation can fail with rc 0 and a null entry pointer; the
        // legacy header must still say error.
        let frame = ErrorFrame::new(0, "Failed to load assembly or resolve entry point: rc 0");
        let bytes = frame.encode(FrameFormat::FlagLength);

        assert_eq!(bytes[0], 1);
        let (decoded, _) = ErrorFrame::decode(&bytes, FrameFormat::FlagLength).unwrap();
        assert_eq!(decoded.message, frame.message);
    }

    #[test]
    fn header_sizes_match_contract() {
        let frame = ErrorFrame::new(7, "x");
        assert_eq!(frame.header_bytes(FrameFormat::ResultLength).len(), 8);
        assert_eq!(frame.header_bytes(FrameFormat::FlagLength).len(), 5);
    }

    #[test]
    fn length_counts_bytes_not_chars() {
        // Three chars, but surrogate pairs make it five UTF-16 code units.
        let frame = ErrorFrame::new(1, "a\u{1F600}\u{1F4A5}");
        let bytes = frame.encode(FrameFormat::ResultLength);
        let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(len, 10);

        let (decoded, _) = ErrorFrame::decode(&bytes, FrameFormat::ResultLength).unwrap();
        assert_eq!(decoded.message, "a\u{1F600}\u{1F4A5}");
    }

    #[test]
    fn empty_message_is_valid() {
        let frame = ErrorFrame::new(42, "");
        let bytes = frame.encode(FrameFormat::ResultLength);
        assert_eq!(bytes.len(), 8);

        let (decoded, consumed) = ErrorFrame::decode(&bytes, FrameFormat::ResultLength).unwrap();
        assert_eq!(decoded.code, 42);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn truncated_input_rejected() {
        let frame = ErrorFrame::new(1, "something went wrong");
        let bytes = frame.encode(FrameFormat::ResultLength);

        assert!(ErrorFrame::decode(&bytes[..3], FrameFormat::ResultLength).is_none());
        assert!(ErrorFrame::decode(&bytes[..bytes.len() - 1], FrameFormat::ResultLength).is_none());
    }

    #[test]
    fn negative_code_survives() {
        let frame = ErrorFrame::new(i32::MIN, "worst case");
        let bytes = frame.encode(FrameFormat::ResultLength);
        let (decoded, _) = ErrorFrame::decode(&bytes, FrameFormat::ResultLength).unwrap();
        assert_eq!(decoded.code, i32::MIN);
    }
}
