use thiserror::Error;

use crate::protocol::{
    FRAME_LENGTH_OFFSET, FRAME_MAX_PAYLOAD_LEN, FRAME_SYNC_A, FRAME_SYNC_B, FRAME_TERMINATOR,
};

/// Sync, sync, length, checksum, terminator.
const FRAME_OVERHEAD_LEN: usize = 5;

/// Errors returned by frame encoding.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameCodecError {
    /// The payload length plus the length offset does not fit in one byte.
    #[error("frame payload is too large: {payload_len} bytes exceeds max {max_payload_len}")]
    PayloadTooLarge {
        payload_len: usize,
        max_payload_len: usize,
    },
}

/// Reasons an inbound byte sequence is not shaped like a frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum MalformedFrame {
    /// Fewer bytes than the fixed frame overhead.
    #[display("too short: {actual} bytes")]
    TooShort { actual: usize },
    /// The first two bytes are not `FB BF`.
    #[display("bad sync bytes {first:#04X} {second:#04X}")]
    BadSync { first: u8, second: u8 },
    /// The last byte is not the `ED` terminator.
    #[display("bad terminator {found:#04X}")]
    BadTerminator { found: u8 },
    /// The length byte disagrees with the number of bytes received.
    #[display("length byte {declared} does not match {actual} received bytes")]
    LengthMismatch { declared: u8, actual: usize },
}

/// A structurally valid frame borrowed from an inbound buffer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DecodedFrame<'a> {
    length: u8,
    payload: &'a [u8],
    checksum: u8,
}

impl<'a> DecodedFrame<'a> {
    /// Returns the raw length byte.
    #[must_use]
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Returns the payload carried between the length byte and the checksum.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Returns the checksum byte.
    #[must_use]
    pub fn checksum(&self) -> u8 {
        self.checksum
    }
}

/// Outcome of classifying a byte sequence against the frame shape.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FrameDecode<'a> {
    /// Sync bytes, length, checksum and terminator all agree.
    Valid(DecodedFrame<'a>),
    /// The shape is right but the checksum byte is wrong.
    ChecksumMismatch {
        /// Checksum byte found in the frame.
        declared: u8,
        /// Checksum computed over the received bytes.
        computed: u8,
    },
    /// The bytes are not shaped like a frame.
    Malformed(MalformedFrame),
}

impl FrameDecode<'_> {
    /// Short label used in notification logs.
    #[must_use]
    pub fn shape_label(&self) -> &'static str {
        match self {
            Self::Valid(_) => "frame",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::Malformed(_) => "raw",
        }
    }
}

/// Encoder and shape checker for `FB BF`-prefixed command frames.
///
/// Frames are laid out as `[FB, BF, len, payload.., checksum, ED]` where
/// `len = payload.len() + 4` and the checksum is the byte sum of everything
/// before it, sync bytes included, modulo 256.
pub struct FrameCodec;

impl FrameCodec {
    /// Wraps a logical payload into a wire frame.
    ///
    /// ```
    /// use jimu_probe::FrameCodec;
    ///
    /// let frame = FrameCodec::encode(&[0x0B, 0xFF])?;
    /// assert_eq!(vec![0xFB, 0xBF, 0x06, 0x0B, 0xFF, 0xCA, 0xED], frame);
    /// # Ok::<(), jimu_probe::FrameCodecError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is longer than 251 bytes, since the
    /// length byte would overflow.
    pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameCodecError> {
        let length = u8::try_from(payload.len() + FRAME_LENGTH_OFFSET).map_err(|_overflow| {
            FrameCodecError::PayloadTooLarge {
                payload_len: payload.len(),
                max_payload_len: FRAME_MAX_PAYLOAD_LEN,
            }
        })?;

        let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD_LEN);
        frame.extend_from_slice(&[FRAME_SYNC_A, FRAME_SYNC_B, length]);
        frame.extend_from_slice(payload);
        frame.push(checksum(&frame));
        frame.push(FRAME_TERMINATOR);
        Ok(frame)
    }

    /// Classifies an inbound byte sequence as a valid frame, a checksum
    /// mismatch, or malformed.
    ///
    /// ```
    /// use jimu_probe::{FrameCodec, FrameDecode};
    ///
    /// let decoded = FrameCodec::decode(&[0xFB, 0xBF, 0x06, 0x0B, 0xFF, 0xCA, 0xED]);
    /// let FrameDecode::Valid(frame) = decoded else {
    ///     panic!("fixture should decode");
    /// };
    /// assert_eq!(&[0x0B, 0xFF], frame.payload());
    /// ```
    #[must_use]
    pub fn decode(bytes: &[u8]) -> FrameDecode<'_> {
        if bytes.len() < FRAME_OVERHEAD_LEN {
            return FrameDecode::Malformed(MalformedFrame::TooShort {
                actual: bytes.len(),
            });
        }
        if bytes[0] != FRAME_SYNC_A || bytes[1] != FRAME_SYNC_B {
            return FrameDecode::Malformed(MalformedFrame::BadSync {
                first: bytes[0],
                second: bytes[1],
            });
        }

        let last = bytes.len() - 1;
        if bytes[last] != FRAME_TERMINATOR {
            return FrameDecode::Malformed(MalformedFrame::BadTerminator { found: bytes[last] });
        }

        let declared = bytes[2];
        if usize::from(declared) + 1 != bytes.len() {
            return FrameDecode::Malformed(MalformedFrame::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        let checksum_index = last - 1;
        let computed = checksum(&bytes[..checksum_index]);
        let found = bytes[checksum_index];
        if computed != found {
            return FrameDecode::ChecksumMismatch {
                declared: found,
                computed,
            };
        }

        FrameDecode::Valid(DecodedFrame {
            length: declared,
            payload: &bytes[3..checksum_index],
            checksum: found,
        })
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |sum, value| sum.wrapping_add(*value))
}
