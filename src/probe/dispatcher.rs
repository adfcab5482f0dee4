use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::codec::FrameCodec;
use crate::error::{DispatchError, InteractionError};
use crate::hw::{CharacteristicInfo, DeviceSession, WriteMode};
use crate::utils::format_hex;

/// Anything that can push one encoded frame to one characteristic.
#[async_trait]
pub trait FrameWriter: Send + Sync {
    /// Writes `frame` to `characteristic` using `mode`.
    async fn write_frame(
        &self,
        characteristic: &CharacteristicInfo,
        frame: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError>;
}

#[async_trait]
impl FrameWriter for DeviceSession {
    async fn write_frame(
        &self,
        characteristic: &CharacteristicInfo,
        frame: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        self.write(characteristic, frame, mode).await
    }
}

/// Outcome of a delivered command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DispatchReceipt {
    frame: Vec<u8>,
    characteristic: CharacteristicInfo,
    mode: WriteMode,
    failed_attempts: usize,
}

impl DispatchReceipt {
    /// Returns the encoded wire frame.
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Returns the candidate that accepted the write.
    #[must_use]
    pub fn characteristic(&self) -> &CharacteristicInfo {
        &self.characteristic
    }

    /// Returns the write flavour that was used.
    #[must_use]
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Returns how many earlier candidates rejected the write.
    #[must_use]
    pub fn failed_attempts(&self) -> usize {
        self.failed_attempts
    }
}

/// Frames a payload and delivers it to the first write candidate that accepts it.
#[derive(Debug, Clone, Copy)]
pub struct CommandDispatcher<'a> {
    candidates: &'a [CharacteristicInfo],
}

impl<'a> CommandDispatcher<'a> {
    /// Creates a dispatcher over an ordered write-candidate list.
    #[must_use]
    pub fn new(candidates: &'a [CharacteristicInfo]) -> Self {
        Self { candidates }
    }

    /// Encodes `payload` once and tries each candidate in order.
    ///
    /// A failing candidate is logged and skipped, never retried. The first
    /// success ends the attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be framed, the candidate list is
    /// empty, or every candidate rejects the write.
    #[instrument(skip_all, level = "debug", fields(payload_len = payload.len()))]
    pub async fn dispatch<W>(
        &self,
        writer: &W,
        payload: &[u8],
    ) -> Result<DispatchReceipt, DispatchError>
    where
        W: FrameWriter + ?Sized,
    {
        let frame = FrameCodec::encode(payload)?;
        if self.candidates.is_empty() {
            return Err(DispatchError::NoCandidates);
        }

        for (failed_attempts, characteristic) in self.candidates.iter().enumerate() {
            let mode = WriteMode::for_capabilities(characteristic.capabilities());
            match writer.write_frame(characteristic, &frame, mode).await {
                Ok(()) => {
                    info!(
                        characteristic = characteristic.uuid(),
                        %mode,
                        frame = %format_hex(&frame),
                        "command written"
                    );
                    return Ok(DispatchReceipt {
                        frame,
                        characteristic: characteristic.clone(),
                        mode,
                        failed_attempts,
                    });
                }
                Err(error) => {
                    warn!(
                        characteristic = characteristic.uuid(),
                        %mode,
                        ?error,
                        "write candidate failed, trying next"
                    );
                }
            }
        }

        Err(DispatchError::AllCandidatesFailed {
            attempts: self.candidates.len(),
        })
    }
}
