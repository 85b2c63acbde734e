use crate::{
    error::{OximeterError, Result},
    protocol::{Frame, FRAME_OVERHEAD, HEADER, MIN_FRAME_LEN},
    types::{AssemblerConfig, AssemblerState, FramingStats},
};
use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

/// Reassembles oximeter frames from arbitrarily fragmented notification data
///
/// A single BLE notification may carry zero, one or many frames, and a frame
/// may span several notifications. The assembler buffers whatever cannot be
/// classified yet and hands back every frame that passes validation, in the
/// order its bytes arrived.
///
/// On a checksum or length failure only the first marker byte of the bad
/// frame is dropped before scanning resumes, so a frame that starts inside the
/// corrupted region is still found.
///
/// # Latency after corruption
///
/// A corrupted frame can contain a `0x55 0xAA` pair that looks like a header.
/// If that false header declares a length reaching past the buffered data, the
/// assembler waits for it to fill before it can reject it. Valid frames that
/// arrived behind it are held back until then, up to `max_frame_len + 3` bytes
/// after the false header. They are never dropped while the stream keeps
/// flowing, but a `stop` during that window discards them with the rest of the
/// buffer.
///
/// # Examples
///
/// ```
/// use oxistream::{assembler::FrameAssembler, protocol::Frame};
///
/// let mut assembler = FrameAssembler::new();
/// assembler.start();
///
/// let bytes = Frame::vital_signs(0x00, 98, 72, 25).to_bytes();
/// assert!(assembler.push(&bytes[..4]).is_empty());
///
/// let frames = assembler.push(&bytes[4..]);
/// assert_eq!(frames.len(), 1);
/// ```
#[derive(Debug)]
pub struct FrameAssembler {
    config: AssemblerConfig,
    buffer: BytesMut,
    state: AssemblerState,
    stats: FramingStats,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Create an idle assembler with the default limits
    #[must_use]
    pub fn new() -> Self {
        Self::from_valid_config(AssemblerConfig::default())
    }

    /// Create an idle assembler with custom limits
    ///
    /// # Errors
    ///
    /// Returns [`OximeterError::InvalidConfig`] if the buffer cannot hold a
    /// maximal frame.
    pub fn with_config(config: AssemblerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: AssemblerConfig) -> Self {
        Self {
            buffer: BytesMut::with_capacity(config.max_buffer_len),
            config,
            state: AssemblerState::Idle,
            stats: FramingStats::default(),
        }
    }

    /// Begin a new stream, discarding any previous buffer and counters
    pub fn start(&mut self) {
        self.buffer.clear();
        self.stats = FramingStats::default();
        self.state = AssemblerState::Scanning;
    }

    /// End the stream; a partially received frame is dropped silently
    pub fn stop(&mut self) {
        if !self.buffer.is_empty() {
            debug!(
                "Dropping {} buffered bytes on stop ({})",
                self.buffer.len(),
                self.state
            );
        }
        self.buffer.clear();
        self.state = AssemblerState::Idle;
    }

    /// Append a chunk of stream data and return every frame it completes
    ///
    /// Data pushed while idle is dropped and counted.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        if self.state == AssemblerState::Idle {
            trace!("Ignoring {} bytes while idle", bytes.len());
            self.stats.bytes_dropped_idle += bytes.len() as u64;
            return frames;
        }

        trace!("Received chunk: {:02X?}", bytes);

        let mut remaining = bytes;
        while !remaining.is_empty() {
            let mut space = self.config.max_buffer_len.saturating_sub(self.buffer.len());
            if space == 0 {
                warn!("Frame buffer full without progress, evicting oldest byte");
                self.buffer.advance(1);
                self.stats.buffer_overflows += 1;
                space = 1;
            }

            let take = space.min(remaining.len());
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];

            self.extract_frames(&mut frames);
        }

        frames
    }

    /// Current state of the framing state machine
    #[must_use]
    pub const fn state(&self) -> AssemblerState {
        self.state
    }

    /// Number of bytes held back waiting for more data
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Framing counters since the last `start`
    #[must_use]
    pub const fn stats(&self) -> &FramingStats {
        &self.stats
    }

    /// Active limits
    #[must_use]
    pub const fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    fn extract_frames(&mut self, frames: &mut Vec<Frame>) {
        loop {
            self.state = AssemblerState::Scanning;
            if !self.seek_header() {
                return;
            }

            self.state = AssemblerState::Accumulating;
            if self.buffer.len() < FRAME_OVERHEAD {
                return;
            }

            let declared = self.buffer[2];
            if !(MIN_FRAME_LEN..=self.config.max_frame_len).contains(&declared) {
                let error = OximeterError::InvalidLength {
                    declared,
                    max: self.config.max_frame_len,
                };
                debug!("{error}, resynchronizing");
                self.stats.length_errors += 1;
                self.discard(1);
                continue;
            }

            let total = FRAME_OVERHEAD + usize::from(declared);
            if self.buffer.len() < total {
                return;
            }

            self.state = AssemblerState::Validating;
            match Frame::from_bytes(&self.buffer[..total]) {
                Ok(frame) => {
                    self.buffer.advance(total);
                    self.stats.frames_validated += 1;
                    frames.push(frame);
                }
                Err(error) => {
                    debug!("Dropping frame: {error}, resynchronizing");
                    if matches!(error, OximeterError::ChecksumMismatch { .. }) {
                        self.stats.checksum_failures += 1;
                    }
                    self.discard(1);
                }
            }
        }
    }

    /// Drop bytes in front of the next header marker
    ///
    /// Returns false if no complete marker is buffered. A trailing first
    /// marker byte is kept since its partner may arrive with the next chunk.
    fn seek_header(&mut self) -> bool {
        if let Some(pos) = self.buffer.windows(HEADER.len()).position(|w| w == HEADER) {
            self.discard(pos);
            return true;
        }

        let keep = usize::from(self.buffer.last() == Some(&HEADER[0]));
        self.discard(self.buffer.len() - keep);
        false
    }

    fn discard(&mut self, count: usize) {
        if count > 0 {
            self.buffer.advance(count);
            self.stats.bytes_discarded += count as u64;
        }
    }
}
