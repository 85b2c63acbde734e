use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{OximeterError, Result};
use crate::protocol::FRAME_OVERHEAD;

/// Sensor state reported alongside each vital-sign sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    /// Finger present and readings are valid
    Normal,
    /// Finger not detected or probe disconnected
    SensorOff,
    /// Probe is searching for a pulse, signal too weak to measure
    Searching,
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::SensorOff => write!(f, "Sensor Off"),
            Self::Searching => write!(f, "Searching"),
        }
    }
}

/// One vital-sign sample: SpO2, pulse rate and perfusion index
///
/// `None` marks a reading the device reported as unmeasurable. All fields are
/// decoded from the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OxiParams {
    /// Blood oxygen saturation in percent (0..=100)
    pub spo2: Option<u8>,
    /// Pulse rate in beats per minute
    pub pulse_rate: Option<u16>,
    /// Perfusion index in percent
    pub pi: Option<f32>,
    /// Sensor state at the time of the sample
    pub sensor: SensorStatus,
}

impl OxiParams {
    /// Sample with every reading unavailable
    #[must_use]
    pub const fn unavailable(sensor: SensorStatus) -> Self {
        Self {
            spo2: None,
            pulse_rate: None,
            pi: None,
            sensor,
        }
    }

    /// True when all three readings carry a value
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.spo2.is_some() && self.pulse_rate.is_some() && self.pi.is_some()
    }
}

impl fmt::Display for OxiParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.spo2 {
            Some(v) => write!(f, "SpO2 {v}%")?,
            None => write!(f, "SpO2 --")?,
        }
        match self.pulse_rate {
            Some(v) => write!(f, ", PR {v} bpm")?,
            None => write!(f, ", PR --")?,
        }
        match self.pi {
            Some(v) => write!(f, ", PI {v:.1}%")?,
            None => write!(f, ", PI --")?,
        }
        write!(f, " ({})", self.sensor)
    }
}

/// Decoded output of one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Decoded {
    /// Periodic vital-sign update
    VitalSigns(OxiParams),
    /// One plethysmograph waveform amplitude
    WaveformSample(i16),
}

/// Frame assembler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblerState {
    /// Not attached to a session; input is dropped
    Idle,
    /// Looking for the header marker
    Scanning,
    /// Header found, waiting for the declared number of bytes
    Accumulating,
    /// Complete frame in hand, checking integrity
    Validating,
}

impl fmt::Display for AssemblerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Accumulating => write!(f, "Accumulating"),
            Self::Validating => write!(f, "Validating"),
        }
    }
}

/// Frame assembler limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Upper bound on bytes retained between `push` calls
    pub max_buffer_len: usize,
    /// Largest accepted value of the frame length byte
    pub max_frame_len: u8,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_buffer_len: 256,
            max_frame_len: 32,
        }
    }
}

impl AssemblerConfig {
    /// Check that the limits can hold at least one maximal frame
    ///
    /// # Errors
    ///
    /// Returns [`OximeterError::InvalidConfig`] if `max_frame_len` is below 2
    /// or the buffer cannot hold a frame of `max_frame_len`.
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_len < 2 {
            return Err(OximeterError::InvalidConfig(format!(
                "max_frame_len {} is below the 2-byte minimum",
                self.max_frame_len
            )));
        }

        let largest_frame = usize::from(self.max_frame_len) + FRAME_OVERHEAD;
        if self.max_buffer_len < largest_frame {
            return Err(OximeterError::InvalidConfig(format!(
                "max_buffer_len {} cannot hold a {largest_frame}-byte frame",
                self.max_buffer_len
            )));
        }

        Ok(())
    }
}

/// Counters for framing and decoding diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingStats {
    /// Frames that passed validation
    pub frames_validated: u64,
    /// Frames dropped on checksum mismatch
    pub checksum_failures: u64,
    /// Frames dropped for an out-of-range length byte
    pub length_errors: u64,
    /// Bytes skipped while scanning or resynchronizing
    pub bytes_discarded: u64,
    /// Bytes received while the assembler was idle
    pub bytes_dropped_idle: u64,
    /// Bytes evicted because the buffer was full
    pub buffer_overflows: u64,
    /// Valid frames with an unhandled packet type
    pub unknown_packets: u64,
    /// Valid frames whose payload was too short to decode
    pub short_payloads: u64,
}

impl FramingStats {
    /// Total frames dropped for any framing reason
    #[must_use]
    pub const fn framing_errors(&self) -> u64 {
        self.checksum_failures + self.length_errors
    }
}
