use thiserror::Error;

/// Errors that can occur while framing or decoding an oximeter byte stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OximeterError {
    /// Frame did not start with the `0x55 0xAA` marker
    #[error("Bad frame header: {0:02X?}")]
    BadHeader([u8; 2]),

    /// Declared frame length is outside the accepted range
    #[error("Invalid frame length {declared} (accepted 2..={max})")]
    InvalidLength {
        /// Length byte as read from the wire
        declared: u8,
        /// Largest length the assembler accepts
        max: u8,
    },

    /// Trailing checksum does not match the recomputed one
    #[error("Checksum mismatch: expected {expected:02X}, got {actual:02X}")]
    ChecksumMismatch {
        /// Checksum recomputed over the frame
        expected: u8,
        /// Checksum byte carried by the frame
        actual: u8,
    },

    /// Not enough bytes to hold a complete frame
    #[error("Truncated frame: have {have} bytes, need {need}")]
    Truncated {
        /// Bytes available
        have: usize,
        /// Bytes the frame declares
        need: usize,
    },

    /// Packet type byte not handled by the decoder
    #[error("Unknown packet type: {0:02X}")]
    UnknownPacketType(u8),

    /// Payload shorter than the fixed minimum for its packet type
    #[error("Payload too short for packet {packet_type:02X}: {actual} bytes, expected at least {expected}")]
    PayloadTooShort {
        /// Packet type byte
        packet_type: u8,
        /// Minimum payload length for this type
        expected: usize,
        /// Observed payload length
        actual: usize,
    },

    /// Rejected assembler configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Output channel closed by the consumer
    #[error("Measurement consumer disconnected")]
    Disconnected,
}

/// Result type for oximeter stream operations
pub type Result<T> = std::result::Result<T, OximeterError>;

impl OximeterError {
    /// Check if this error comes from frame delimiting or integrity checks
    #[must_use]
    pub const fn is_framing_error(&self) -> bool {
        matches!(
            self,
            Self::BadHeader(_)
                | Self::InvalidLength { .. }
                | Self::ChecksumMismatch { .. }
                | Self::Truncated { .. }
        )
    }

    /// Check if the stream can keep going after this error
    ///
    /// Everything that affects a single frame is recoverable; only a bad
    /// configuration or a vanished consumer is not.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidConfig(_) | Self::Disconnected)
    }
}
