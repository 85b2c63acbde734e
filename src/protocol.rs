use crate::{
    error::{OximeterError, Result},
    types::{Decoded, OxiParams, SensorStatus},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Two-byte marker that opens every frame
pub const HEADER: [u8; 2] = [0x55, 0xAA];

/// Bytes in front of the length-counted region (header + length byte)
pub const FRAME_OVERHEAD: usize = 3;

/// Smallest legal length byte: packet type + checksum
pub const MIN_FRAME_LEN: u8 = 2;

/// Largest payload a single frame can carry
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - MIN_FRAME_LEN as usize;

/// Minimum SpO2 parameter payload: status, SpO2, pulse rate, PI
pub const VITAL_SIGNS_MIN_PAYLOAD: usize = 4;

/// Minimum waveform payload: one amplitude sample
pub const WAVEFORM_MIN_PAYLOAD: usize = 1;

/// Status bit: finger not detected or probe unplugged
pub const STATUS_SENSOR_OFF: u8 = 0x01;

/// Status bit: pulse search in progress, signal too weak
pub const STATUS_SEARCHING: u8 = 0x02;

/// Raw SpO2 value the device sends when saturation cannot be measured
pub const SPO2_INVALID: u8 = 0x7F;

/// Raw pulse rate value the device sends when the rate cannot be measured
pub const PULSE_RATE_INVALID: u8 = 0xFF;

/// Raw perfusion index value the device sends when PI cannot be measured
pub const PI_INVALID: u8 = 0x00;

/// Packet types carried in byte 3 of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// SpO2, pulse rate and perfusion index
    Spo2Params = 0x53,
    /// Plethysmograph waveform amplitudes
    Pleth = 0x56,
}

impl PacketType {
    /// Convert from u8
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x53 => Some(Self::Spo2Params),
            0x56 => Some(Self::Pleth),
            _ => None,
        }
    }
}

/// Checksum over the length-counted region, excluding the checksum byte itself
///
/// The device sums the bytes modulo 256 and sends the bitwise complement.
#[must_use]
pub fn checksum(data: &[u8]) -> u8 {
    !data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Validated oximeter frame
///
/// Wire layout:
/// - Bytes 0-1: header marker `0x55 0xAA`
/// - Byte 2: length of everything that follows (type + payload + checksum)
/// - Byte 3: packet type
/// - Bytes 4..: payload
/// - Last byte: complement of the byte sum from the length byte through the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw packet type byte
    pub packet_type: u8,
    /// Payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(packet_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }

    /// Create an SpO2 parameter frame from raw field values
    #[must_use]
    pub fn vital_signs(status: u8, spo2: u8, pulse_rate: u8, pi_x10: u8) -> Self {
        Self::new(
            PacketType::Spo2Params as u8,
            vec![status, spo2, pulse_rate, pi_x10],
        )
    }

    /// Create a waveform frame carrying the given amplitudes
    #[must_use]
    pub fn waveform(amplitudes: &[u8]) -> Self {
        Self::new(PacketType::Pleth as u8, amplitudes.to_vec())
    }

    /// Known packet type, if any
    #[must_use]
    pub const fn kind(&self) -> Option<PacketType> {
        PacketType::from_u8(self.packet_type)
    }

    /// Total encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + usize::from(MIN_FRAME_LEN) + self.payload.len().min(MAX_PAYLOAD_LEN)
    }

    /// Serialize frame to bytes
    ///
    /// Payloads longer than [`MAX_PAYLOAD_LEN`] are truncated.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let payload_len = self.payload.len().min(MAX_PAYLOAD_LEN);
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        buf.put_slice(&HEADER);
        // payload_len <= 253, so the length byte cannot overflow
        buf.put_u8((payload_len + usize::from(MIN_FRAME_LEN)) as u8);
        buf.put_u8(self.packet_type);
        buf.put_slice(&self.payload[..payload_len]);

        let sum = checksum(&buf[2..]);
        buf.put_u8(sum);

        buf.freeze()
    }

    /// Parse and validate one frame from the start of `data`
    ///
    /// Bytes past the declared frame length are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`OximeterError::BadHeader`] if the marker is missing,
    /// [`OximeterError::InvalidLength`] for a length byte below 2,
    /// [`OximeterError::Truncated`] if `data` is shorter than the frame, or
    /// [`OximeterError::ChecksumMismatch`] if the integrity check fails.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_OVERHEAD {
            return Err(OximeterError::Truncated {
                have: data.len(),
                need: FRAME_OVERHEAD,
            });
        }

        let mut buf = data;
        let marker = [buf.get_u8(), buf.get_u8()];
        if marker != HEADER {
            return Err(OximeterError::BadHeader(marker));
        }

        let declared = buf.get_u8();
        if declared < MIN_FRAME_LEN {
            return Err(OximeterError::InvalidLength {
                declared,
                max: u8::MAX,
            });
        }

        let total = FRAME_OVERHEAD + usize::from(declared);
        if data.len() < total {
            return Err(OximeterError::Truncated {
                have: data.len(),
                need: total,
            });
        }

        let expected = checksum(&data[2..total - 1]);
        let actual = data[total - 1];
        if expected != actual {
            return Err(OximeterError::ChecksumMismatch { expected, actual });
        }

        let packet_type = buf.get_u8();
        let payload = Bytes::copy_from_slice(&data[FRAME_OVERHEAD + 1..total - 1]);

        Ok(Self {
            packet_type,
            payload,
        })
    }
}

/// Decode a validated frame into its measurement outputs
///
/// SpO2 parameter frames yield exactly one [`Decoded::VitalSigns`]; waveform
/// frames yield one [`Decoded::WaveformSample`] per amplitude, in order.
///
/// # Errors
///
/// Returns [`OximeterError::UnknownPacketType`] for unhandled packet types and
/// [`OximeterError::PayloadTooShort`] if the payload is below the type's minimum.
/// Nothing is emitted for a frame that fails to decode.
pub fn decode(frame: &Frame) -> Result<Vec<Decoded>> {
    match frame.kind() {
        Some(PacketType::Spo2Params) => {
            parse_vital_signs(&frame.payload).map(|params| vec![Decoded::VitalSigns(params)])
        }
        Some(PacketType::Pleth) => parse_waveform(&frame.payload)
            .map(|samples| samples.into_iter().map(Decoded::WaveformSample).collect()),
        None => Err(OximeterError::UnknownPacketType(frame.packet_type)),
    }
}

/// Parse an SpO2 parameter payload
///
/// Payload structure:
/// - Byte 0: status flags (bit 0 = sensor off, bit 1 = searching)
/// - Byte 1: SpO2 percent (`0x7F` = invalid)
/// - Byte 2: pulse rate in bpm (`0xFF` or 0 = invalid)
/// - Byte 3: perfusion index x10 (0 = invalid)
///
/// Any set status flag overrides the readings, which are reported as `None`.
///
/// # Errors
///
/// Returns [`OximeterError::PayloadTooShort`] if fewer than four bytes are present.
pub fn parse_vital_signs(payload: &[u8]) -> Result<OxiParams> {
    if payload.len() < VITAL_SIGNS_MIN_PAYLOAD {
        return Err(OximeterError::PayloadTooShort {
            packet_type: PacketType::Spo2Params as u8,
            expected: VITAL_SIGNS_MIN_PAYLOAD,
            actual: payload.len(),
        });
    }

    let mut buf = payload;

    let status = buf.get_u8();
    let spo2_raw = buf.get_u8();
    let pulse_raw = buf.get_u8();
    let pi_raw = buf.get_u8();

    if status & STATUS_SENSOR_OFF != 0 {
        return Ok(OxiParams::unavailable(SensorStatus::SensorOff));
    }
    if status & STATUS_SEARCHING != 0 {
        return Ok(OxiParams::unavailable(SensorStatus::Searching));
    }

    let spo2 = (spo2_raw != SPO2_INVALID && spo2_raw <= 100).then_some(spo2_raw);
    let pulse_rate =
        (pulse_raw != PULSE_RATE_INVALID && pulse_raw != 0).then_some(u16::from(pulse_raw));
    let pi = (pi_raw != PI_INVALID).then(|| f32::from(pi_raw) / 10.0);

    Ok(OxiParams {
        spo2,
        pulse_rate,
        pi,
        sensor: SensorStatus::Normal,
    })
}

/// Parse a waveform payload into amplitude samples
///
/// # Errors
///
/// Returns [`OximeterError::PayloadTooShort`] for an empty payload.
pub fn parse_waveform(payload: &[u8]) -> Result<Vec<i16>> {
    if payload.len() < WAVEFORM_MIN_PAYLOAD {
        return Err(OximeterError::PayloadTooShort {
            packet_type: PacketType::Pleth as u8,
            expected: WAVEFORM_MIN_PAYLOAD,
            actual: payload.len(),
        });
    }

    Ok(payload.iter().map(|&amp| i16::from(amp)).collect())
}
