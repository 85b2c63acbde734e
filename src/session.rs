use crate::{
    assembler::FrameAssembler,
    error::{OximeterError, Result},
    protocol::decode,
    types::{AssemblerConfig, AssemblerState, Decoded, FramingStats, OxiParams},
};
use tracing::{debug, info, warn};

/// Receiver of decoded oximeter measurements
///
/// Both callbacks run synchronously inside [`OximeterSession::ingest`], on the
/// thread that delivered the bytes, in the order the frames arrived.
///
/// Any `FnMut(Decoded)` closure is a listener:
///
/// ```
/// use oxistream::{Decoded, OximeterSession};
///
/// let mut samples = Vec::new();
/// let mut session = OximeterSession::new(|decoded: Decoded| samples.push(decoded));
/// session.start();
/// ```
pub trait MeasurementListener {
    /// Called once per vital-sign frame
    fn on_vital_signs(&mut self, params: &OxiParams);

    /// Called once per waveform amplitude
    fn on_waveform_sample(&mut self, amplitude: i16);

    /// Whether the consumer behind this listener has gone away
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> MeasurementListener for F
where
    F: FnMut(Decoded),
{
    fn on_vital_signs(&mut self, params: &OxiParams) {
        self(Decoded::VitalSigns(*params));
    }

    fn on_waveform_sample(&mut self, amplitude: i16) {
        self(Decoded::WaveformSample(amplitude));
    }
}

/// Decoding session for one BLE connection
///
/// The session owns the frame assembler and the listener. Call
/// [`start`](Self::start) once notifications are flowing, feed every
/// notification payload to [`ingest`](Self::ingest), and call
/// [`stop`](Self::stop) on disconnect. A session can be restarted any number
/// of times; nothing from a previous connection leaks into the next one.
///
/// There is no internal locking. If bytes can arrive from more than one
/// thread, serialize the calls to `ingest` outside the session.
///
/// # Examples
///
/// ```
/// use oxistream::{protocol::Frame, Decoded, OximeterSession};
///
/// let mut decoded = Vec::new();
/// let mut session = OximeterSession::new(|d: Decoded| decoded.push(d));
/// session.start();
///
/// let bytes = Frame::waveform(&[10, 20]).to_bytes();
/// assert_eq!(session.ingest(&bytes[..3]), 0);
/// assert_eq!(session.ingest(&bytes[3..]), 2);
/// session.stop();
/// drop(session);
///
/// assert_eq!(
///     decoded,
///     vec![Decoded::WaveformSample(10), Decoded::WaveformSample(20)]
/// );
/// ```
#[derive(Debug)]
pub struct OximeterSession<L> {
    assembler: FrameAssembler,
    listener: L,
    unknown_packets: u64,
    short_payloads: u64,
}

impl<L: MeasurementListener> OximeterSession<L> {
    /// Create an inactive session with default assembler limits
    pub fn new(listener: L) -> Self {
        Self {
            assembler: FrameAssembler::new(),
            listener,
            unknown_packets: 0,
            short_payloads: 0,
        }
    }

    /// Create an inactive session with custom assembler limits
    ///
    /// # Errors
    ///
    /// Returns [`OximeterError::InvalidConfig`] if the limits are inconsistent.
    pub fn with_config(listener: L, config: AssemblerConfig) -> Result<Self> {
        Ok(Self {
            assembler: FrameAssembler::with_config(config)?,
            listener,
            unknown_packets: 0,
            short_payloads: 0,
        })
    }

    /// Begin decoding a new connection's notification stream
    pub fn start(&mut self) {
        info!("Starting oximeter session");
        self.assembler.start();
        self.unknown_packets = 0;
        self.short_payloads = 0;
    }

    /// Stop decoding; safe to call at any point, including mid-frame
    pub fn stop(&mut self) {
        if self.is_active() {
            let stats = self.stats();
            info!(
                "Stopping oximeter session: {} frames, {} framing errors",
                stats.frames_validated,
                stats.framing_errors()
            );
        }
        self.assembler.stop();
    }

    /// Whether the session is between `start` and `stop`
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.assembler.state() != AssemblerState::Idle
    }

    /// Feed one notification payload and dispatch every measurement it completes
    ///
    /// Returns the number of listener callbacks made. Framing and decoding
    /// problems are logged and counted, never returned.
    pub fn ingest(&mut self, bytes: &[u8]) -> usize {
        let mut dispatched = 0;

        for frame in self.assembler.push(bytes) {
            match decode(&frame) {
                Ok(outputs) => {
                    for output in outputs {
                        match output {
                            Decoded::VitalSigns(params) => self.listener.on_vital_signs(&params),
                            Decoded::WaveformSample(amp) => self.listener.on_waveform_sample(amp),
                        }
                        dispatched += 1;
                    }
                }
                Err(OximeterError::UnknownPacketType(packet_type)) => {
                    debug!("Ignoring packet type {packet_type:02X}");
                    self.unknown_packets += 1;
                }
                Err(error) => {
                    warn!("Discarding frame: {error}");
                    self.short_payloads += 1;
                }
            }
        }

        dispatched
    }

    /// Current framing state
    #[must_use]
    pub const fn state(&self) -> AssemblerState {
        self.assembler.state()
    }

    /// Framing and decoding counters since the last `start`
    #[must_use]
    pub fn stats(&self) -> FramingStats {
        FramingStats {
            unknown_packets: self.unknown_packets,
            short_payloads: self.short_payloads,
            ..*self.assembler.stats()
        }
    }

    /// Borrow the listener
    #[must_use]
    pub const fn listener(&self) -> &L {
        &self.listener
    }

    /// Mutably borrow the listener
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Consume the session and return the listener
    pub fn into_listener(self) -> L {
        self.listener
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{Frame, PacketType, STATUS_SENSOR_OFF},
        types::SensorStatus,
    };

    #[derive(Debug, Default)]
    struct Recorder {
        vitals: Vec<OxiParams>,
        samples: Vec<i16>,
    }

    impl MeasurementListener for Recorder {
        fn on_vital_signs(&mut self, params: &OxiParams) {
            self.vitals.push(*params);
        }

        fn on_waveform_sample(&mut self, amplitude: i16) {
            self.samples.push(amplitude);
        }
    }

    fn started() -> OximeterSession<Recorder> {
        let mut session = OximeterSession::new(Recorder::default());
        session.start();
        session
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = OximeterSession::new(Recorder::default());
        assert!(!session.is_active());

        session.start();
        assert!(session.is_active());
        assert_eq!(session.state(), AssemblerState::Scanning);

        session.stop();
        assert!(!session.is_active());
    }

    #[test]
    fn test_vital_signs_dispatch() {
        let mut session = started();
        let count = session.ingest(&Frame::vital_signs(0x00, 98, 72, 25).to_bytes());

        assert_eq!(count, 1);
        assert_eq!(
            session.listener().vitals,
            vec![OxiParams {
                spo2: Some(98),
                pulse_rate: Some(72),
                pi: Some(2.5),
                sensor: SensorStatus::Normal,
            }]
        );
        assert!(session.listener().samples.is_empty());
    }

    #[test]
    fn test_sensor_off_dispatches_sentinels() {
        let mut session = started();
        session.ingest(&Frame::vital_signs(STATUS_SENSOR_OFF, 0, 0, 0).to_bytes());

        let vitals = &session.listener().vitals;
        assert_eq!(vitals.len(), 1);
        assert_eq!(vitals[0].spo2, None);
        assert_eq!(vitals[0].pulse_rate, None);
        assert_eq!(vitals[0].pi, None);
        assert_eq!(vitals[0].sensor, SensorStatus::SensorOff);
    }

    #[test]
    fn test_k_frames_give_k_callbacks_in_order() {
        let mut session = started();
        let stream: Vec<u8> = (1..=10u8)
            .flat_map(|i| Frame::vital_signs(0x00, 90 + i, 60 + i, i).to_bytes())
            .collect();

        assert_eq!(session.ingest(&stream), 10);
        let spo2: Vec<Option<u8>> = session.listener().vitals.iter().map(|p| p.spo2).collect();
        let expected: Vec<Option<u8>> = (1..=10u8).map(|i| Some(90 + i)).collect();
        assert_eq!(spo2, expected);
    }

    #[test]
    fn test_mixed_stream_preserves_order() {
        let mut decoded = Vec::new();
        let mut session = OximeterSession::new(|d: Decoded| decoded.push(d));
        session.start();

        let mut stream = Frame::waveform(&[1, 2]).to_bytes().to_vec();
        stream.extend(Frame::vital_signs(0x00, 97, 70, 15).to_bytes().to_vec());
        stream.extend(Frame::waveform(&[3]).to_bytes().to_vec());

        for chunk in stream.chunks(4) {
            session.ingest(chunk);
        }
        drop(session);

        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0], Decoded::WaveformSample(1));
        assert_eq!(decoded[1], Decoded::WaveformSample(2));
        assert!(matches!(decoded[2], Decoded::VitalSigns(p) if p.spo2 == Some(97)));
        assert_eq!(decoded[3], Decoded::WaveformSample(3));
    }

    #[test]
    fn test_stop_mid_frame_yields_no_phantom() {
        let mut session = started();
        let partial = Frame::vital_signs(0x00, 80, 100, 5).to_bytes();
        assert_eq!(session.ingest(&partial[..5]), 0);

        session.stop();
        session.start();

        let fresh = Frame::vital_signs(0x00, 99, 65, 40).to_bytes();
        assert_eq!(session.ingest(&fresh), 1);
        assert_eq!(session.listener().vitals.len(), 1);
        assert_eq!(session.listener().vitals[0].spo2, Some(99));
    }

    #[test]
    fn test_ingest_after_stop_is_ignored() {
        let mut session = started();
        session.stop();

        let count = session.ingest(&Frame::waveform(&[7]).to_bytes());
        assert_eq!(count, 0);
        assert!(session.listener().samples.is_empty());
        assert_eq!(session.stats().bytes_dropped_idle, 6);
    }

    #[test]
    fn test_unknown_packet_type_is_skipped() {
        let mut session = started();
        let mut stream = Frame::new(0x99, vec![1_u8, 2, 3]).to_bytes().to_vec();
        stream.extend_from_slice(&Frame::waveform(&[9]).to_bytes());

        assert_eq!(session.ingest(&stream), 1);
        assert_eq!(session.listener().samples, vec![9]);
        assert_eq!(session.stats().unknown_packets, 1);
        assert_eq!(session.stats().frames_validated, 2);
    }

    #[test]
    fn test_short_payload_is_discarded() {
        let mut session = started();
        let mut stream = Frame::new(PacketType::Spo2Params as u8, vec![0x00_u8, 98])
            .to_bytes()
            .to_vec();
        stream.extend_from_slice(&Frame::vital_signs(0x00, 96, 88, 20).to_bytes());

        assert_eq!(session.ingest(&stream), 1);
        assert_eq!(session.listener().vitals[0].spo2, Some(96));
        assert_eq!(session.stats().short_payloads, 1);
    }

    #[test]
    fn test_corruption_followed_by_valid_frame() {
        let mut session = started();
        let mut stream = Frame::vital_signs(0x00, 98, 72, 25).to_bytes().to_vec();
        stream[6] = 0x00;
        stream.extend_from_slice(&Frame::vital_signs(0x00, 94, 77, 18).to_bytes());

        assert_eq!(session.ingest(&stream), 1);
        assert_eq!(session.listener().vitals[0].spo2, Some(94));
        assert_eq!(session.stats().checksum_failures, 1);
    }

    #[test]
    fn test_start_resets_decode_counters() {
        let mut session = started();
        session.ingest(&Frame::new(0x42, vec![0_u8]).to_bytes());
        assert_eq!(session.stats().unknown_packets, 1);

        session.start();
        assert_eq!(session.stats(), FramingStats::default());
    }

    #[test]
    fn test_with_config_rejects_invalid_limits() {
        let config = AssemblerConfig {
            max_buffer_len: 4,
            max_frame_len: 32,
        };
        let result = OximeterSession::with_config(Recorder::default(), config);
        assert!(matches!(result, Err(OximeterError::InvalidConfig(_))));
    }

    #[test]
    fn test_into_listener_returns_collected_data() {
        let mut session = started();
        session.ingest(&Frame::waveform(&[4, 5, 6]).to_bytes());
        let recorder = session.into_listener();
        assert_eq!(recorder.samples, vec![4, 5, 6]);
    }
}
