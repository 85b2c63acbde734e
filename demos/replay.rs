use futures::stream;
use oxistream::{
    notifications::{pump, ChannelListener},
    protocol::{Frame, STATUS_SENSOR_OFF},
    Decoded, OximeterSession, Result,
};
use tracing::info;

/// Typical BLE notification payload size with the default ATT MTU
const NOTIFICATION_SIZE: usize = 20;

/// Build a few seconds of device output: pleth frames of five samples each,
/// one vital-sign frame per second, a corrupted frame and a sensor-off period.
fn synthetic_recording() -> Vec<u8> {
    let mut bytes = Vec::new();

    for second in 0..6u8 {
        for batch in 0..20u8 {
            let samples: Vec<u8> = (0..5u8)
                .map(|i| {
                    let phase = f32::from(batch * 5 + i) / 100.0 * std::f32::consts::TAU;
                    (50.0 + 40.0 * phase.sin()) as u8
                })
                .collect();
            bytes.extend_from_slice(&Frame::waveform(&samples).to_bytes());
        }

        let vitals = if second == 4 {
            Frame::vital_signs(STATUS_SENSOR_OFF, 0, 0, 0)
        } else {
            Frame::vital_signs(0x00, 97 + second % 2, 70 + second, 20 + second)
        };
        let mut encoded = vitals.to_bytes().to_vec();
        if second == 2 {
            encoded[5] ^= 0x10;
        }
        bytes.extend_from_slice(&encoded);
    }

    bytes
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Replaying synthetic oximeter notifications");

    let recording = synthetic_recording();
    let notifications: Vec<Vec<u8>> = recording
        .chunks(NOTIFICATION_SIZE)
        .map(<[u8]>::to_vec)
        .collect();
    info!(
        "{} bytes split into {} notifications",
        recording.len(),
        notifications.len()
    );

    let (listener, mut rx) = ChannelListener::new();
    let mut session = OximeterSession::new(listener);

    let total = pump(&mut session, stream::iter(notifications)).await?;

    let mut samples = 0usize;
    let mut peak = i16::MIN;
    while let Ok(decoded) = rx.try_recv() {
        match decoded {
            Decoded::VitalSigns(params) => println!("{params}"),
            Decoded::WaveformSample(amplitude) => {
                samples += 1;
                peak = peak.max(amplitude);
            }
        }
    }

    let stats = session.stats();
    println!("\nSummary");
    println!("  Measurements:      {total}");
    println!("  Waveform samples:  {samples} (peak {peak})");
    println!("  Frames validated:  {}", stats.frames_validated);
    println!("  Checksum failures: {}", stats.checksum_failures);
    println!("  Bytes discarded:   {}", stats.bytes_discarded);

    Ok(())
}
