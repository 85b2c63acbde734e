use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::{OximeterError, Result},
    session::{MeasurementListener, OximeterSession},
    types::{Decoded, OxiParams},
};

/// Listener that forwards every measurement over an unbounded channel
///
/// Sending never blocks, so the decoding thread is never held up by a slow
/// consumer.
#[derive(Debug)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<Decoded>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Decoded>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, decoded: Decoded) {
        if self.sender.send(decoded).is_err() {
            debug!("Measurement receiver dropped, discarding {:?}", decoded);
        }
    }
}

impl MeasurementListener for ChannelListener {
    fn on_vital_signs(&mut self, params: &OxiParams) {
        self.forward(Decoded::VitalSigns(*params));
    }

    fn on_waveform_sample(&mut self, amplitude: i16) {
        self.forward(Decoded::WaveformSample(amplitude));
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Drive a session from a stream of notification payloads
///
/// Starts the session, ingests each payload as it arrives and stops the
/// session when the stream ends, mirroring one connect/disconnect cycle.
/// Returns the total number of measurements dispatched.
///
/// # Errors
///
/// Returns [`OximeterError::Disconnected`] if the listener reports its
/// consumer is gone. The session is stopped before returning.
///
/// # Examples
///
/// ```
/// use futures::stream;
/// use oxistream::{notifications::{pump, ChannelListener}, protocol::Frame, OximeterSession};
///
/// # tokio_test::block_on(async {
/// let (listener, mut rx) = ChannelListener::new();
/// let mut session = OximeterSession::new(listener);
///
/// let bytes = Frame::waveform(&[1, 2, 3]).to_bytes();
/// let chunks = stream::iter(vec![bytes[..4].to_vec(), bytes[4..].to_vec()]);
///
/// assert_eq!(pump(&mut session, chunks).await.unwrap(), 3);
/// assert!(rx.recv().await.is_some());
/// # });
/// ```
pub async fn pump<L, S, B>(session: &mut OximeterSession<L>, notifications: S) -> Result<usize>
where
    L: MeasurementListener,
    S: Stream<Item = B>,
    B: AsRef<[u8]>,
{
    let mut notifications = std::pin::pin!(notifications);
    let mut total = 0;

    session.start();

    while let Some(chunk) = notifications.next().await {
        total += session.ingest(chunk.as_ref());

        if session.listener().is_closed() {
            warn!("Measurement consumer disconnected, stopping session");
            session.stop();
            return Err(OximeterError::Disconnected);
        }
    }

    info!("Notification stream ended after {} measurements", total);
    session.stop();

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;
    use futures::stream;

    fn notification_chunks(frames: &[Frame], mtu: usize) -> Vec<Vec<u8>> {
        let bytes: Vec<u8> = frames.iter().flat_map(Frame::to_bytes).collect();
        bytes.chunks(mtu).map(<[u8]>::to_vec).collect()
    }

    #[tokio::test]
    async fn test_pump_forwards_in_order() {
        let (listener, mut rx) = ChannelListener::new();
        let mut session = OximeterSession::new(listener);

        let frames = vec![
            Frame::waveform(&[10, 11, 12]),
            Frame::vital_signs(0x00, 98, 72, 25),
            Frame::waveform(&[13]),
        ];
        let chunks = notification_chunks(&frames, 5);

        let total = pump(&mut session, stream::iter(chunks)).await.unwrap();
        assert_eq!(total, 5);
        assert!(!session.is_active());

        let mut received = Vec::new();
        while let Ok(decoded) = rx.try_recv() {
            received.push(decoded);
        }

        assert_eq!(received.len(), 5);
        assert_eq!(received[0], Decoded::WaveformSample(10));
        assert_eq!(received[2], Decoded::WaveformSample(12));
        assert!(matches!(received[3], Decoded::VitalSigns(p) if p.pi == Some(2.5)));
        assert_eq!(received[4], Decoded::WaveformSample(13));
    }

    #[tokio::test]
    async fn test_pump_matches_one_shot_ingest() {
        let frames: Vec<Frame> = (0..8u8)
            .map(|i| Frame::vital_signs(0x00, 90 + i, 70, 10 + i))
            .collect();

        let mut one_shot = Vec::new();
        let mut reference = OximeterSession::new(|d: Decoded| one_shot.push(d));
        reference.start();
        for chunk in notification_chunks(&frames, usize::MAX) {
            reference.ingest(&chunk);
        }
        drop(reference);

        let (listener, mut rx) = ChannelListener::new();
        let mut session = OximeterSession::new(listener);
        pump(&mut session, stream::iter(notification_chunks(&frames, 3)))
            .await
            .unwrap();

        let mut pumped = Vec::new();
        while let Ok(decoded) = rx.try_recv() {
            pumped.push(decoded);
        }
        assert_eq!(pumped, one_shot);
    }

    #[tokio::test]
    async fn test_pump_reports_disconnected_consumer() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        let mut session = OximeterSession::new(listener);

        let chunks = notification_chunks(&[Frame::waveform(&[1])], 20);
        let result = pump(&mut session, stream::iter(chunks)).await;

        assert_eq!(result, Err(OximeterError::Disconnected));
        assert!(!session.is_active());
    }

    #[test]
    fn test_pump_empty_stream() {
        let (listener, _rx) = ChannelListener::new();
        let mut session = OximeterSession::new(listener);

        let total = tokio_test::block_on(pump(&mut session, stream::iter(Vec::<Vec<u8>>::new())));
        assert_eq!(total, Ok(0));
        assert!(!session.is_active());
    }

    #[test]
    fn test_channel_listener_reports_closed() {
        let (listener, rx) = ChannelListener::new();
        assert!(!listener.is_closed());
        drop(rx);
        assert!(listener.is_closed());
    }
}
