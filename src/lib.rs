#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Oxistream
//!
//! Streaming decoder for the binary protocol spoken by BLE pulse oximeters.
//!
//! An oximeter pushes its readings through a single notify characteristic.
//! Each notification is an arbitrary slice of one continuous byte stream: it
//! may hold several frames, part of a frame, or line noise. This crate turns
//! that stream back into measurements:
//!
//! - **Vital signs**: SpO2, pulse rate and perfusion index, roughly once a second
//! - **Plethysmograph waveform**: one amplitude per sample, at the device's
//!   waveform rate
//!
//! ## Architecture
//!
//! - [`assembler::FrameAssembler`] buffers notification data and extracts
//!   validated frames, resynchronizing after corruption
//! - [`protocol`] holds the wire format and the per-frame measurement decoder
//! - [`OximeterSession`] brackets one connection and dispatches measurements
//!   to a [`MeasurementListener`]
//! - `notifications` (with the `tokio` feature) drives a session from an
//!   async notification stream
//!
//! Decoding is synchronous and allocation-light. Nothing here spawns threads,
//! blocks, or talks to a Bluetooth stack; connect to the device with whatever
//! BLE library the host uses and hand its notification payloads to
//! [`OximeterSession::ingest`].
//!
//! ## Quick Start
//!
//! ```
//! use oxistream::{protocol::Frame, MeasurementListener, OxiParams, OximeterSession};
//!
//! struct Printer;
//!
//! impl MeasurementListener for Printer {
//!     fn on_vital_signs(&mut self, params: &OxiParams) {
//!         println!("{params}");
//!     }
//!
//!     fn on_waveform_sample(&mut self, amplitude: i16) {
//!         println!("pleth {amplitude}");
//!     }
//! }
//!
//! let mut session = OximeterSession::new(Printer);
//! session.start();
//!
//! // Normally these bytes come from BLE notifications
//! let bytes = Frame::vital_signs(0x00, 98, 72, 25).to_bytes();
//! session.ingest(&bytes[..5]);
//! session.ingest(&bytes[5..]);
//!
//! session.stop();
//! ```

/// Frame reassembly over a fragmented byte stream
pub mod assembler;
/// Error types and handling
pub mod error;
/// Async notification stream glue
#[cfg(feature = "tokio")]
pub mod notifications;
/// Wire format and measurement decoding
pub mod protocol;
/// Connection-scoped decoding session
pub mod session;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use assembler::FrameAssembler;
pub use error::{OximeterError, Result};
pub use session::{MeasurementListener, OximeterSession};
pub use types::{
    AssemblerConfig, AssemblerState, Decoded, FramingStats, OxiParams, SensorStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
