//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to follow a push without tight
//! coupling to the core logic.

use crate::protocol::ConnAck;
use crate::state::machine::{SessionState, SessionStep};

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted during a push.
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// Signed package assembled.
    PackageBuilt {
        signature_len: u32,
        public_key_len: u32,
        firmware_len: u32,
        total_len: usize,
    },
    /// Session state changed.
    StateChanged { from: SessionState, to: SessionState },
    /// Outcome of a session step with its status code.
    Status {
        step: SessionStep,
        code: i32,
        message: String,
    },
    /// CONNACK received from the broker.
    ConnAckReceived { ack: ConnAck },
    /// Package published.
    Published {
        topic: String,
        packet_id: u16,
        length: usize,
    },
    /// Stop requested; remaining forward steps skipped.
    Interrupted { before: SessionStep },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Session finished.
    Complete { success: bool },
}

/// Observer trait for receiving push events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait PushObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &PushEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl PushObserver for NullObserver {
    fn on_event(&self, _event: &PushEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl PushObserver for TracingObserver {
    fn on_event(&self, event: &PushEvent) {
        match event {
            PushEvent::PackageBuilt {
                signature_len,
                public_key_len,
                firmware_len,
                total_len,
            } => {
                tracing::info!(
                    sig = signature_len,
                    key = public_key_len,
                    file = firmware_len,
                    total = total_len,
                    "Firmware message built"
                );
            }
            PushEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "State changed");
            }
            PushEvent::Status {
                step,
                code,
                message,
            } => {
                if *code == 0 {
                    tracing::info!(code = code, "{}: {}", step, message);
                } else {
                    tracing::error!(code = code, "{}: {}", step, message);
                }
            }
            PushEvent::ConnAckReceived { ack } => {
                tracing::info!(
                    return_code = ack.return_code.as_byte(),
                    session_present = ack.session_present,
                    "MQTT Connect Ack: {}",
                    ack.return_code
                );
            }
            PushEvent::Published {
                topic,
                packet_id,
                length,
            } => {
                tracing::info!(topic = %topic, packet_id = packet_id, len = length, "Firmware published");
            }
            PushEvent::Interrupted { before } => {
                tracing::warn!(before = %before, "Stop requested, skipping to teardown");
            }
            PushEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            PushEvent::Complete { success } => {
                if *success {
                    tracing::info!("Firmware push complete");
                } else {
                    tracing::warn!("Firmware push finished with errors");
                }
            }
        }
    }
}
