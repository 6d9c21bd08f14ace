//! fwpush-core: signed firmware packaging and MQTT publishing in Rust.
//!
//! This crate signs a firmware image with an ephemeral P-256 key, packs the
//! signature, the public key and the image behind a small length header,
//! and publishes the result to an MQTT broker in one session.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Package header, MQTT 3.1.1 packets and CONNACK codes
//! - **Crypto**: Key generation, signing and verification
//! - **Payload**: Firmware loading and package assembly
//! - **Transport**: MQTT client abstraction (TCP/TLS, mock)
//! - **State**: Session state machine and controller
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: Configuration and high-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use fwpush_core::session::{PushSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     firmware_path: "firmware.bin".into(),
//!     host: "broker.local".to_string(),
//!     ..Default::default()
//! };
//!
//! let report = PushSession::new(config).run_tcp().expect("push failed");
//! std::process::exit(report.exit_code());
//! ```

pub mod crypto;
pub mod error;
pub mod events;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use crypto::{Keypair, SignatureAlgorithm};
pub use error::{ErrorKind, PushError};
pub use events::{LogLevel, NullObserver, PushEvent, PushObserver, TracingObserver};
pub use payload::{FirmwareImage, SignedPackage, build_package, load_file};
pub use protocol::{ConnAck, FirmwareHeader, QoS};
pub use session::{ConfigError, LastWillConfig, PushSession, SessionConfig, SessionParams};
pub use state::{SessionController, SessionReport, SessionState, SessionStep, StopFlag};
pub use transport::{MockTransport, MqttTransport, TcpTransport, TransportError};
