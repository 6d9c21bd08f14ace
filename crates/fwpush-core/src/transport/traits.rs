//! MQTT transport abstraction.
//!
//! Defines the `MqttTransport` trait the session controller drives,
//! allowing different implementations (TCP/TLS, mock, etc.).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::constants::*;
use crate::protocol::{ConnAck, ConnectRequest, PublishRequest};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("Failed to connect to {host}:{port}: {message}")]
    ConnectFailed {
        host: String,
        port: u16,
        message: String,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Numeric status code reported alongside the message.
    pub fn code(&self) -> i32 {
        match self {
            TransportError::BadArgument(_) => MQTT_CODE_ERROR_BAD_ARG,
            TransportError::ConnectFailed { .. } => MQTT_CODE_ERROR_NETWORK,
            TransportError::Tls(_) => MQTT_CODE_ERROR_TLS_CONNECT,
            TransportError::Timeout { .. } => MQTT_CODE_ERROR_TIMEOUT,
            TransportError::NotConnected => MQTT_CODE_ERROR_NOT_CONNECTED,
            TransportError::Protocol(_) => MQTT_CODE_ERROR_MALFORMED_DATA,
            TransportError::Network(_) | TransportError::Io(_) => MQTT_CODE_ERROR_NETWORK,
        }
    }
}

/// Trust configuration for a secured connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// PEM file with the CA certificates to trust. When absent the
    /// bundled web PKI roots are used.
    pub ca_file: Option<PathBuf>,
}

/// Parameters for opening the network connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConnectOptions {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    /// `Some` to secure the connection with TLS.
    pub tls: Option<TlsOptions>,
}

/// Abstract MQTT client transport.
///
/// This trait enables:
/// - Production implementation over TCP, optionally TLS
/// - Mock implementation for unit testing
///
/// QoS acknowledgement handshakes for `publish` are the implementation's
/// job; the caller only sees the final outcome.
pub trait MqttTransport: Send {
    /// Prepare the transport before any connection is made.
    fn init(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Open the network connection.
    fn net_connect(&mut self, opts: &NetConnectOptions) -> Result<(), TransportError>;

    /// Send CONNECT and wait for CONNACK.
    fn send_connect(&mut self, req: &ConnectRequest) -> Result<ConnAck, TransportError>;

    /// Send PUBLISH and complete the acknowledgement flow for its QoS.
    fn publish(&mut self, req: &PublishRequest<'_>) -> Result<(), TransportError>;

    /// Send DISCONNECT.
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Close the network connection.
    fn net_disconnect(&mut self) -> Result<(), TransportError>;

    /// Release transport resources.
    fn deinit(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
