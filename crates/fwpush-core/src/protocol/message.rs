//! MQTT request parameters handed to a transport.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid QoS value: {0}")]
pub struct InvalidQos(pub u8);

/// Delivery guarantee negotiated for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    #[default]
    ExactlyOnce = 2,
}

impl QoS {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this level carries a packet identifier.
    pub fn needs_packet_id(self) -> bool {
        self != QoS::AtMostOnce
    }
}

impl TryFrom<u8> for QoS {
    type Error = InvalidQos;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(InvalidQos(other)),
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QoS::AtMostOnce => write!(f, "QoS 0 (at most once)"),
            QoS::AtLeastOnce => write!(f, "QoS 1 (at least once)"),
            QoS::ExactlyOnce => write!(f, "QoS 2 (exactly once)"),
        }
    }
}

/// Last will and testament registered with the broker at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// CONNECT request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub client_id: String,
    pub keep_alive_sec: u16,
    pub clean_session: bool,
    pub last_will: Option<LastWill>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// PUBLISH request parameters. The payload is borrowed from the package.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub duplicate: bool,
    /// Session-issued identifier; unused at QoS 0.
    pub packet_id: u16,
    pub payload: &'a [u8],
}
