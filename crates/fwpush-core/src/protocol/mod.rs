//! Protocol module - package layout and MQTT definitions.

pub mod ack;
pub mod constants;
pub mod header;
pub mod message;

pub use ack::{ConnAck, ConnectReturnCode};
pub use constants::*;
pub use header::{FirmwareHeader, HeaderError};
pub use message::{ConnectRequest, InvalidQos, LastWill, PublishRequest, QoS};
