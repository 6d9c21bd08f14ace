//! Transport layer module.

pub mod mock;
pub mod tcp;
pub mod traits;

pub use mock::{MockCall, MockOp, MockTransport};
pub use tcp::TcpTransport;
pub use traits::{MqttTransport, NetConnectOptions, TlsOptions, TransportError};
