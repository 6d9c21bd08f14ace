//! Mock MQTT transport for testing.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use super::traits::{MqttTransport, NetConnectOptions, TransportError};
use crate::protocol::{ConnAck, ConnectRequest, PublishRequest, QoS};

/// Transport operation, used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Init,
    NetConnect,
    Connect,
    Publish,
    Disconnect,
    NetDisconnect,
    Deinit,
}

impl fmt::Display for MockOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Init,
    NetConnect {
        host: String,
        port: u16,
        tls: bool,
    },
    Connect(ConnectRequest),
    Publish {
        topic: String,
        qos: QoS,
        retain: bool,
        duplicate: bool,
        packet_id: u16,
        payload: Vec<u8>,
    },
    Disconnect,
    NetDisconnect,
    Deinit,
}

impl MockCall {
    pub fn op(&self) -> MockOp {
        match self {
            MockCall::Init => MockOp::Init,
            MockCall::NetConnect { .. } => MockOp::NetConnect,
            MockCall::Connect(_) => MockOp::Connect,
            MockCall::Publish { .. } => MockOp::Publish,
            MockCall::Disconnect => MockOp::Disconnect,
            MockCall::NetDisconnect => MockOp::NetDisconnect,
            MockCall::Deinit => MockOp::Deinit,
        }
    }
}

struct MockState {
    calls: Vec<MockCall>,
    failures: HashSet<MockOp>,
    conn_ack: ConnAck,
    open: bool,
}

/// Mock transport for unit testing session logic.
///
/// Clones share state, so a test can keep a handle while the session owns
/// the transport.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                failures: HashSet::new(),
                conn_ack: ConnAck::accepted(false),
                open: false,
            })),
        }
    }

    /// Make the given operation fail from now on.
    pub fn fail_on(&self, op: MockOp) {
        self.state.lock().unwrap().failures.insert(op);
    }

    /// Set the CONNACK returned by the broker.
    pub fn set_conn_ack(&self, ack: ConnAck) {
        self.state.lock().unwrap().conn_ack = ack;
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls of `op`.
    pub fn count(&self, op: MockOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    /// Recorded operations in order.
    pub fn ops(&self) -> Vec<MockOp> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(MockCall::op)
            .collect()
    }

    /// Whether a network connection is currently held open.
    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn record(&self, call: MockCall) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        let op = call.op();
        state.calls.push(call);
        if state.failures.contains(&op) {
            return Err(TransportError::Network(format!("injected {} failure", op)));
        }
        if matches!(op, MockOp::Connect | MockOp::Publish | MockOp::Disconnect) && !state.open {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttTransport for MockTransport {
    fn init(&mut self) -> Result<(), TransportError> {
        self.record(MockCall::Init)
    }

    fn net_connect(&mut self, opts: &NetConnectOptions) -> Result<(), TransportError> {
        self.record(MockCall::NetConnect {
            host: opts.host.clone(),
            port: opts.port,
            tls: opts.tls.is_some(),
        })?;
        self.state.lock().unwrap().open = true;
        Ok(())
    }

    fn send_connect(&mut self, req: &ConnectRequest) -> Result<ConnAck, TransportError> {
        self.record(MockCall::Connect(req.clone()))?;
        Ok(self.state.lock().unwrap().conn_ack)
    }

    fn publish(&mut self, req: &PublishRequest<'_>) -> Result<(), TransportError> {
        self.record(MockCall::Publish {
            topic: req.topic.to_string(),
            qos: req.qos,
            retain: req.retain,
            duplicate: req.duplicate,
            packet_id: req.packet_id,
            payload: req.payload.to_vec(),
        })
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.record(MockCall::Disconnect)
    }

    fn net_disconnect(&mut self) -> Result<(), TransportError> {
        // The handle is released even when closing reports an error.
        let result = self.record(MockCall::NetDisconnect);
        self.state.lock().unwrap().open = false;
        result
    }

    fn deinit(&mut self) -> Result<(), TransportError> {
        self.record(MockCall::Deinit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn opts() -> NetConnectOptions {
        NetConnectOptions {
            host: "broker".into(),
            port: 1883,
            timeout: Duration::from_millis(10),
            tls: None,
        }
    }

    #[test]
    fn test_mock_records_calls() {
        let mut mock = MockTransport::new();
        let handle = mock.clone();
        mock.init().unwrap();
        mock.net_connect(&opts()).unwrap();
        assert!(handle.is_open());
        mock.net_disconnect().unwrap();
        assert!(!handle.is_open());
        assert_eq!(
            handle.ops(),
            vec![MockOp::Init, MockOp::NetConnect, MockOp::NetDisconnect]
        );
    }

    #[test]
    fn test_mock_injected_failure() {
        let mut mock = MockTransport::new();
        mock.fail_on(MockOp::NetConnect);
        assert!(mock.net_connect(&opts()).is_err());
        assert!(!mock.is_open());
        assert_eq!(mock.count(MockOp::NetConnect), 1);
    }

    #[test]
    fn test_mock_requires_connection() {
        let mut mock = MockTransport::new();
        assert!(matches!(mock.disconnect(), Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_mock_conn_ack() {
        let mut mock = MockTransport::new();
        mock.set_conn_ack(ConnAck::accepted(true));
        mock.net_connect(&opts()).unwrap();
        let req = ConnectRequest {
            client_id: "id".into(),
            keep_alive_sec: 10,
            clean_session: true,
            last_will: None,
            username: None,
            password: None,
        };
        assert!(mock.send_connect(&req).unwrap().session_present);
        assert_eq!(mock.calls()[1], MockCall::Connect(req));
    }
}
