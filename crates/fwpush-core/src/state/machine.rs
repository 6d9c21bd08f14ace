//! Session state machine for one firmware push.

use std::fmt;

use crate::protocol::ConnAck;
use crate::protocol::constants::MQTT_CODE_SUCCESS;

/// Connection state of a push session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing opened yet.
    #[default]
    Idle,
    /// Socket (and TLS, if enabled) established.
    NetworkConnected,
    /// CONNECT accepted by the broker.
    ProtocolConnected,
    /// Package published.
    Published,
    /// DISCONNECT sent.
    Disconnected,
    /// Socket closed. Terminal.
    NetworkClosed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::NetworkConnected => write!(f, "NETWORK_CONNECTED"),
            SessionState::ProtocolConnected => write!(f, "PROTOCOL_CONNECTED"),
            SessionState::Published => write!(f, "PUBLISHED"),
            SessionState::Disconnected => write!(f, "DISCONNECTED"),
            SessionState::NetworkClosed => write!(f, "NETWORK_CLOSED"),
        }
    }
}

/// One operation of a session, in the order `run` drives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStep {
    Init,
    NetConnect,
    Handshake,
    Publish,
    Disconnect,
    NetClose,
    Deinit,
}

impl fmt::Display for SessionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStep::Init => "MQTT Net Init",
            SessionStep::NetConnect => "MQTT Socket Connect",
            SessionStep::Handshake => "MQTT Connect",
            SessionStep::Publish => "MQTT Publish",
            SessionStep::Disconnect => "MQTT Disconnect",
            SessionStep::NetClose => "MQTT Socket Disconnect",
            SessionStep::Deinit => "MQTT Net DeInit",
        };
        f.write_str(name)
    }
}

impl SessionState {
    /// State reached by performing `step` from `self`, or `None` if the step
    /// is not allowed here.
    ///
    /// `Init` and `Deinit` wrap the connection and leave the state unchanged.
    pub fn next(self, step: SessionStep) -> Option<SessionState> {
        use SessionState::*;
        use SessionStep as S;

        match (self, step) {
            (Idle, S::Init) => Some(Idle),
            (Idle, S::NetConnect) => Some(NetworkConnected),
            (NetworkConnected, S::Handshake) => Some(ProtocolConnected),
            (ProtocolConnected, S::Publish) => Some(Published),
            (ProtocolConnected | Published, S::Disconnect) => Some(Disconnected),
            (NetworkClosed, S::NetClose) => None,
            (_, S::NetClose) => Some(NetworkClosed),
            (Idle | NetworkClosed, S::Deinit) => Some(self),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::NetworkClosed
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: SessionStep,
    /// 0 on success, negative transport code, or positive CONNACK refusal.
    pub code: i32,
    pub message: String,
}

impl StepRecord {
    pub fn success(step: SessionStep) -> Self {
        Self {
            step,
            code: MQTT_CODE_SUCCESS,
            message: "Success".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == MQTT_CODE_SUCCESS
    }
}

/// Everything a finished session reports.
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub steps: Vec<StepRecord>,
    pub final_state: SessionState,
    pub conn_ack: Option<ConnAck>,
    pub packet_id: Option<u16>,
    pub interrupted: bool,
}

impl SessionReport {
    /// True when the package was published and every step succeeded.
    pub fn is_success(&self) -> bool {
        !self.interrupted
            && self.packet_id.is_some()
            && self.steps.iter().any(|s| s.step == SessionStep::Publish)
            && self.steps.iter().all(StepRecord::is_success)
    }

    /// Process exit status: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn first_failure(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.is_success())
    }

    pub fn record(&self, step: SessionStep) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == step)
    }
}
