//! CONNACK outcome.
//!
//! The broker answers CONNECT with a session-present flag and a return
//! code. Only return code 0 admits the session.

use std::fmt;

/// CONNACK return code (MQTT 3.1.1 §3.2.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadUserNameOrPassword,
    NotAuthorized,
    /// Reserved values the broker should never send.
    Reserved(u8),
}

impl ConnectReturnCode {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            other => Self::Reserved(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::UnacceptableProtocolVersion => 1,
            Self::IdentifierRejected => 2,
            Self::ServerUnavailable => 3,
            Self::BadUserNameOrPassword => 4,
            Self::NotAuthorized => 5,
            Self::Reserved(b) => *b,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "Connection Accepted"),
            Self::UnacceptableProtocolVersion => write!(f, "Unacceptable Protocol Version"),
            Self::IdentifierRejected => write!(f, "Identifier Rejected"),
            Self::ServerUnavailable => write!(f, "Server Unavailable"),
            Self::BadUserNameOrPassword => write!(f, "Bad User Name or Password"),
            Self::NotAuthorized => write!(f, "Not Authorized"),
            Self::Reserved(b) => write!(f, "Reserved ({})", b),
        }
    }
}

/// Parsed CONNACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub return_code: ConnectReturnCode,
    pub session_present: bool,
}

impl ConnAck {
    pub fn accepted(session_present: bool) -> Self {
        Self {
            return_code: ConnectReturnCode::Accepted,
            session_present,
        }
    }

    pub fn refused(return_code: ConnectReturnCode) -> Self {
        Self {
            return_code,
            session_present: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code.is_success()
    }
}

impl fmt::Display for ConnAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Return Code {}, Session Present {}",
            self.return_code.as_byte(),
            u8::from(self.session_present)
        )
    }
}
