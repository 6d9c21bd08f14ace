//! Top-level error type for a push and its classification.

use std::fmt;

use thiserror::Error;

use crate::crypto::KeyGenError;
use crate::payload::{LoadError, PackageError};
use crate::protocol::constants::*;
use crate::session::ConfigError;

/// Broad class of a failure, used to pick the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or arguments.
    Input,
    /// Firmware file could not be read.
    Load,
    /// Key generation, export or signing failed.
    Crypto,
    /// Package lengths do not fit the header.
    Assembly,
    /// Socket, TLS or timeout failure.
    Network,
    /// Unexpected or refused broker response.
    Protocol,
}

impl ErrorKind {
    /// Classify a step status code. `None` for success.
    pub fn from_status_code(code: i32) -> Option<ErrorKind> {
        match code {
            MQTT_CODE_SUCCESS => None,
            c if c > 0 => Some(ErrorKind::Protocol),
            MQTT_CODE_ERROR_MALFORMED_DATA => Some(ErrorKind::Protocol),
            MQTT_CODE_ERROR_BAD_ARG => Some(ErrorKind::Input),
            _ => Some(ErrorKind::Network),
        }
    }

    /// Process exit status for this kind of failure.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Input => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Input => "input",
            ErrorKind::Load => "load",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Assembly => "assembly",
            ErrorKind::Network => "network",
            ErrorKind::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Key generation failed: {0}")]
    KeyGen(#[from] KeyGenError),

    #[error(transparent)]
    Package(#[from] PackageError),
}

impl PushError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PushError::Config(_) => ErrorKind::Input,
            PushError::KeyGen(_) => ErrorKind::Crypto,
            PushError::Package(PackageError::Load(LoadError::EmptyPath)) => ErrorKind::Input,
            PushError::Package(PackageError::Load(_)) => ErrorKind::Load,
            PushError::Package(PackageError::Export(_) | PackageError::Sign(_)) => {
                ErrorKind::Crypto
            }
            PushError::Package(PackageError::Assembly(_) | PackageError::Header(_)) => {
                ErrorKind::Assembly
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}
