//! Push session - configuration and the high-level orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::crypto::{Keypair, SignatureAlgorithm};
use crate::error::PushError;
use crate::events::{LogLevel, PushEvent, PushObserver, TracingObserver};
use crate::payload::{SignedPackage, build_package};
use crate::protocol::constants::*;
use crate::protocol::{ConnectRequest, LastWill, QoS};
use crate::state::{SessionController, SessionReport, StopFlag};
use crate::transport::{MqttTransport, NetConnectOptions, TcpTransport, TlsOptions};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Firmware file path is required")]
    EmptyFirmwarePath,
    #[error("Invalid QoS {0}, must be 0, 1 or 2")]
    InvalidQos(u8),
    #[error("Invalid last will QoS {0}, must be 0, 1 or 2")]
    InvalidWillQos(u8),
    #[error("Password given without a username")]
    PasswordWithoutUsername,
    #[error("Client id must not be empty")]
    EmptyClientId,
    #[error("Publish topic must not be empty")]
    EmptyTopic,
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Last will settings. Unset fields fall back to the session's values.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastWillConfig {
    /// Will topic (default `lwttopic`).
    pub topic: Option<String>,
    /// Will payload (default: the client id).
    pub payload: Option<String>,
    /// Will QoS (default: the publish QoS).
    pub qos: Option<u8>,
    pub retain: bool,
}

/// Configuration for a push session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Firmware file to sign and publish.
    pub firmware_path: PathBuf,
    /// Broker host name or address.
    pub host: String,
    /// Broker port; 0 selects 1883, or 8883 with TLS.
    pub port: u16,
    /// Secure the connection with TLS.
    pub tls: bool,
    /// CA certificates (PEM) trusted for TLS.
    pub ca_file: Option<PathBuf>,
    /// Publish QoS, 0..=2.
    pub qos: u8,
    pub clean_session: bool,
    pub keep_alive_sec: u16,
    pub client_id: String,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    /// Register a last will when present.
    pub last_will: Option<LastWillConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            firmware_path: PathBuf::new(),
            host: DEFAULT_MQTT_HOST.to_string(),
            port: 0,
            tls: false,
            ca_file: None,
            qos: DEFAULT_MQTT_QOS,
            clean_session: true,
            keep_alive_sec: DEFAULT_KEEP_ALIVE_SEC,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            topic: FIRMWARE_TOPIC_NAME.to_string(),
            username: None,
            password: None,
            connect_timeout_ms: DEFAULT_CON_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_CMD_TIMEOUT_MS,
            last_will: None,
        }
    }
}

/// Validated session parameters, ready for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub firmware_path: PathBuf,
    pub net: NetConnectOptions,
    pub connect: ConnectRequest,
    pub topic: String,
    pub qos: QoS,
    pub command_timeout: Duration,
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: SessionConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("writing config {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Port actually used, resolving 0 to the protocol default.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.tls) {
            (0, false) => MQTT_DEFAULT_PORT,
            (0, true) => MQTT_SECURE_PORT,
            (port, _) => port,
        }
    }

    /// Check the configuration and resolve defaults.
    pub fn validate(&self) -> Result<SessionParams, ConfigError> {
        if self.firmware_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyFirmwarePath);
        }
        let qos = QoS::try_from(self.qos).map_err(|_| ConfigError::InvalidQos(self.qos))?;
        if self.client_id.is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        if self.topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::PasswordWithoutUsername);
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("connect_timeout_ms"));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("command_timeout_ms"));
        }

        let last_will = match &self.last_will {
            Some(will) => Some(LastWill {
                topic: will
                    .topic
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LWT_TOPIC.to_string()),
                payload: will
                    .payload
                    .as_deref()
                    .unwrap_or(&self.client_id)
                    .as_bytes()
                    .to_vec(),
                qos: match will.qos {
                    Some(q) => QoS::try_from(q).map_err(|_| ConfigError::InvalidWillQos(q))?,
                    None => qos,
                },
                retain: will.retain,
            }),
            None => None,
        };

        Ok(SessionParams {
            firmware_path: self.firmware_path.clone(),
            net: NetConnectOptions {
                host: self.host.clone(),
                port: self.effective_port(),
                timeout: Duration::from_millis(self.connect_timeout_ms),
                tls: self.tls.then(|| TlsOptions {
                    ca_file: self.ca_file.clone(),
                }),
            },
            connect: ConnectRequest {
                client_id: self.client_id.clone(),
                keep_alive_sec: self.keep_alive_sec,
                clean_session: self.clean_session,
                last_will,
                username: self.username.clone(),
                password: self.password.clone(),
            },
            topic: self.topic.clone(),
            qos,
            command_timeout: Duration::from_millis(self.command_timeout_ms),
        })
    }
}

/// Push session - signs a firmware file and publishes it once.
pub struct PushSession<O: PushObserver> {
    config: SessionConfig,
    observer: Arc<O>,
    algorithm: SignatureAlgorithm,
    stop: StopFlag,
}

impl PushSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: PushObserver> PushSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            observer,
            algorithm: SignatureAlgorithm::default(),
            stop: StopFlag::new(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Flag that stops the session at the next step boundary when set.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn emit(&self, event: PushEvent) {
        self.observer.on_event(&event);
    }

    /// Validate the configuration and build the signed package.
    ///
    /// Nothing touches the network here.
    pub fn prepare(&self) -> Result<(SessionParams, SignedPackage), PushError> {
        let params = self.config.validate()?;

        self.emit(PushEvent::Log {
            level: LogLevel::Debug,
            message: format!("Generating ephemeral key for {}", self.algorithm),
        });
        let key = Keypair::generate()?;
        let package = build_package(&params.firmware_path, &key, self.algorithm)?;

        let header = package.header();
        self.emit(PushEvent::PackageBuilt {
            signature_len: header.signature_len,
            public_key_len: header.public_key_len,
            firmware_len: header.firmware_len,
            total_len: package.len(),
        });
        Ok((params, package))
    }

    /// Run the complete push over `transport`.
    ///
    /// Configuration, load and signing failures are returned as errors
    /// before any transport call. Network and broker failures are recorded
    /// in the report.
    #[instrument(skip_all, fields(host = %self.config.host, topic = %self.config.topic))]
    pub fn run<T: MqttTransport>(&self, transport: T) -> Result<SessionReport, PushError> {
        let (params, package) = self.prepare()?;

        info!(
            port = params.net.port,
            qos = params.qos.as_u8(),
            tls = params.net.tls.is_some(),
            "Publishing firmware"
        );
        let controller =
            SessionController::new(transport, self.observer.clone(), params, self.stop.clone());
        let report = controller.run(&package);
        drop(package);

        self.emit(PushEvent::Complete {
            success: report.is_success(),
        });
        Ok(report)
    }

    /// Run the push over a TCP (optionally TLS) connection.
    pub fn run_tcp(&self) -> Result<SessionReport, PushError> {
        let transport = TcpTransport::new(Duration::from_millis(self.config.command_timeout_ms));
        self.run(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::transport::{MockOp, MockTransport};
    use tempfile::tempdir;

    fn config() -> SessionConfig {
        SessionConfig {
            firmware_path: "fw.bin".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let params = config().validate().unwrap();
        assert_eq!(params.net.host, "iot.eclipse.org");
        assert_eq!(params.net.port, 1883);
        assert_eq!(params.net.timeout, Duration::from_millis(5000));
        assert_eq!(params.command_timeout, Duration::from_millis(1000));
        assert!(params.net.tls.is_none());
        assert_eq!(params.qos, QoS::ExactlyOnce);
        assert_eq!(params.topic, "fwpush/example/firmware");
        assert_eq!(params.connect.client_id, "FwPushClient");
        assert_eq!(params.connect.keep_alive_sec, 60);
        assert!(params.connect.clean_session);
        assert!(params.connect.last_will.is_none());
    }

    #[test]
    fn test_tls_default_port() {
        let cfg = SessionConfig {
            tls: true,
            ca_file: Some("ca.pem".into()),
            ..config()
        };
        let params = cfg.validate().unwrap();
        assert_eq!(params.net.port, 8883);
        assert_eq!(
            params.net.tls,
            Some(TlsOptions {
                ca_file: Some("ca.pem".into())
            })
        );

        let cfg = SessionConfig {
            port: 1234,
            ..cfg
        };
        assert_eq!(cfg.effective_port(), 1234);
    }

    #[test]
    fn test_rejects_bad_values() {
        let cfg = SessionConfig {
            qos: 3,
            ..config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidQos(3)));

        let cfg = SessionConfig::default();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyFirmwarePath));

        let cfg = SessionConfig {
            password: Some("secret".into()),
            ..config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::PasswordWithoutUsername));

        let cfg = SessionConfig {
            client_id: String::new(),
            ..config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyClientId));

        let cfg = SessionConfig {
            last_will: Some(LastWillConfig {
                qos: Some(7),
                ..Default::default()
            }),
            ..config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidWillQos(7)));
    }

    #[test]
    fn test_session_keeps_config() {
        let cfg = SessionConfig {
            host: "broker.local".into(),
            ..config()
        };
        let session = PushSession::with_observer(cfg.clone(), Arc::new(NullObserver));
        assert_eq!(session.config(), &cfg);
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let cfg = SessionConfig {
            connect_timeout_ms: 0,
            ..config()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroTimeout("connect_timeout_ms"))
        );

        let cfg = SessionConfig {
            command_timeout_ms: 0,
            ..config()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroTimeout("command_timeout_ms"))
        );
    }

    #[test]
    fn test_last_will_defaults() {
        let cfg = SessionConfig {
            qos: 1,
            client_id: "dev-42".into(),
            last_will: Some(LastWillConfig::default()),
            ..config()
        };
        let will = cfg.validate().unwrap().connect.last_will.unwrap();
        assert_eq!(will.topic, "lwttopic");
        assert_eq!(will.payload, b"dev-42");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(!will.retain);
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fwpush.toml");
        let cfg = SessionConfig {
            host: "broker.local".into(),
            username: Some("user".into()),
            last_will: Some(LastWillConfig {
                topic: Some("status".into()),
                retain: true,
                ..Default::default()
            }),
            ..config()
        };
        cfg.save_to_file(&path).unwrap();
        assert_eq!(SessionConfig::load_from_file(&path).unwrap(), cfg);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: SessionConfig = toml::from_str("host = \"10.0.0.2\"\nqos = 1\n").unwrap();
        assert_eq!(cfg.host, "10.0.0.2");
        assert_eq!(cfg.qos, 1);
        assert_eq!(cfg.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(cfg.keep_alive_sec, DEFAULT_KEEP_ALIVE_SEC);
    }

    #[test]
    fn test_invalid_qos_makes_no_transport_calls() {
        let mock = MockTransport::new();
        let cfg = SessionConfig {
            qos: 3,
            ..config()
        };
        let session = PushSession::with_observer(cfg, Arc::new(NullObserver));
        let err = session.run(mock.clone()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_missing_firmware_makes_no_transport_calls() {
        let dir = tempdir().unwrap();
        let mock = MockTransport::new();
        let cfg = SessionConfig {
            firmware_path: dir.path().join("missing.bin"),
            ..Default::default()
        };
        let session = PushSession::with_observer(cfg, Arc::new(NullObserver));
        let err = session.run(mock.clone()).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(mock.count(MockOp::Init), 0);
    }
}
