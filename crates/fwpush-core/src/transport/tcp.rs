//! TCP transport backed by the `rumqttc` client, optionally secured with rustls.
//!
//! `rumqttc` opens the socket and sends CONNECT in the same poll, and owns
//! keep-alive and the QoS acknowledgement flows. `net_connect` therefore
//! resolves the broker and prepares TLS, so those failures are reported
//! before the handshake is attempted.

use std::fs::File;
use std::io::{self, BufReader};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rumqttc::{
    Client, Connection, ConnectionError, Event, MqttOptions, Outgoing, Packet, RecvTimeoutError,
    TlsConfiguration, Transport,
};
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, info, instrument};

use super::traits::{MqttTransport, NetConnectOptions, TlsOptions, TransportError};
use crate::protocol::constants::*;
use crate::protocol::{ConnAck, ConnectRequest, ConnectReturnCode, PublishRequest, QoS};

/// Broker endpoint prepared by `net_connect`.
struct Endpoint {
    host: String,
    port: u16,
    timeout: Duration,
    tls: Option<Arc<ClientConfig>>,
}

/// Live client handle and its event loop.
struct Live {
    client: Client,
    connection: Connection,
}

/// Blocking MQTT 3.1.1 client over TCP.
pub struct TcpTransport {
    command_timeout: Duration,
    initialized: bool,
    endpoint: Option<Endpoint>,
    live: Option<Live>,
}

impl TcpTransport {
    /// Create a transport; each protocol exchange waits at most `command_timeout`.
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            command_timeout,
            initialized: false,
            endpoint: None,
            live: None,
        }
    }
}

fn timeout_ms(timeout: Duration) -> u64 {
    timeout.as_millis() as u64
}

fn client_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn return_code(code: rumqttc::ConnectReturnCode) -> ConnectReturnCode {
    ConnectReturnCode::from_byte(code as u8)
}

fn map_connection_error(e: ConnectionError, timeout: Duration) -> TransportError {
    match e {
        ConnectionError::Io(e) => match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout {
                timeout_ms: timeout_ms(timeout),
            },
            _ => TransportError::Io(e),
        },
        ConnectionError::Tls(e) => TransportError::Tls(e.to_string()),
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
            TransportError::Timeout {
                timeout_ms: timeout_ms(timeout),
            }
        }
        ConnectionError::MqttState(e) => TransportError::Protocol(e.to_string()),
        ConnectionError::NotConnAck(packet) => {
            TransportError::Protocol(format!("expected CONNACK, got {:?}", packet))
        }
        other => TransportError::Network(other.to_string()),
    }
}

/// Next event from the connection, or a timeout once `deadline` passes.
fn next_event(
    connection: &mut Connection,
    deadline: Instant,
    timeout: Duration,
) -> Result<Result<Event, ConnectionError>, TransportError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match connection.recv_timeout(remaining) {
        Ok(event) => Ok(event),
        Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout {
            timeout_ms: timeout_ms(timeout),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(TransportError::NotConnected),
    }
}

fn resolve(opts: &NetConnectOptions) -> Result<(), TransportError> {
    let connect_failed = |message: String| TransportError::ConnectFailed {
        host: opts.host.clone(),
        port: opts.port,
        message,
    };
    let mut addrs = (opts.host.as_str(), opts.port)
        .to_socket_addrs()
        .map_err(|e| connect_failed(e.to_string()))?;
    match addrs.next() {
        Some(addr) => {
            debug!(%addr, "Broker resolved");
            Ok(())
        }
        None => Err(connect_failed("host resolved to no addresses".into())),
    }
}

fn tls_config(opts: &TlsOptions) -> Result<Arc<ClientConfig>, TransportError> {
    let mut roots = RootCertStore::empty();
    match &opts.ca_file {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| TransportError::Tls(format!("{}: {}", path.display(), e)))?;
            for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
                let cert = cert
                    .map_err(|e| TransportError::Tls(format!("{}: {}", path.display(), e)))?;
                roots
                    .add(cert)
                    .map_err(|e| TransportError::Tls(e.to_string()))?;
            }
            if roots.is_empty() {
                return Err(TransportError::Tls(format!(
                    "no certificates found in {}",
                    path.display()
                )));
            }
            info!(path = %path.display(), anchors = roots.len(), "Loaded trust anchors");
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

impl MqttTransport for TcpTransport {
    fn init(&mut self) -> Result<(), TransportError> {
        self.initialized = true;
        Ok(())
    }

    #[instrument(skip(self, opts), fields(host = %opts.host, port = opts.port, tls = opts.tls.is_some()))]
    fn net_connect(&mut self, opts: &NetConnectOptions) -> Result<(), TransportError> {
        if !self.initialized {
            return Err(TransportError::BadArgument("transport not initialized".into()));
        }
        if self.endpoint.is_some() {
            return Err(TransportError::BadArgument("already connected".into()));
        }

        resolve(opts)?;
        let tls = opts.tls.as_ref().map(tls_config).transpose()?;
        self.endpoint = Some(Endpoint {
            host: opts.host.clone(),
            port: opts.port,
            timeout: opts.timeout,
            tls,
        });
        Ok(())
    }

    fn send_connect(&mut self, req: &ConnectRequest) -> Result<ConnAck, TransportError> {
        let endpoint = self.endpoint.as_ref().ok_or(TransportError::NotConnected)?;
        if self.live.is_some() {
            return Err(TransportError::BadArgument("CONNECT already sent".into()));
        }
        if req.client_id.is_empty() || req.client_id.starts_with(' ') {
            return Err(TransportError::BadArgument(format!(
                "invalid client id {:?}",
                req.client_id
            )));
        }

        let mut options =
            MqttOptions::new(req.client_id.clone(), endpoint.host.clone(), endpoint.port);
        options
            .set_keep_alive(Duration::from_secs(u64::from(req.keep_alive_sec)))
            .set_clean_session(req.clean_session)
            .set_max_packet_size(MAX_INCOMING_PACKET, MAX_OUTGOING_PACKET);
        if let Some(will) = &req.last_will {
            options.set_last_will(rumqttc::LastWill::new(
                will.topic.clone(),
                will.payload.clone(),
                client_qos(will.qos),
                will.retain,
            ));
        }
        if let Some(username) = &req.username {
            options.set_credentials(username.clone(), req.password.clone().unwrap_or_default());
        }
        if let Some(config) = &endpoint.tls {
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                config.clone(),
            )));
        }

        let timeout = endpoint.timeout;
        let deadline = Instant::now() + timeout;
        let (client, mut connection) = Client::new(options, REQUEST_CHANNEL_CAPACITY);
        loop {
            match next_event(&mut connection, deadline, timeout)? {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    let ack = ConnAck {
                        return_code: return_code(ack.code),
                        session_present: ack.session_present,
                    };
                    if ack.is_success() {
                        self.live = Some(Live { client, connection });
                    }
                    return Ok(ack);
                }
                Ok(event) => debug!(?event, "Event before CONNACK"),
                Err(ConnectionError::ConnectionRefused(code)) => {
                    return Ok(ConnAck::refused(return_code(code)));
                }
                Err(e) => return Err(map_connection_error(e, timeout)),
            }
        }
    }

    fn publish(&mut self, req: &PublishRequest<'_>) -> Result<(), TransportError> {
        if req.duplicate {
            return Err(TransportError::BadArgument(
                "redelivery is handled by the client".into(),
            ));
        }
        let timeout = self.command_timeout;
        let live = self.live.as_mut().ok_or(TransportError::NotConnected)?;

        live.client
            .publish(req.topic, client_qos(req.qos), req.retain, req.payload.to_vec())
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let deadline = Instant::now() + timeout;
        let mut sent = None;
        loop {
            let event = next_event(&mut live.connection, deadline, timeout)?
                .map_err(|e| map_connection_error(e, timeout))?;
            match event {
                Event::Outgoing(Outgoing::Publish(pkid)) => {
                    debug!(pkid, session_id = req.packet_id, "PUBLISH sent");
                    if req.qos == QoS::AtMostOnce {
                        return Ok(());
                    }
                    sent = Some(pkid);
                }
                Event::Incoming(Packet::PubAck(ack))
                    if req.qos == QoS::AtLeastOnce && sent == Some(ack.pkid) =>
                {
                    return Ok(());
                }
                Event::Incoming(Packet::PubComp(comp))
                    if req.qos == QoS::ExactlyOnce && sent == Some(comp.pkid) =>
                {
                    return Ok(());
                }
                other => debug!(event = ?other, "Event during publish"),
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let timeout = self.command_timeout;
        let live = self.live.as_mut().ok_or(TransportError::NotConnected)?;
        live.client
            .disconnect()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let deadline = Instant::now() + timeout;
        loop {
            let event = next_event(&mut live.connection, deadline, timeout)?
                .map_err(|e| map_connection_error(e, timeout))?;
            if let Event::Outgoing(Outgoing::Disconnect) = event {
                return Ok(());
            }
        }
    }

    fn net_disconnect(&mut self) -> Result<(), TransportError> {
        // Dropping the connection closes the socket.
        self.live = None;
        self.endpoint = None;
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), TransportError> {
        self.live = None;
        self.endpoint = None;
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    /// Read one control packet: first header byte and body.
    fn read_frame(sock: &mut TcpStream) -> (u8, Vec<u8>) {
        let mut first = [0u8; 1];
        sock.read_exact(&mut first).unwrap();
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let mut byte = [0u8; 1];
            sock.read_exact(&mut byte).unwrap();
            len |= usize::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; len];
        sock.read_exact(&mut body).unwrap();
        (first[0], body)
    }

    fn options(port: u16) -> NetConnectOptions {
        NetConnectOptions {
            host: "127.0.0.1".into(),
            port,
            timeout: Duration::from_secs(2),
            tls: None,
        }
    }

    fn connect_request() -> ConnectRequest {
        ConnectRequest {
            client_id: "tcp-test".into(),
            keep_alive_sec: 30,
            clean_session: true,
            last_will: None,
            username: None,
            password: None,
        }
    }

    #[test]
    fn test_qos2_session_against_local_broker() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let (connect, _) = read_frame(&mut sock);
            assert_eq!(connect >> 4, 1);
            sock.write_all(&[0x20, 0x02, 0x00, 0x00]).unwrap();

            let (publish, body) = read_frame(&mut sock);
            assert_eq!(publish, 0x34);
            sock.write_all(&[0x50, 0x02, body[4], body[5]]).unwrap();

            let (pubrel, rel) = read_frame(&mut sock);
            assert_eq!(pubrel, 0x62);
            sock.write_all(&[0x70, 0x02, rel[0], rel[1]]).unwrap();

            let (disconnect, _) = read_frame(&mut sock);
            assert_eq!(disconnect, 0xE0);
            body
        });

        let mut transport = TcpTransport::new(Duration::from_secs(2));
        transport.init().unwrap();
        transport.net_connect(&options(port)).unwrap();
        let ack = transport.send_connect(&connect_request()).unwrap();
        assert!(ack.is_success());
        transport
            .publish(&PublishRequest {
                topic: "fw",
                qos: QoS::ExactlyOnce,
                retain: false,
                duplicate: false,
                packet_id: 1,
                payload: b"signed",
            })
            .unwrap();
        transport.disconnect().unwrap();
        transport.net_disconnect().unwrap();
        transport.deinit().unwrap();

        let body = broker.join().unwrap();
        assert_eq!(&body[..4], &[0, 2, b'f', b'w']);
        assert_eq!(&body[6..], b"signed");
    }

    #[test]
    fn test_refused_connack_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let _ = read_frame(&mut sock);
            sock.write_all(&[0x20, 0x02, 0x00, 0x05]).unwrap();
        });

        let mut transport = TcpTransport::new(Duration::from_secs(2));
        transport.init().unwrap();
        transport.net_connect(&options(port)).unwrap();
        let ack = transport.send_connect(&connect_request()).unwrap();
        assert_eq!(ack.return_code, ConnectReturnCode::NotAuthorized);
        assert!(matches!(
            transport.publish(&PublishRequest {
                topic: "fw",
                qos: QoS::AtMostOnce,
                retain: false,
                duplicate: false,
                packet_id: 1,
                payload: b"x",
            }),
            Err(TransportError::NotConnected)
        ));
        transport.net_disconnect().unwrap();
        broker.join().unwrap();
    }

    #[test]
    fn test_missing_connack_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let _ = read_frame(&mut sock);
            thread::sleep(Duration::from_millis(500));
        });

        let mut transport = TcpTransport::new(Duration::from_millis(100));
        transport.init().unwrap();
        let opts = NetConnectOptions {
            timeout: Duration::from_millis(200),
            ..options(port)
        };
        transport.net_connect(&opts).unwrap();
        let err = transport.send_connect(&connect_request()).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { timeout_ms: 200 }));
        assert_eq!(err.code(), MQTT_CODE_ERROR_TIMEOUT);
        transport.net_disconnect().unwrap();
        broker.join().unwrap();
    }

    #[test]
    fn test_connect_requires_init() {
        let mut transport = TcpTransport::new(Duration::from_millis(100));
        assert!(matches!(
            transport.net_connect(&options(1)),
            Err(TransportError::BadArgument(_))
        ));
    }

    #[test]
    fn test_net_disconnect_without_connection_is_noop() {
        let mut transport = TcpTransport::new(Duration::from_millis(100));
        transport.net_disconnect().unwrap();
        assert!(matches!(transport.disconnect(), Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_connect_before_net_connect_fails() {
        let mut transport = TcpTransport::new(Duration::from_millis(100));
        transport.init().unwrap();
        assert!(matches!(
            transport.send_connect(&connect_request()),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_missing_ca_file_is_tls_error() {
        let opts = TlsOptions {
            ca_file: Some("/nonexistent/ca.pem".into()),
        };
        assert!(matches!(tls_config(&opts), Err(TransportError::Tls(_))));
    }
}
