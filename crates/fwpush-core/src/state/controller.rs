//! Session controller: drives one push through the state machine.

use std::mem;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::events::{LogLevel, PushEvent, PushObserver};
use crate::payload::SignedPackage;
use crate::protocol::{ConnAck, PublishRequest};
use crate::session::SessionParams;
use crate::state::machine::{SessionReport, SessionState, SessionStep, StepRecord};
use crate::state::packet_id::{PacketId, PacketIdAllocator};
use crate::state::stop::StopFlag;
use crate::transport::{MqttTransport, TransportError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{step} not allowed in state {state}")]
    InvalidTransition {
        state: SessionState,
        step: SessionStep,
    },

    #[error("{step} failed: {source}")]
    Transport {
        step: SessionStep,
        source: TransportError,
    },

    #[error("Broker refused connection: {0}")]
    Refused(ConnAck),

    #[error("Stop requested")]
    Interrupted,
}

/// Owns the transport for one push and enforces the connection lifecycle.
///
/// Teardown steps run at most once each. If the controller is dropped with
/// the network still open, the network is closed.
pub struct SessionController<T: MqttTransport, O: PushObserver> {
    transport: T,
    observer: Arc<O>,
    params: SessionParams,
    state: SessionState,
    packet_ids: PacketIdAllocator,
    stop: StopFlag,
    report: SessionReport,
    init_attempted: bool,
    net_attempted: bool,
    net_closed: bool,
    deinitialized: bool,
}

impl<T: MqttTransport, O: PushObserver> SessionController<T, O> {
    pub fn new(transport: T, observer: Arc<O>, params: SessionParams, stop: StopFlag) -> Self {
        Self {
            transport,
            observer,
            params,
            state: SessionState::Idle,
            packet_ids: PacketIdAllocator::new(),
            stop,
            report: SessionReport::default(),
            init_attempted: false,
            net_attempted: false,
            net_closed: false,
            deinitialized: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    fn emit(&self, event: PushEvent) {
        self.observer.on_event(&event);
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(PushEvent::Log {
            level,
            message: message.into(),
        });
    }

    fn check(&self, step: SessionStep) -> Result<SessionState, SessionError> {
        self.state
            .next(step)
            .ok_or(SessionError::InvalidTransition {
                state: self.state,
                step,
            })
    }

    fn goto(&mut self, to: SessionState) {
        if to != self.state {
            debug!(from = %self.state, to = %to, "State transition");
            self.emit(PushEvent::StateChanged {
                from: self.state,
                to,
            });
            self.state = to;
        }
    }

    fn push_record(&mut self, record: StepRecord) {
        self.emit(PushEvent::Status {
            step: record.step,
            code: record.code,
            message: record.message.clone(),
        });
        self.report.steps.push(record);
    }

    /// Record the outcome of a transport call and convert its error.
    fn finish<V>(
        &mut self,
        step: SessionStep,
        result: Result<V, TransportError>,
    ) -> Result<V, SessionError> {
        match result {
            Ok(v) => {
                self.push_record(StepRecord::success(step));
                Ok(v)
            }
            Err(source) => {
                self.push_record(StepRecord {
                    step,
                    code: source.code(),
                    message: source.to_string(),
                });
                Err(SessionError::Transport { step, source })
            }
        }
    }

    fn check_stop(&mut self, before: SessionStep) -> Result<(), SessionError> {
        if self.stop.is_set() {
            self.report.interrupted = true;
            self.emit(PushEvent::Interrupted { before });
            return Err(SessionError::Interrupted);
        }
        Ok(())
    }

    /// Prepare the transport.
    pub fn init(&mut self) -> Result<(), SessionError> {
        if self.init_attempted {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                step: SessionStep::Init,
            });
        }
        self.check(SessionStep::Init)?;
        self.init_attempted = true;
        let result = self.transport.init();
        self.finish(SessionStep::Init, result)
    }

    /// Open the network connection: `Idle -> NetworkConnected`.
    #[instrument(skip_all, fields(host = %self.params.net.host, port = self.params.net.port))]
    pub fn connect_network(&mut self) -> Result<(), SessionError> {
        let next = self.check(SessionStep::NetConnect)?;
        if self.net_attempted {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                step: SessionStep::NetConnect,
            });
        }
        self.net_attempted = true;
        info!(tls = self.params.net.tls.is_some(), "Connecting");
        let result = self.transport.net_connect(&self.params.net);
        self.finish(SessionStep::NetConnect, result)?;
        self.goto(next);
        Ok(())
    }

    /// Send CONNECT: `NetworkConnected -> ProtocolConnected`.
    ///
    /// A refused CONNACK is recorded with its return code.
    #[instrument(skip_all, fields(client_id = %self.params.connect.client_id))]
    pub fn handshake(&mut self) -> Result<ConnAck, SessionError> {
        let next = self.check(SessionStep::Handshake)?;
        let result = self.transport.send_connect(&self.params.connect);
        let ack = match result {
            Ok(ack) => ack,
            Err(e) => return self.finish(SessionStep::Handshake, Err(e)),
        };

        self.report.conn_ack = Some(ack);
        self.emit(PushEvent::ConnAckReceived { ack });

        if !ack.is_success() {
            self.push_record(StepRecord {
                step: SessionStep::Handshake,
                code: i32::from(ack.return_code.as_byte()),
                message: format!("Connection refused: {}", ack.return_code),
            });
            return Err(SessionError::Refused(ack));
        }

        self.push_record(StepRecord::success(SessionStep::Handshake));
        self.goto(next);
        Ok(ack)
    }

    /// Publish the package under a fresh packet id:
    /// `ProtocolConnected -> Published`.
    #[instrument(skip_all, fields(topic = %self.params.topic, qos = self.params.qos.as_u8()))]
    pub fn publish(&mut self, package: &SignedPackage) -> Result<PacketId, SessionError> {
        let next = self.check(SessionStep::Publish)?;
        let id = self.packet_ids.next_id();
        self.report.packet_id = Some(id.get());

        let request = PublishRequest {
            topic: &self.params.topic,
            qos: self.params.qos,
            retain: false,
            duplicate: false,
            packet_id: id.get(),
            payload: package.as_bytes(),
        };
        let result = self.transport.publish(&request);
        self.finish(SessionStep::Publish, result)?;

        self.emit(PushEvent::Published {
            topic: self.params.topic.clone(),
            packet_id: id.get(),
            length: package.len(),
        });
        self.goto(next);
        Ok(id)
    }

    /// Send DISCONNECT. The session counts as disconnected even if sending
    /// fails.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        let next = self.check(SessionStep::Disconnect)?;
        let result = self.transport.disconnect();
        self.goto(next);
        self.finish(SessionStep::Disconnect, result)
    }

    /// Close the network connection. The handle is released even if the
    /// close reports an error.
    pub fn close_network(&mut self) -> Result<(), SessionError> {
        let next = self.check(SessionStep::NetClose)?;
        let result = self.transport.net_disconnect();
        self.net_closed = true;
        self.goto(next);
        self.finish(SessionStep::NetClose, result)
    }

    /// Release transport resources.
    pub fn deinit(&mut self) -> Result<(), SessionError> {
        self.check(SessionStep::Deinit)?;
        if self.deinitialized {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                step: SessionStep::Deinit,
            });
        }
        self.deinitialized = true;
        let result = self.transport.deinit();
        self.finish(SessionStep::Deinit, result)
    }

    fn drive(&mut self, package: &SignedPackage) -> Result<(), SessionError> {
        self.check_stop(SessionStep::NetConnect)?;
        self.connect_network()?;
        self.check_stop(SessionStep::Handshake)?;
        self.handshake()?;
        self.check_stop(SessionStep::Publish)?;
        self.publish(package)?;
        Ok(())
    }

    fn teardown(&mut self) {
        if matches!(
            self.state,
            SessionState::ProtocolConnected | SessionState::Published
        ) {
            let _ = self.disconnect();
        }
        if self.net_attempted && !self.net_closed {
            let _ = self.close_network();
        }
    }

    /// Run the whole session: init, connect, handshake, publish, then
    /// teardown and deinit. Failures are recorded in the report.
    #[instrument(skip_all, fields(len = package.len()))]
    pub fn run(mut self, package: &SignedPackage) -> SessionReport {
        if self.init().is_ok() {
            if let Err(e) = self.drive(package) {
                match e {
                    SessionError::Interrupted => {
                        self.log(LogLevel::Warn, "Push interrupted before completion")
                    }
                    e => warn!(error = %e, "Session aborted"),
                }
            }
            self.teardown();
        }
        let _ = self.deinit();

        self.report.final_state = self.state;
        mem::take(&mut self.report)
    }
}

impl<T: MqttTransport, O: PushObserver> Drop for SessionController<T, O> {
    fn drop(&mut self) {
        if self.net_attempted && !self.net_closed {
            warn!("Controller dropped with network open, closing");
            self.net_closed = true;
            if let Err(e) = self.transport.net_disconnect() {
                warn!(error = %e, "Failed to close network on drop");
            }
        }
    }
}
