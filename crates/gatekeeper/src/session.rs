//! Gatekeeper socket session.
//!
//! [`GateSession`] is a synchronous state machine: the transport and the
//! reconnect timer report back through [`GateSession::handle`] and
//! [`GateSession::on_reconnect_due`], and nothing here awaits I/O. The
//! runtime in [`crate::runtime`] feeds it from a single task.

use chrono::Utc;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use sysgate_common::SysgateConfig;
use sysgate_logstore::{ActivityLog, NewLogEntry};

use crate::classifier::{classify, parse_event, Classification};
use crate::notify::{Notice, Notifier};
use crate::pending::{DecisionSlot, PendingDecision};
use crate::responder::{build_response, DecisionAction, DecisionResponse, Intent, ResponderIdentity};
use crate::scheduler::Scheduler;
use crate::transport::{Transport, TransportError, TransportEvent, CLOSE_NORMAL};
use crate::types::GateCheckPayload;

const TEARDOWN_REASON: &str = "Component unmounting";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub ws_url: String,
    pub role: String,
    pub auth_token: Option<String>,
    pub operator: String,
    pub responded_by: String,
    pub reconnect_delay: Duration,
}

impl SessionConfig {
    pub fn from_config(cfg: &SysgateConfig) -> Self {
        Self {
            ws_url: cfg.gatekeeper.ws_url.clone(),
            role: cfg.gatekeeper.role.clone(),
            auth_token: cfg.operator.auth_token.clone(),
            operator: cfg.operator.username.clone(),
            responded_by: cfg.gatekeeper.responded_by.clone(),
            reconnect_delay: cfg.gatekeeper.reconnect_delay(),
        }
    }

    fn token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// `{ws_url}/gatekeeper?role=..&client_id=..`
    pub fn endpoint(&self) -> Result<Url, SessionError> {
        let token = self.token().ok_or(SessionError::MissingAuthToken)?;
        let base = self.ws_url.trim().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/gatekeeper"))?;
        url.query_pairs_mut()
            .append_pair("role", &self.role)
            .append_pair("client_id", token);
        Ok(url)
    }

    pub fn identity(&self) -> ResponderIdentity {
        ResponderIdentity {
            operator: self.operator.clone(),
            client_id: self.token().unwrap_or_default().to_string(),
            responded_by: self.responded_by.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Terminated,
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        !matches!(self, ConnectionState::Terminated)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no auth token configured; refusing to connect")]
    MissingAuthToken,
    #[error("invalid gatekeeper endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("session is already {0}")]
    AlreadyActive(ConnectionState),
    #[error("session has been torn down")]
    Terminated,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("not connected to the gatekeeper")]
    NotConnected,
    #[error("no decision is pending")]
    NoPendingDecision,
    #[error("failed to encode decision: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to send decision: {0}")]
    Send(#[source] TransportError),
    #[error("session has ended")]
    SessionEnded,
}

/// A decision that went out on the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub decision_id: Uuid,
    pub action: DecisionAction,
    pub response: DecisionResponse,
}

/// Point-in-time view for status queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub pending: Option<PendingDecision>,
    pub prompt_open: bool,
    pub reconnect_pending: bool,
}

pub struct GateSession {
    config: SessionConfig,
    state: ConnectionState,
    transport: Box<dyn Transport>,
    scheduler: Box<dyn Scheduler>,
    notifier: Arc<dyn Notifier>,
    log: Arc<dyn ActivityLog>,
    slot: DecisionSlot,
    reconnect_pending: bool,
}

impl GateSession {
    pub fn new(
        config: SessionConfig,
        transport: Box<dyn Transport>,
        scheduler: Box<dyn Scheduler>,
        notifier: Arc<dyn Notifier>,
        log: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            transport,
            scheduler,
            notifier,
            log,
            slot: DecisionSlot::new(),
            reconnect_pending: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingDecision> {
        self.slot.current()
    }

    pub fn last_observed(&self) -> Option<&GateCheckPayload> {
        self.slot.last_observed()
    }

    pub fn is_prompt_open(&self) -> bool {
        self.slot.is_prompt_open()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            pending: self.slot.current().cloned(),
            prompt_open: self.slot.is_prompt_open(),
            reconnect_pending: self.reconnect_pending,
        }
    }

    /// Starts the first connection attempt.
    ///
    /// A transport that refuses to start still leaves the session live with
    /// a reconnect scheduled; the error is returned for reporting.
    pub fn open(&mut self) -> Result<(), SessionError> {
        match self.state {
            ConnectionState::Terminated => return Err(SessionError::Terminated),
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(SessionError::AlreadyActive(self.state))
            }
            ConnectionState::Disconnected => {}
        }
        self.connect()
    }

    /// Feeds one transport event through the state table.
    pub fn handle(&mut self, event: TransportEvent) {
        if self.state == ConnectionState::Terminated {
            debug!("Ignoring transport event after teardown: {:?}", event);
            return;
        }

        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(text) => {
                if self.state == ConnectionState::Connected {
                    self.on_message(&text);
                } else {
                    debug!("Dropping message received while {}", self.state);
                }
            }
            TransportEvent::Error(message) => self.on_error(&message),
            TransportEvent::Closed { code, reason } => self.on_closed(code, &reason),
        }
    }

    /// Reconnect timer expiry.
    pub fn on_reconnect_due(&mut self) {
        if self.state == ConnectionState::Terminated {
            debug!("Reconnect timer fired after teardown; ignoring");
            return;
        }
        self.reconnect_pending = false;
        if self.state != ConnectionState::Disconnected {
            debug!("Reconnect timer fired while {}; ignoring", self.state);
            return;
        }
        info!("Reconnecting to gatekeeper");
        if let Err(err) = self.connect() {
            debug!("Reconnect attempt did not start: {}", err);
        }
    }

    /// Answers the pending decision.
    pub fn decide(&mut self, intent: Intent) -> Result<DecisionOutcome, DecisionError> {
        if self.state != ConnectionState::Connected {
            return Err(self.refuse_decision(intent, DecisionError::NotConnected));
        }
        let Some(decision) = self.slot.current().cloned() else {
            return Err(self.refuse_decision(intent, DecisionError::NoPendingDecision));
        };

        let response = build_response(intent, &decision, &self.config.identity(), Utc::now());
        let text = serde_json::to_string(&response)?;

        if let Err(err) = self.transport.send(text) {
            self.notifier.notify(
                Notice::error("Failed to send decision").with_description(err.to_string()),
            );
            self.log.record(
                NewLogEntry::error("ws.decision", format!("Failed to send decision: {err}"))
                    .with_request(&response)
                    .with_meta(&json!({ "decision_id": decision.id })),
            );
            return Err(DecisionError::Send(err));
        }

        if self.slot.resolve(decision.id).is_some() {
            self.notifier.prompt(None);
        }
        let title = if response.action.is_approval() {
            "Approved"
        } else {
            "Denied"
        };
        self.notifier.notify(
            Notice::success(title).with_description(format!("{} sent for {}", response.action, decision.subject)),
        );
        self.log.record(
            NewLogEntry::info("ws.decision", format!("Sent {} for {}", response.action, decision.subject))
                .with_request(&response)
                .with_meta(&json!({ "decision_id": decision.id, "intent": intent.to_string() })),
        );
        info!("Sent {} for {}", response.action, decision.subject);

        Ok(DecisionOutcome {
            decision_id: decision.id,
            action: response.action,
            response,
        })
    }

    /// Closes the prompt and drops the pending decision without answering.
    pub fn dismiss(&mut self) -> Option<PendingDecision> {
        let dismissed = self.slot.dismiss()?;
        self.notifier.prompt(None);
        self.log.record(
            NewLogEntry::info(
                "ws.decision_dismissed",
                format!("Dismissed pending decision for {}", dismissed.subject),
            )
            .with_meta(&json!({ "decision_id": dismissed.id })),
        );
        Some(dismissed)
    }

    /// Cancels any reconnect and closes the socket normally. Final.
    pub fn teardown(&mut self) {
        if self.state == ConnectionState::Terminated {
            return;
        }
        self.scheduler.cancel();
        self.reconnect_pending = false;
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            self.transport.close(CLOSE_NORMAL, TEARDOWN_REASON);
        }
        self.terminate();
        self.log
            .record(NewLogEntry::info("ws.teardown", "Session torn down"));
        info!("Gatekeeper session torn down");
    }

    fn connect(&mut self) -> Result<(), SessionError> {
        let endpoint = match self.config.endpoint() {
            Ok(endpoint) => endpoint,
            Err(err) => {
                self.notifier
                    .notify(Notice::error("Cannot connect to gatekeeper").with_description(err.to_string()));
                self.log
                    .record(NewLogEntry::error("ws.connect", err.to_string()).with_meta(&json!({
                        "ws_url": self.config.ws_url,
                    })));
                return Err(err);
            }
        };

        self.state = ConnectionState::Connecting;
        debug!("Connecting to {}{}", endpoint.origin().ascii_serialization(), endpoint.path());

        if let Err(err) = self.transport.connect(&endpoint) {
            self.state = ConnectionState::Disconnected;
            self.notifier.notify(
                Notice::error("Connection to gatekeeper failed").with_description(err.to_string()),
            );
            self.log.record(NewLogEntry::error("ws.error", err.to_string()));
            self.schedule_reconnect();
            return Err(err.into());
        }
        Ok(())
    }

    fn on_opened(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!("Unexpected open while {}", self.state);
            return;
        }
        self.state = ConnectionState::Connected;
        self.notifier.notify(Notice::success("Connected to gatekeeper"));
        self.log.record(
            NewLogEntry::info("ws.connect", "Connected to gatekeeper").with_meta(&json!({
                "ws_url": self.config.ws_url,
                "role": self.config.role,
            })),
        );
        info!("Connected to gatekeeper at {}", self.config.ws_url);
    }

    fn on_error(&mut self, message: &str) {
        self.notifier
            .notify(Notice::error("Gatekeeper connection error").with_description(message));
        self.log.record(
            NewLogEntry::error("ws.error", message).with_meta(&json!({ "state": self.state.to_string() })),
        );
        warn!("Gatekeeper socket error while {}: {}", self.state, message);

        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Disconnected;
            self.schedule_reconnect();
        }
    }

    fn on_closed(&mut self, code: u16, reason: &str) {
        let meta = json!({ "code": code, "reason": reason });
        if code == CLOSE_NORMAL {
            self.scheduler.cancel();
            self.reconnect_pending = false;
            self.terminate();
            self.log
                .record(NewLogEntry::info("ws.close", "Socket closed normally").with_meta(&meta));
            info!("Gatekeeper closed the socket normally");
            return;
        }

        self.state = ConnectionState::Disconnected;
        self.log.record(
            NewLogEntry::warn("ws.close", format!("Socket closed with code {code}")).with_meta(&meta),
        );
        warn!("Gatekeeper socket closed with code {} ({})", code, reason);
        self.notifier.notify(
            Notice::warning("Disconnected from gatekeeper").with_description(format!(
                "Closed with code {code}, reconnecting in {}s",
                self.config.reconnect_delay.as_secs()
            )),
        );
        self.schedule_reconnect();
    }

    fn on_message(&mut self, text: &str) {
        let event = match parse_event(text) {
            Ok(event) => event,
            Err(err) => {
                let mut entry = NewLogEntry::error("ws.message", err.to_string());
                entry.payload = Some(text.to_string());
                self.log.record(entry);
                warn!("Dropping malformed gate event: {}", err);
                return;
            }
        };

        self.slot.observe(event.payload.clone());

        match classify(&event) {
            Classification::Informational => {
                self.log.record(
                    NewLogEntry::debug("ws.message", format!("Received {}", event.kind))
                        .with_payload(&event.payload),
                );
            }
            Classification::MissingSubject => {
                self.log.record(
                    NewLogEntry::warn(
                        "ws.approval_missing_subject",
                        format!("{} carries neither member nor ticket", event.kind),
                    )
                    .with_payload(&event.payload),
                );
            }
            Classification::NeedsApproval(decision) => self.promote(decision, &event.kind.to_string()),
        }
    }

    fn promote(&mut self, decision: PendingDecision, kind: &str) {
        let description = describe(&decision);
        let decision_id = decision.id;
        let subject = decision.subject.to_string();

        if let Some(superseded) = self.slot.promote(decision) {
            self.log.record(
                NewLogEntry::warn(
                    "ws.decision_superseded",
                    format!(
                        "Pending decision {} for {} replaced before it was answered",
                        superseded.id, superseded.subject
                    ),
                )
                .with_payload(&superseded.payload)
                .with_meta(&json!({
                    "superseded_id": superseded.id,
                    "superseded_subject": superseded.subject.to_string(),
                    "replacement_id": decision_id,
                })),
            );
            warn!("Superseded pending decision for {}", superseded.subject);
        }

        self.notifier.prompt(self.slot.current());
        self.notifier
            .notify(Notice::info("Approval required").with_description(description));
        if let Some(current) = self.slot.current() {
            self.log.record(
                NewLogEntry::info("ws.approval_required", format!("{kind} for {subject}"))
                    .with_payload(&current.payload)
                    .with_meta(&json!({ "decision_id": decision_id })),
            );
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_pending || self.state == ConnectionState::Terminated {
            return;
        }
        self.reconnect_pending = true;
        let delay = self.config.reconnect_delay;
        self.scheduler.schedule(delay);
        self.log.record(
            NewLogEntry::info(
                "ws.reconnect_scheduled",
                format!("Reconnecting in {}s", delay.as_secs()),
            ),
        );
        info!("Reconnecting to gatekeeper in {:?}", delay);
    }

    fn refuse_decision(&self, intent: Intent, err: DecisionError) -> DecisionError {
        self.notifier
            .notify(Notice::error("Cannot send decision").with_description(err.to_string()));
        self.log.record(
            NewLogEntry::warn("ws.decision", format!("{intent} refused: {err}"))
                .with_meta(&json!({ "state": self.state.to_string() })),
        );
        err
    }

    fn terminate(&mut self) {
        self.state = ConnectionState::Terminated;
        if self.slot.dismiss().is_some() {
            self.notifier.prompt(None);
        }
    }
}

fn describe(decision: &PendingDecision) -> String {
    let payload = &decision.payload;
    let mut parts = vec![decision.subject.to_string()];
    if !payload.gate_name().is_empty() {
        parts.push(format!("at {}", payload.gate_name()));
    }
    if let Some(plate) = payload.detected_plate.as_deref() {
        parts.push(format!("detected {plate}"));
    }
    if let Some(registered) = payload.registered_plate() {
        parts.push(format!("registered {registered}"));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> SessionConfig {
        SessionConfig {
            ws_url: "wss://gate.example/ws/".into(),
            role: "KEEPER".into(),
            auth_token: token.map(str::to_string),
            operator: "alice".into(),
            responded_by: "gatekeeper".into(),
            reconnect_delay: Duration::from_secs(5),
        }
    }

    #[test]
    fn endpoint_appends_path_and_query() {
        let url = config(Some("tok 1/2")).endpoint().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/ws/gatekeeper");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("role".to_string(), "KEEPER".to_string()),
                ("client_id".to_string(), "tok 1/2".to_string()),
            ]
        );
        assert!(!url.as_str().contains("tok 1/2"));
    }

    #[test]
    fn endpoint_requires_token() {
        assert!(matches!(
            config(None).endpoint(),
            Err(SessionError::MissingAuthToken)
        ));
        assert!(matches!(
            config(Some("  ")).endpoint(),
            Err(SessionError::MissingAuthToken)
        ));
    }

    #[test]
    fn endpoint_rejects_garbage_url() {
        let mut cfg = config(Some("tok"));
        cfg.ws_url = "not a url".into();
        assert!(matches!(cfg.endpoint(), Err(SessionError::InvalidEndpoint(_))));
    }

    #[test]
    fn identity_uses_token_as_client_id() {
        let identity = config(Some(" tok-9 ")).identity();
        assert_eq!(identity.client_id, "tok-9");
        assert_eq!(identity.operator, "alice");
        assert_eq!(identity.responded_by, "gatekeeper");
    }
}
