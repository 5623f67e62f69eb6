//! Operator-side gatekeeper client.
//!
//! Holds one socket to the gatekeeper service, turns wrong-plate events into
//! a single pending decision for the operator, and sends the operator's
//! answer back. Everything notable is written to the activity log through
//! [`sysgate_logstore::ActivityLog`].

pub mod classifier;
pub mod notify;
pub mod pending;
pub mod probe;
pub mod responder;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod types;
pub mod ws;

pub use classifier::{classify, parse_event, Classification, ProtocolError};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use pending::{DecisionSlot, PendingDecision};
pub use probe::{spawn_monitor, ConnectivityProbe};
pub use responder::{
    action_for, build_response, reason_for, DecisionAction, DecisionResponse, Intent,
    ResponderIdentity, ResponseMeta, ResponsePayload,
};
pub use runtime::{drive, OperatorCommand, SessionHandle, SessionInput};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use session::{
    ConnectionState, DecisionError, DecisionOutcome, GateSession, SessionConfig, SessionError,
    SessionStatus,
};
pub use transport::{Transport, TransportError, TransportEvent, CLOSE_ABNORMAL, CLOSE_NORMAL};
pub use types::{
    EventKind, Gate, GateCheckPayload, GateEvent, MemberInfo, Picture, SubjectId, SubjectKind,
    TicketInfo, Track,
};
pub use ws::{WsShutdown, WsTransport};
