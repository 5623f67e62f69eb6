//! Single-task driver that serializes every input to a [`GateSession`].

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::debug;

use crate::responder::Intent;
use crate::session::{
    ConnectionState, DecisionError, DecisionOutcome, GateSession, SessionStatus,
};
use crate::transport::TransportEvent;

#[derive(Debug)]
pub enum SessionInput {
    Transport(TransportEvent),
    ReconnectDue,
    Command(OperatorCommand),
}

#[derive(Debug)]
pub enum OperatorCommand {
    Decide {
        intent: Intent,
        reply: oneshot::Sender<Result<DecisionOutcome, DecisionError>>,
    },
    Dismiss,
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Teardown,
}

/// Runs `session` until it terminates, then hands it back for inspection.
///
/// The transport and scheduler hold senders of their own, so in practice
/// the loop ends through `OperatorCommand::Teardown` or a normal close. If
/// the channel does drain, a live session is torn down on the way out.
pub async fn drive(
    mut session: GateSession,
    mut inputs: UnboundedReceiver<SessionInput>,
) -> GateSession {
    while let Some(input) = inputs.recv().await {
        match input {
            SessionInput::Transport(event) => session.handle(event),
            SessionInput::ReconnectDue => session.on_reconnect_due(),
            SessionInput::Command(command) => apply(&mut session, command),
        }
        if session.state() == ConnectionState::Terminated {
            break;
        }
    }

    if session.state().is_live() {
        debug!("Session inputs closed; tearing down");
        session.teardown();
    }
    session
}

fn apply(session: &mut GateSession, command: OperatorCommand) {
    match command {
        OperatorCommand::Decide { intent, reply } => {
            let _ = reply.send(session.decide(intent));
        }
        OperatorCommand::Dismiss => {
            session.dismiss();
        }
        OperatorCommand::Status { reply } => {
            let _ = reply.send(session.status());
        }
        OperatorCommand::Teardown => session.teardown(),
    }
}

/// Cloneable front door for operator commands.
#[derive(Clone)]
pub struct SessionHandle {
    inputs: UnboundedSender<SessionInput>,
}

impl SessionHandle {
    pub fn new(inputs: UnboundedSender<SessionInput>) -> Self {
        Self { inputs }
    }

    pub async fn decide(&self, intent: Intent) -> Result<DecisionOutcome, DecisionError> {
        let (reply, rx) = oneshot::channel();
        self.command(OperatorCommand::Decide { intent, reply })
            .map_err(|_| DecisionError::SessionEnded)?;
        rx.await.map_err(|_| DecisionError::SessionEnded)?
    }

    /// `None` once the session has ended.
    pub async fn status(&self) -> Option<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.command(OperatorCommand::Status { reply }).ok()?;
        rx.await.ok()
    }

    pub fn dismiss(&self) -> bool {
        self.command(OperatorCommand::Dismiss).is_ok()
    }

    pub fn teardown(&self) -> bool {
        self.command(OperatorCommand::Teardown).is_ok()
    }

    fn command(&self, command: OperatorCommand) -> Result<(), mpsc::error::SendError<SessionInput>> {
        self.inputs.send(SessionInput::Command(command))
    }
}
