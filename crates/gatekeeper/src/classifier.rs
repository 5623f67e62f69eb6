//! Turns raw socket text into a classified gate event.

use crate::pending::PendingDecision;
use crate::types::GateEvent;

#[derive(Debug, thiserror::Error)]
#[error("malformed gate event: {0}")]
pub struct ProtocolError(#[from] serde_json::Error);

pub fn parse_event(raw: &str) -> Result<GateEvent, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Display-only update.
    Informational,
    /// Approval kind whose payload carries neither a member nor a ticket.
    MissingSubject,
    NeedsApproval(PendingDecision),
}

pub fn classify(event: &GateEvent) -> Classification {
    if !event.kind.needs_approval() {
        return Classification::Informational;
    }
    match event.payload.subject() {
        Some(subject) => {
            Classification::NeedsApproval(PendingDecision::new(subject, event.payload.clone()))
        }
        None => Classification::MissingSubject,
    }
}
