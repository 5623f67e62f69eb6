//! Builds the outbound decision message for a pending case.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::pending::PendingDecision;
use crate::types::{SubjectId, SubjectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Approve,
    Reject,
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" | "a" => Ok(Intent::Approve),
            "reject" | "deny" | "r" => Ok(Intent::Reject),
            other => Err(format!("unknown intent '{other}' (expected approve or reject)")),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Approve => f.write_str("APPROVE"),
            Intent::Reject => f.write_str("REJECT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionAction {
    ApproveAccessWrongPlateMember,
    ApproveAccessWrongPlateTicket,
    DenyAccessWrongPlateMember,
    DenyAccessWrongPlateTicket,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::ApproveAccessWrongPlateMember => "approve-access-wrong-plate-member",
            DecisionAction::ApproveAccessWrongPlateTicket => "approve-access-wrong-plate-ticket",
            DecisionAction::DenyAccessWrongPlateMember => "deny-access-wrong-plate-member",
            DecisionAction::DenyAccessWrongPlateTicket => "deny-access-wrong-plate-ticket",
        }
    }

    pub fn is_approval(&self) -> bool {
        matches!(
            self,
            DecisionAction::ApproveAccessWrongPlateMember
                | DecisionAction::ApproveAccessWrongPlateTicket
        )
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn action_for(intent: Intent, kind: SubjectKind) -> DecisionAction {
    match (intent, kind) {
        (Intent::Approve, SubjectKind::Member) => DecisionAction::ApproveAccessWrongPlateMember,
        (Intent::Approve, SubjectKind::Ticket) => DecisionAction::ApproveAccessWrongPlateTicket,
        (Intent::Reject, SubjectKind::Member) => DecisionAction::DenyAccessWrongPlateMember,
        (Intent::Reject, SubjectKind::Ticket) => DecisionAction::DenyAccessWrongPlateTicket,
    }
}

pub fn reason_for(intent: Intent, operator: &str) -> String {
    match intent {
        Intent::Approve => String::new(),
        Intent::Reject => format!("Denied by operator {operator}"),
    }
}

/// Who is answering: operator name, socket client id, and the fixed
/// `responded_by` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderIdentity {
    pub operator: String,
    pub client_id: String,
    pub responded_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    #[serde(rename = "type")]
    pub action: DecisionAction,
    pub payload: ResponsePayload,
    pub meta: ResponseMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub gate_name: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub responded_by: String,
    pub client_id: String,
}

pub fn build_response(
    intent: Intent,
    decision: &PendingDecision,
    identity: &ResponderIdentity,
    at: DateTime<Utc>,
) -> DecisionResponse {
    let (ticket_id, member_number) = match &decision.subject {
        SubjectId::TicketId(id) => (Some(*id), None),
        SubjectId::MemberNumber(number) => (None, Some(number.clone())),
    };

    DecisionResponse {
        action: action_for(intent, decision.subject_kind()),
        payload: ResponsePayload {
            gate_name: decision.payload.gate_name().to_string(),
            reason: reason_for(intent, &identity.operator),
            ticket_id,
            member_number,
        },
        meta: ResponseMeta {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            responded_by: identity.responded_by.clone(),
            client_id: identity.client_id.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Gate, GateCheckPayload};
    use chrono::TimeZone;
    use serde_json::json;

    fn identity(operator: &str) -> ResponderIdentity {
        ResponderIdentity {
            operator: operator.into(),
            client_id: "tok-1".into(),
            responded_by: "gatekeeper".into(),
        }
    }

    #[test]
    fn action_table() {
        use DecisionAction::*;
        let cases = [
            (Intent::Approve, SubjectKind::Member, ApproveAccessWrongPlateMember),
            (Intent::Approve, SubjectKind::Ticket, ApproveAccessWrongPlateTicket),
            (Intent::Reject, SubjectKind::Member, DenyAccessWrongPlateMember),
            (Intent::Reject, SubjectKind::Ticket, DenyAccessWrongPlateTicket),
        ];
        for (intent, kind, expected) in cases {
            let action = action_for(intent, kind);
            assert_eq!(action, expected);
            assert_eq!(action.is_approval(), intent == Intent::Approve);
            assert_eq!(reason_for(intent, "bob").is_empty(), intent == Intent::Approve);
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                json!(action.as_str())
            );
        }
    }

    #[test]
    fn ticket_reject_wire_shape() {
        let payload = GateCheckPayload {
            gate: Some(Gate {
                name: "GATE-2".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let decision = PendingDecision::new(SubjectId::TicketId(42), payload);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        let response = build_response(Intent::Reject, &decision, &identity("alice"), at);
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "deny-access-wrong-plate-ticket",
                "payload": {
                    "gate_name": "GATE-2",
                    "reason": "Denied by operator alice",
                    "ticket_id": 42
                },
                "meta": {
                    "timestamp": "2024-05-01T08:30:00.000Z",
                    "responded_by": "gatekeeper",
                    "client_id": "tok-1"
                }
            })
        );
    }

    #[test]
    fn member_approve_has_no_ticket_id() {
        let decision = PendingDecision::new(
            SubjectId::MemberNumber("M1".into()),
            GateCheckPayload::default(),
        );
        let response = build_response(Intent::Approve, &decision, &identity("bob"), Utc::now());
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["payload"]["member_number"], json!("M1"));
        assert!(value["payload"].get("ticket_id").is_none());
        assert_eq!(value["payload"]["gate_name"], json!(""));
        assert_eq!(value["payload"]["reason"], json!(""));
    }

    #[test]
    fn intent_parses() {
        assert_eq!("Approve".parse::<Intent>().unwrap(), Intent::Approve);
        assert_eq!("deny".parse::<Intent>().unwrap(), Intent::Reject);
        assert!("maybe".parse::<Intent>().is_err());
    }
}
