use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{GateCheckPayload, SubjectId, SubjectKind};

/// The outstanding approval request shown to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDecision {
    pub id: Uuid,
    pub subject: SubjectId,
    pub payload: GateCheckPayload,
    pub received_at: DateTime<Utc>,
}

impl PendingDecision {
    pub fn new(subject: SubjectId, payload: GateCheckPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn subject_kind(&self) -> SubjectKind {
        self.subject.kind()
    }
}

/// Single-slot decision state: at most one pending decision, last write wins.
#[derive(Debug, Default)]
pub struct DecisionSlot {
    pending: Option<PendingDecision>,
    last_observed: Option<GateCheckPayload>,
    prompt_open: bool,
}

impl DecisionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the payload of any event, approval or not.
    pub fn observe(&mut self, payload: GateCheckPayload) {
        self.last_observed = Some(payload);
    }

    pub fn last_observed(&self) -> Option<&GateCheckPayload> {
        self.last_observed.as_ref()
    }

    /// Installs `decision` and opens the prompt. Returns the decision it
    /// replaced, which will never be answered.
    pub fn promote(&mut self, decision: PendingDecision) -> Option<PendingDecision> {
        self.prompt_open = true;
        self.pending.replace(decision)
    }

    pub fn current(&self) -> Option<&PendingDecision> {
        self.pending.as_ref()
    }

    pub fn is_prompt_open(&self) -> bool {
        self.prompt_open
    }

    /// Clears the slot after a response for `id` went out. A newer decision
    /// that arrived in the meantime is left in place.
    pub fn resolve(&mut self, id: Uuid) -> Option<PendingDecision> {
        match &self.pending {
            Some(current) if current.id == id => {
                self.prompt_open = false;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Closes the prompt without answering.
    pub fn dismiss(&mut self) -> Option<PendingDecision> {
        self.prompt_open = false;
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(number: &str) -> PendingDecision {
        PendingDecision::new(
            SubjectId::MemberNumber(number.into()),
            GateCheckPayload::default(),
        )
    }

    #[test]
    fn promote_overwrites() {
        let mut slot = DecisionSlot::new();
        assert!(slot.promote(decision("M1")).is_none());
        let superseded = slot.promote(decision("M2")).expect("first is superseded");

        assert_eq!(superseded.subject, SubjectId::MemberNumber("M1".into()));
        assert_eq!(
            slot.current().map(|d| d.subject.clone()),
            Some(SubjectId::MemberNumber("M2".into()))
        );
        assert!(slot.is_prompt_open());
    }

    #[test]
    fn resolve_ignores_stale_id() {
        let mut slot = DecisionSlot::new();
        let first = decision("M1");
        let first_id = first.id;
        slot.promote(first);
        slot.promote(decision("M2"));

        assert!(slot.resolve(first_id).is_none());
        assert!(slot.current().is_some());
        assert!(slot.is_prompt_open());

        let current_id = slot.current().map(|d| d.id).unwrap();
        assert!(slot.resolve(current_id).is_some());
        assert!(slot.current().is_none());
        assert!(!slot.is_prompt_open());
    }

    #[test]
    fn dismiss_keeps_last_observed() {
        let mut slot = DecisionSlot::new();
        slot.observe(GateCheckPayload {
            detected_plate: Some("B999".into()),
            ..Default::default()
        });
        slot.promote(decision("M1"));

        assert!(slot.dismiss().is_some());
        assert!(slot.current().is_none());
        assert_eq!(
            slot.last_observed().and_then(|p| p.detected_plate.as_deref()),
            Some("B999")
        );
    }
}
