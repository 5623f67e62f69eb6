#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use sysgate_gatekeeper::{
    GateSession, ManualScheduler, Notice, Notifier, PendingDecision, SessionConfig, Transport,
    TransportError, TransportEvent,
};
use sysgate_logstore::MemoryLog;
use url::Url;

#[derive(Debug, Default)]
pub struct Recorded {
    pub connects: Vec<Url>,
    pub sent: Vec<String>,
    pub closes: Vec<(u16, String)>,
    pub fail_send: bool,
}

/// Records every call; clones share the record.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    pub fn connects(&self) -> usize {
        self.inner.lock().unwrap().connects.len()
    }

    pub fn last_endpoint(&self) -> Option<Url> {
        self.inner.lock().unwrap().connects.last().cloned()
    }

    pub fn sent(&self) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.inner.lock().unwrap().closes.clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_send = fail;
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, endpoint: &Url) -> Result<(), TransportError> {
        self.inner.lock().unwrap().connects.push(endpoint.clone());
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_send {
            return Err(TransportError::NotOpen);
        }
        inner.sent.push(text);
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.inner
            .lock()
            .unwrap()
            .closes
            .push((code, reason.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
    prompts: Mutex<Vec<Option<PendingDecision>>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }

    pub fn prompts(&self) -> Vec<Option<PendingDecision>> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn prompt(&self, decision: Option<&PendingDecision>) {
        self.prompts.lock().unwrap().push(decision.cloned());
    }
}

pub struct Harness {
    pub session: GateSession,
    pub transport: RecordingTransport,
    pub scheduler: ManualScheduler,
    pub notifier: Arc<RecordingNotifier>,
    pub log: Arc<MemoryLog>,
}

pub fn config(token: Option<&str>, operator: &str) -> SessionConfig {
    SessionConfig {
        ws_url: "wss://gate.example/ws".into(),
        role: "KEEPER".into(),
        auth_token: token.map(str::to_string),
        operator: operator.into(),
        responded_by: "gatekeeper".into(),
        reconnect_delay: Duration::from_secs(5),
    }
}

pub fn harness(token: Option<&str>, operator: &str) -> Harness {
    let transport = RecordingTransport::default();
    let scheduler = ManualScheduler::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let log = Arc::new(MemoryLog::new());
    let session = GateSession::new(
        config(token, operator),
        Box::new(transport.clone()),
        Box::new(scheduler.clone()),
        notifier.clone(),
        log.clone(),
    );
    Harness {
        session,
        transport,
        scheduler,
        notifier,
        log,
    }
}

/// Open and acknowledged by the peer.
pub fn connected(operator: &str) -> Harness {
    let mut h = harness(Some("tok-abc"), operator);
    h.session.open().unwrap();
    h.session.handle(TransportEvent::Opened);
    h
}

pub fn member_event(number: &str, gate: &str) -> String {
    serde_json::json!({
        "type": "MEMBER_WITH_WRONG_PLATE_NEED_APPROVAL",
        "payload": {
            "gate": { "id": 1, "name": gate },
            "image": "https://cdn.example/cap.jpg",
            "detected_plate": "B999XYZ",
            "member": { "id": 5, "number": number, "full_name": "Budi", "vehicle_plate": "B123ABC" }
        }
    })
    .to_string()
}

pub fn ticket_event(id: i64, gate: &str) -> String {
    serde_json::json!({
        "type": "TICKET_WITH_WRONG_PLATE_NEED_APPROVAL",
        "payload": {
            "gate": { "name": gate },
            "detected_plate": "D1XX",
            "ticket": { "id": id, "code": "TCK-1", "vehicle_plate": "D2YY" }
        }
    })
    .to_string()
}
