use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub const MEMBER_WRONG_PLATE: &str = "MEMBER_WITH_WRONG_PLATE_NEED_APPROVAL";
pub const TICKET_WRONG_PLATE: &str = "TICKET_WITH_WRONG_PLATE_NEED_APPROVAL";

/// Inbound event discriminator. Unknown kinds are kept verbatim and treated
/// as informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    MemberWrongPlateNeedApproval,
    TicketWrongPlateNeedApproval,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::MemberWrongPlateNeedApproval => MEMBER_WRONG_PLATE,
            EventKind::TicketWrongPlateNeedApproval => TICKET_WRONG_PLATE,
            EventKind::Other(raw) => raw.as_str(),
        }
    }

    pub fn needs_approval(&self) -> bool {
        matches!(
            self,
            EventKind::MemberWrongPlateNeedApproval | EventKind::TicketWrongPlateNeedApproval
        )
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            MEMBER_WRONG_PLATE => EventKind::MemberWrongPlateNeedApproval,
            TICKET_WRONG_PLATE => EventKind::TicketWrongPlateNeedApproval,
            _ => EventKind::Other(raw),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ "type": ..., "payload": ... }` as sent by the gatekeeper service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub payload: GateCheckPayload,
}

/// Gate-check payload. Only the subject ids matter for correlation; every
/// other field is display-only and degrades to `None` when its shape is
/// unexpected instead of rejecting the event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateCheckPayload {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub gate: Option<Gate>,
    /// Image captured at the moment of the check.
    #[serde(
        default,
        alias = "captured_image",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub detected_plate: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketInfo>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberInfo>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub current_track: Option<Track>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    /// Numeric or string, depending on the gatekeeper deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub name: String,
    #[serde(
        default,
        rename = "type",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketInfo {
    #[serde(deserialize_with = "integer_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub vehicle_plate: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub entered_at: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<String>,
    #[serde(default, deserialize_with = "first_picture", skip_serializing_if = "Option::is_none")]
    pub picture_in: Option<Picture>,
    #[serde(default, deserialize_with = "first_picture", skip_serializing_if = "Option::is_none")]
    pub picture_out: Option<Picture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(deserialize_with = "text_id")]
    pub number: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub vehicle_plate: Option<String>,
}

/// Open entry/exit record for a member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub entered_at: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<String>,
    #[serde(default, deserialize_with = "first_picture", skip_serializing_if = "Option::is_none")]
    pub picture_in: Option<Picture>,
    #[serde(default, deserialize_with = "first_picture", skip_serializing_if = "Option::is_none")]
    pub picture_out: Option<Picture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Picture {
    pub image_url: String,
}

/// Any value that does not fit `T` becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// A picture is sent either as one object or as a list; the first wins.
fn first_picture<'de, D>(deserializer: D) -> Result<Option<Picture>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match lenient::<_, OneOrMany<Picture>>(deserializer)? {
        Some(OneOrMany::One(picture)) => Some(picture),
        Some(OneOrMany::Many(pictures)) => pictures.into_iter().next(),
        None => None,
    })
}

fn integer_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("id {number} is not an integer"))),
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("id '{text}' is not an integer"))),
        other => Err(serde::de::Error::custom(format!("unusable id {other}"))),
    }
}

fn text_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) if !text.trim().is_empty() => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!("unusable member number {other}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectKind {
    Member,
    Ticket,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::Member => f.write_str("member"),
            SubjectKind::Ticket => f.write_str("ticket"),
        }
    }
}

/// Identity of the vehicle's subject, fixed when the event is classified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectId {
    MemberNumber(String),
    TicketId(i64),
}

impl SubjectId {
    pub fn kind(&self) -> SubjectKind {
        match self {
            SubjectId::MemberNumber(_) => SubjectKind::Member,
            SubjectId::TicketId(_) => SubjectKind::Ticket,
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::MemberNumber(number) => write!(f, "member {number}"),
            SubjectId::TicketId(id) => write!(f, "ticket #{id}"),
        }
    }
}

impl GateCheckPayload {
    /// Member wins when a payload inconsistently carries both.
    pub fn subject(&self) -> Option<SubjectId> {
        if let Some(member) = &self.member {
            return Some(SubjectId::MemberNumber(member.number.clone()));
        }
        self.ticket
            .as_ref()
            .map(|ticket| SubjectId::TicketId(ticket.id))
    }

    pub fn gate_name(&self) -> &str {
        self.gate.as_ref().map(|g| g.name.as_str()).unwrap_or("")
    }

    pub fn subject_name(&self) -> Option<&str> {
        match (&self.member, &self.ticket) {
            (Some(member), _) => member.full_name.as_deref(),
            (None, Some(ticket)) => ticket.full_name.as_deref(),
            (None, None) => None,
        }
    }

    /// Plate on file for the subject, to compare with `detected_plate`.
    pub fn registered_plate(&self) -> Option<&str> {
        match (&self.member, &self.ticket) {
            (Some(member), _) => member.vehicle_plate.as_deref(),
            (None, Some(ticket)) => ticket.vehicle_plate.as_deref(),
            (None, None) => None,
        }
    }

    /// Entry photo. A member without an open track is entering right now, so
    /// the live capture is the entry photo.
    pub fn picture_in(&self) -> Option<&str> {
        match (&self.member, &self.ticket) {
            (Some(_), _) => match &self.current_track {
                Some(track) => track.picture_in.as_ref().map(|p| p.image_url.as_str()),
                None => self.image.as_deref(),
            },
            (None, Some(ticket)) => ticket.picture_in.as_ref().map(|p| p.image_url.as_str()),
            (None, None) => None,
        }
    }

    /// Exit photo, falling back to the live capture while the exit is being
    /// checked.
    pub fn picture_out(&self) -> Option<&str> {
        match (&self.member, &self.ticket) {
            (Some(_), _) => match &self.current_track {
                Some(track) if track.picture_in.is_some() => track
                    .picture_out
                    .as_ref()
                    .map(|p| p.image_url.as_str())
                    .or(self.image.as_deref()),
                _ => None,
            },
            (None, Some(ticket)) => ticket
                .picture_out
                .as_ref()
                .map(|p| p.image_url.as_str())
                .or(self.image.as_deref()),
            (None, None) => None,
        }
    }

    pub fn time_in(&self) -> Option<&str> {
        match (&self.member, &self.ticket) {
            (Some(_), _) => self
                .current_track
                .as_ref()
                .and_then(|t| t.entered_at.as_deref()),
            (None, Some(ticket)) => ticket.entered_at.as_deref(),
            (None, None) => None,
        }
    }

    pub fn time_out(&self) -> Option<&str> {
        match (&self.member, &self.ticket) {
            (Some(_), _) => self
                .current_track
                .as_ref()
                .and_then(|t| t.exited_at.as_deref()),
            (None, Some(ticket)) => ticket.exited_at.as_deref(),
            (None, None) => None,
        }
    }
}
