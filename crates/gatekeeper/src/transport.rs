//! Socket seam between the session state machine and the network.

use url::Url;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_ABNORMAL: u16 = 1006;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { code: u16, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket is not open")]
    NotOpen,
    #[error("failed to start connection: {0}")]
    Connect(String),
}

/// Non-blocking socket handle. Results of `connect` arrive later as
/// [`TransportEvent`]s; calls themselves never wait on the network.
pub trait Transport: Send {
    fn connect(&mut self, endpoint: &Url) -> Result<(), TransportError>;

    fn send(&mut self, text: String) -> Result<(), TransportError>;

    fn close(&mut self, code: u16, reason: &str);
}
