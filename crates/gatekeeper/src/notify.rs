use crate::pending::PendingDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Short operator-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: None,
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Operator surface the session reports to.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);

    /// Called when the approval prompt opens (`Some`) or closes (`None`).
    fn prompt(&self, _decision: Option<&PendingDecision>) {}
}
