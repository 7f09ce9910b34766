use serde::{Deserialize, Serialize};

use crate::sequence::RequestKind;
use crate::store::Collection;

/// Events sent from the session back to the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// User-facing message, e.g. a failed generation.
    Notice(Notice),
    TasksAdded(usize),
    VenuesFound(usize),
    PaletteApplied { fallback: bool },
    /// A generation result arrived after a newer request of the same kind.
    Discarded(RequestKind),
    SnapshotApplied(Collection),
    PersistenceFailed { collection: Collection, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}
