use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a remote cache-build execution, as reported by the build service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildExecutionState {
    Busy,
    Queued,
    Running,
    Finalized,
    NoExists,
    Aborted,
}

impl BuildExecutionState {
    /// Terminal states end a watch; the others keep it alive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::NoExists | Self::Aborted)
    }
}

impl fmt::Display for BuildExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "busy"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Finalized => write!(f, "finalized"),
            Self::NoExists => write!(f, "no-exists"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Status snapshot of a remote build execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildExecutionResult {
    pub uid: Uuid,
    pub state: BuildExecutionState,
    pub message: Option<String>,
    pub total_progress: u32,
    pub current_progress: u32,
    pub error_message: Option<String>,
}

impl BuildExecutionResult {
    /// A result in `state` with no message, progress or error.
    pub fn new(uid: Uuid, state: BuildExecutionState) -> Self {
        Self {
            uid,
            state,
            message: None,
            total_progress: 0,
            current_progress: 0,
            error_message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, total: u32, current: u32) -> Self {
        self.total_progress = total;
        self.current_progress = current;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(BuildExecutionState::Finalized.is_terminal());
        assert!(BuildExecutionState::NoExists.is_terminal());
        assert!(BuildExecutionState::Aborted.is_terminal());
        assert!(!BuildExecutionState::Busy.is_terminal());
        assert!(!BuildExecutionState::Queued.is_terminal());
        assert!(!BuildExecutionState::Running.is_terminal());
    }

    #[test]
    fn builder_sets_fields() {
        let uid = Uuid::now_v7();
        let r = BuildExecutionResult::new(uid, BuildExecutionState::Running)
            .with_message("indexing")
            .with_progress(10, 4);
        assert_eq!(r.uid, uid);
        assert_eq!(r.message.as_deref(), Some("indexing"));
        assert_eq!((r.total_progress, r.current_progress), (10, 4));
        assert!(r.error_message.is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let r = BuildExecutionResult::new(Uuid::nil(), BuildExecutionState::Aborted).with_error("x");
        let json = serde_json::to_string(&r).unwrap();
        let parsed: BuildExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(r, parsed);
    }
}
