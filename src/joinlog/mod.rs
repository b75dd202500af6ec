//! Join attempt records and their lifecycle.
//!
//! A [`JoinAttempt`] is the audit record for one run of the join workflow. The
//! record enforces its own transition rules in [`JoinAttempt::apply`], so every
//! [`JoinLogStore`] implementation rejects the same illegal updates.

pub mod file_store;
pub mod store;

pub use file_store::FileJoinLogStore;
pub use store::{JoinLogStore, MemoryJoinLogStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

use crate::error::{ClassifiedError, ErrorKind};

/// Lifecycle state of a join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinState {
    /// Created; the provider has not confirmed membership yet
    Joining,
    /// A chat entity was obtained
    Joined,
    /// Membership confirmed
    Verified,
    /// Confirmation message posted (terminal)
    MessageSent,
    /// Attempt ended with an error (terminal)
    Failed,
}

impl JoinState {
    /// Position on the success path, or `None` for [`JoinState::Failed`].
    pub fn stage(self) -> Option<u8> {
        match self {
            JoinState::Joining => Some(0),
            JoinState::Joined => Some(1),
            JoinState::Verified => Some(2),
            JoinState::MessageSent => Some(3),
            JoinState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JoinState::MessageSent | JoinState::Failed)
    }

    /// Returns true if `next` is a legal successor of `self`.
    ///
    /// The success path advances one stage at a time; any non-terminal state may
    /// fail; terminal states have no successors.
    pub fn can_transition_to(self, next: JoinState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.stage(), next.stage()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinState::Joining => write!(f, "joining"),
            JoinState::Joined => write!(f, "joined"),
            JoinState::Verified => write!(f, "verified"),
            JoinState::MessageSent => write!(f, "message_sent"),
            JoinState::Failed => write!(f, "failed"),
        }
    }
}

/// Persisted description of why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }
}

impl From<&ClassifiedError> for ErrorDetail {
    fn from(error: &ClassifiedError) -> Self {
        Self {
            kind: error.kind(),
            message: error.user_message(),
            retry_after_secs: error.retry_after_secs(),
        }
    }
}

/// Audit record for one execution of the join workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAttempt {
    pub id: String,
    /// External correlation id, e.g. a marketplace listing
    pub group_ref: Option<String>,
    pub raw_link: String,
    pub state: JoinState,
    /// Present only when `state` is [`JoinState::Failed`]
    pub error_detail: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub message_sent_at: Option<DateTime<Utc>>,
}

impl JoinAttempt {
    /// Create a fresh record in [`JoinState::Joining`].
    pub fn new(id: impl Into<String>, request: NewJoinAttempt) -> Self {
        Self {
            id: id.into(),
            group_ref: request.group_ref,
            raw_link: request.raw_link,
            state: JoinState::Joining,
            error_detail: None,
            created_at: Utc::now(),
            joined_at: None,
            verified_at: None,
            message_sent_at: None,
        }
    }

    /// Most recent timestamp on the record.
    pub fn last_updated_at(&self) -> DateTime<Utc> {
        [self.joined_at, self.verified_at, self.message_sent_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, |latest, at| latest.max(at))
    }

    /// Apply a partial update, enforcing the lifecycle rules.
    ///
    /// Timestamps are clamped so they never precede one already on the record.
    ///
    /// # Errors
    ///
    /// Rejects updates to terminal records, illegal transitions, and error details
    /// that do not accompany a move to [`JoinState::Failed`].
    pub fn apply(&mut self, update: JoinLogUpdate) -> JoinLogResult<()> {
        if self.state.is_terminal() {
            return Err(JoinLogError::Terminal {
                id: self.id.clone(),
                state: self.state,
            });
        }

        if let Some(next) = update.state {
            if !self.state.can_transition_to(next) {
                return Err(JoinLogError::InvalidTransition {
                    id: self.id.clone(),
                    from: self.state,
                    to: next,
                });
            }
        }

        let failing = update.state == Some(JoinState::Failed);
        if failing != update.error_detail.is_some() {
            return Err(JoinLogError::InconsistentUpdate(format!(
                "attempt {}: error detail must accompany exactly the move to failed",
                self.id
            )));
        }

        let floor = self.last_updated_at();
        if let Some(at) = update.joined_at {
            self.joined_at = Some(at.max(floor));
        }
        let floor = self.last_updated_at();
        if let Some(at) = update.verified_at {
            self.verified_at = Some(at.max(floor));
        }
        let floor = self.last_updated_at();
        if let Some(at) = update.message_sent_at {
            self.message_sent_at = Some(at.max(floor));
        }
        if let Some(next) = update.state {
            self.state = next;
        }
        if update.error_detail.is_some() {
            self.error_detail = update.error_detail;
        }
        Ok(())
    }

    /// Condensed view for status listings.
    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            id: self.id.clone(),
            group_ref: self.group_ref.clone(),
            raw_link: self.raw_link.clone(),
            state: self.state,
            error: self.error_detail.as_ref().map(|d| d.message.clone()),
            created_at: self.created_at,
            updated_at: self.last_updated_at(),
        }
    }
}

/// Fields supplied when an attempt is first recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJoinAttempt {
    pub raw_link: String,
    pub group_ref: Option<String>,
}

impl NewJoinAttempt {
    pub fn new(raw_link: impl Into<String>, group_ref: Option<String>) -> Self {
        Self {
            raw_link: raw_link.into(),
            group_ref,
        }
    }
}

/// Partial update to a [`JoinAttempt`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinLogUpdate {
    pub state: Option<JoinState>,
    pub error_detail: Option<ErrorDetail>,
    pub joined_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub message_sent_at: Option<DateTime<Utc>>,
}

impl JoinLogUpdate {
    pub fn joined(at: DateTime<Utc>) -> Self {
        Self {
            state: Some(JoinState::Joined),
            joined_at: Some(at),
            ..Self::default()
        }
    }

    pub fn verified(at: DateTime<Utc>) -> Self {
        Self {
            state: Some(JoinState::Verified),
            verified_at: Some(at),
            ..Self::default()
        }
    }

    pub fn message_sent(at: DateTime<Utc>) -> Self {
        Self {
            state: Some(JoinState::MessageSent),
            message_sent_at: Some(at),
            ..Self::default()
        }
    }

    pub fn failed(detail: ErrorDetail) -> Self {
        Self {
            state: Some(JoinState::Failed),
            error_detail: Some(detail),
            ..Self::default()
        }
    }
}

/// One row of a status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub id: String,
    pub group_ref: Option<String>,
    pub raw_link: String,
    pub state: JoinState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors that can occur during join log operations.
#[derive(Error, Debug)]
pub enum JoinLogError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Log file version is newer than this build understands.
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// No attempt with the given id.
    #[error("Join attempt not found: {0}")]
    NotFound(String),

    #[error("Join attempt {id} is {state} and can no longer change")]
    Terminal { id: String, state: JoinState },

    #[error("Join attempt {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JoinState,
        to: JoinState,
    },

    #[error("Inconsistent update: {0}")]
    InconsistentUpdate(String),
}

/// Result type for join log operations.
pub type JoinLogResult<T> = Result<T, JoinLogError>;
