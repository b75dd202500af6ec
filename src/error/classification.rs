//! Closed error taxonomy for provider failures.
//!
//! Every raw provider error is folded into one [`ClassifiedError`]. The coordinator
//! branches only on these variants; provider vocabulary never leaks past the
//! classifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Field-less discriminant of [`ClassifiedError`], used for persistence and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The account is already a member of the group.
    AlreadyMember,
    /// The invite link has expired.
    Expired,
    /// The link, hash, or username does not refer to a joinable group.
    Invalid,
    /// The group is private or the account may not post in it.
    PrivateRestricted,
    /// A join request was filed and awaits admin approval.
    PendingApproval,
    /// The account has joined too many groups.
    TooManyJoins,
    /// The provider asked the caller to slow down.
    RateLimited,
    /// The provider could not be reached or failed internally.
    ProviderUnavailable,
    /// Nothing in the classifier table matched.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::AlreadyMember => write!(f, "already_member"),
            ErrorKind::Expired => write!(f, "expired"),
            ErrorKind::Invalid => write!(f, "invalid"),
            ErrorKind::PrivateRestricted => write!(f, "private_restricted"),
            ErrorKind::PendingApproval => write!(f, "pending_approval"),
            ErrorKind::TooManyJoins => write!(f, "too_many_joins"),
            ErrorKind::RateLimited => write!(f, "rate_limited"),
            ErrorKind::ProviderUnavailable => write!(f, "provider_unavailable"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A provider failure mapped onto the closed taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedError {
    AlreadyMember,
    Expired,
    Invalid,
    PrivateRestricted,
    PendingApproval,
    TooManyJoins,
    /// Seconds to wait, when the provider said so in a form we could read.
    RateLimited(Option<u64>),
    ProviderUnavailable,
    /// Raw provider message, kept verbatim.
    Unknown(String),
}

impl ClassifiedError {
    /// Returns the discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifiedError::AlreadyMember => ErrorKind::AlreadyMember,
            ClassifiedError::Expired => ErrorKind::Expired,
            ClassifiedError::Invalid => ErrorKind::Invalid,
            ClassifiedError::PrivateRestricted => ErrorKind::PrivateRestricted,
            ClassifiedError::PendingApproval => ErrorKind::PendingApproval,
            ClassifiedError::TooManyJoins => ErrorKind::TooManyJoins,
            ClassifiedError::RateLimited(_) => ErrorKind::RateLimited,
            ClassifiedError::ProviderUnavailable => ErrorKind::ProviderUnavailable,
            ClassifiedError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Returns true if the join sequence may continue past this error.
    ///
    /// Only [`ClassifiedError::AlreadyMember`] qualifies, and only while joining.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClassifiedError::AlreadyMember)
    }

    /// Wait duration for rate-limit errors.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ClassifiedError::RateLimited(secs) => *secs,
            _ => None,
        }
    }

    /// Human-readable explanation suitable for the caller.
    pub fn user_message(&self) -> String {
        match self {
            ClassifiedError::AlreadyMember => "Already a member of this group".to_string(),
            ClassifiedError::Expired => "Invite link has expired".to_string(),
            ClassifiedError::Invalid => "Invalid group link or group not found".to_string(),
            ClassifiedError::PrivateRestricted => {
                "This group is private or restricted and requires an invitation".to_string()
            }
            ClassifiedError::PendingApproval => {
                "Join request sent. Awaiting admin approval.".to_string()
            }
            ClassifiedError::TooManyJoins => {
                "Too many channels joined. Leave some channels first.".to_string()
            }
            ClassifiedError::RateLimited(Some(secs)) => {
                format!("Rate limited by provider. Please wait {} seconds.", secs)
            }
            ClassifiedError::RateLimited(None) => {
                "Rate limited by provider. Please wait before retrying.".to_string()
            }
            ClassifiedError::ProviderUnavailable => {
                "Messaging provider is unavailable".to_string()
            }
            ClassifiedError::Unknown(raw) => format!("Provider error: {}", raw),
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ClassifiedError {}
