//! Table-driven classifier for raw provider errors.
//!
//! Patterns are evaluated in order and the first match wins. This table is the only
//! place in the crate that knows provider error vocabulary.

use regex::Regex;

use super::{ClassifiedError, ErrorKind};

/// A signal pattern mapped to a taxonomy member.
#[derive(Debug)]
pub struct ErrorPattern {
    /// The compiled regex pattern. For [`ErrorKind::RateLimited`] the first
    /// capture group, if any, holds the wait in seconds.
    regex: Regex,
    /// The taxonomy member assigned on match.
    kind: ErrorKind,
    /// What this pattern detects.
    description: String,
}

impl ErrorPattern {
    /// Creates a new error pattern.
    ///
    /// # Panics
    /// Panics if the regex pattern is invalid.
    pub fn new(pattern: &str, kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
            kind,
            description: description.into(),
        }
    }

    /// Creates a new error pattern with a pre-compiled regex.
    pub fn with_regex(regex: Regex, kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            regex,
            kind,
            description: description.into(),
        }
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Checks if this pattern matches the given text.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Builds the classified error for `text`, or `None` if the pattern does not match.
    fn classify(&self, text: &str) -> Option<ClassifiedError> {
        let captures = self.regex.captures(text)?;
        let classified = match self.kind {
            ErrorKind::AlreadyMember => ClassifiedError::AlreadyMember,
            ErrorKind::Expired => ClassifiedError::Expired,
            ErrorKind::Invalid => ClassifiedError::Invalid,
            ErrorKind::PrivateRestricted => ClassifiedError::PrivateRestricted,
            ErrorKind::PendingApproval => ClassifiedError::PendingApproval,
            ErrorKind::TooManyJoins => ClassifiedError::TooManyJoins,
            ErrorKind::RateLimited => ClassifiedError::RateLimited(
                captures
                    .get(1)
                    .and_then(|secs| secs.as_str().parse::<u64>().ok()),
            ),
            ErrorKind::ProviderUnavailable => ClassifiedError::ProviderUnavailable,
            ErrorKind::Unknown => ClassifiedError::Unknown(text.to_string()),
        };
        Some(classified)
    }
}

/// Maps raw provider error text onto [`ClassifiedError`].
#[derive(Debug)]
pub struct ErrorClassifier {
    /// Patterns in priority order.
    patterns: Vec<ErrorPattern>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Creates a classifier with the built-in provider signal table.
    pub fn new() -> Self {
        Self {
            patterns: Self::default_patterns(),
        }
    }

    /// Creates a classifier with custom patterns.
    pub fn with_patterns(patterns: Vec<ErrorPattern>) -> Self {
        Self { patterns }
    }

    /// The built-in signal table. Order matters: first match wins.
    fn default_patterns() -> Vec<ErrorPattern> {
        vec![
            // Membership race; the only signal the join sequence can continue past.
            ErrorPattern::new(
                r"USER_ALREADY_PARTICIPANT",
                ErrorKind::AlreadyMember,
                "Account is already a participant",
            ),
            // Flood control, with the wait usually embedded as a suffix
            ErrorPattern::new(
                r"FLOOD_(?:PREMIUM_)?WAIT(?:_(\d+))?",
                ErrorKind::RateLimited,
                "Flood wait",
            ),
            ErrorPattern::new(
                r"(?i)a wait of (\d+) seconds is required",
                ErrorKind::RateLimited,
                "Flood wait (descriptive form)",
            ),
            // Invite and lookup failures
            ErrorPattern::new(
                r"INVITE_HASH_EXPIRED",
                ErrorKind::Expired,
                "Invite link expired",
            ),
            ErrorPattern::new(
                r"INVITE_HASH_(?:INVALID|EMPTY)",
                ErrorKind::Invalid,
                "Invite hash invalid",
            ),
            ErrorPattern::new(
                r"USERNAME_(?:INVALID|NOT_OCCUPIED)",
                ErrorKind::Invalid,
                "Username invalid or unused",
            ),
            ErrorPattern::new(r"CHANNEL_INVALID", ErrorKind::Invalid, "Channel invalid"),
            ErrorPattern::new(
                r"INVITE_REQUEST_SENT",
                ErrorKind::PendingApproval,
                "Join request awaiting approval",
            ),
            ErrorPattern::new(
                r"CHANNELS_TOO_MUCH",
                ErrorKind::TooManyJoins,
                "Too many channels joined",
            ),
            // Access restrictions
            ErrorPattern::new(
                r"CHANNEL_PRIVATE",
                ErrorKind::PrivateRestricted,
                "Channel is private",
            ),
            ErrorPattern::new(
                r"CHAT_WRITE_FORBIDDEN",
                ErrorKind::PrivateRestricted,
                "Posting forbidden",
            ),
            ErrorPattern::new(
                r"USER_BANNED_IN_CHANNEL",
                ErrorKind::PrivateRestricted,
                "Account banned in channel",
            ),
            // Transport and server-side failures
            ErrorPattern::new(
                r"RPC_(?:CALL|MCGET)_FAIL",
                ErrorKind::ProviderUnavailable,
                "Provider RPC failure",
            ),
            ErrorPattern::new(
                r"(?i)not[\s_]connected",
                ErrorKind::ProviderUnavailable,
                "Client not connected",
            ),
            ErrorPattern::new(
                r"(?i)connection\s*(?:reset|closed|refused)",
                ErrorKind::ProviderUnavailable,
                "Connection error",
            ),
            ErrorPattern::new(
                r"(?i)\btime(?:d\s*)?out\b",
                ErrorKind::ProviderUnavailable,
                "Request timed out",
            ),
        ]
    }

    /// Adds a custom pattern after the built-in ones.
    pub fn add_pattern(&mut self, pattern: ErrorPattern) {
        self.patterns.push(pattern);
    }

    /// Returns the number of patterns configured.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Returns a reference to all configured patterns.
    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    /// Classifies raw provider error text.
    ///
    /// Never fails: text no pattern recognizes becomes [`ClassifiedError::Unknown`]
    /// carrying the raw message.
    pub fn classify(&self, raw: &str) -> ClassifiedError {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.classify(raw))
            .unwrap_or_else(|| ClassifiedError::Unknown(raw.to_string()))
    }
}
