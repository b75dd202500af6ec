//! Invite link parsing.
//!
//! Turns a raw group link into a [`LinkReference`]. Invite-hash shapes are tried
//! before username shapes: `t.me/<name>` would otherwise swallow a malformed
//! `t.me/joinchat` link.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed reference to a group, derived from a raw link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LinkReference {
    /// Public group addressed by its username.
    Username(String),
    /// Private group addressed by the hash embedded in its invite link.
    InviteHash(String),
    /// The link matched no known shape.
    Invalid,
}

impl LinkReference {
    /// Returns true if the link could not be parsed.
    pub fn is_invalid(&self) -> bool {
        matches!(self, LinkReference::Invalid)
    }
}

impl fmt::Display for LinkReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkReference::Username(name) => write!(f, "username:{}", name),
            LinkReference::InviteHash(hash) => write!(f, "invite:{}", hash),
            LinkReference::Invalid => write!(f, "invalid"),
        }
    }
}

/// Compiled link patterns.
#[derive(Debug, Clone)]
pub struct LinkParser {
    invite_patterns: Vec<Regex>,
    username_patterns: Vec<Regex>,
}

impl Default for LinkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkParser {
    /// Creates a parser with the `t.me` / `telegram.me` link shapes.
    ///
    /// # Panics
    /// Panics if a built-in pattern fails to compile.
    pub fn new() -> Self {
        let compile = |pattern: &str| Regex::new(pattern).expect("Invalid link pattern");
        Self {
            invite_patterns: vec![
                compile(r"\b(?i:(?:t|telegram)\.me)/\+([A-Za-z0-9_-]+)"),
                compile(r"\b(?i:(?:t|telegram)\.me)/joinchat/([A-Za-z0-9_-]+)"),
            ],
            username_patterns: vec![compile(
                r"\b(?i:(?:t|telegram)\.me)/([A-Za-z0-9_]+)/?(?:\?.*)?$",
            )],
        }
    }

    /// Parses a raw link. Never fails; unknown shapes become [`LinkReference::Invalid`].
    pub fn parse(&self, raw: &str) -> LinkReference {
        let raw = raw.trim();

        if let Some(hash) = first_capture(&self.invite_patterns, raw) {
            return LinkReference::InviteHash(hash.to_string());
        }

        match first_capture(&self.username_patterns, raw) {
            Some(name) if !name.contains('+') && !name.contains("joinchat") => {
                LinkReference::Username(name.to_string())
            }
            _ => LinkReference::Invalid,
        }
    }
}

fn first_capture<'a>(patterns: &[Regex], text: &'a str) -> Option<&'a str> {
    patterns
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Parses a raw link with a freshly built [`LinkParser`].
///
/// Prefer holding a parser when parsing many links.
pub fn parse(raw: &str) -> LinkReference {
    LinkParser::new().parse(raw)
}
