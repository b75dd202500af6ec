//! Messaging provider traits
//!
//! This module defines the narrow interface the join workflow needs from a
//! messaging platform client. Implementations wrap the platform's remote protocol;
//! none ships with this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Raw error reported by the provider.
///
/// The message is kept verbatim; interpreting it is the classifier's job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider error text, e.g. `"420: FLOOD_WAIT_30 (caused by channels.JoinChannel)"`.
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Opaque handle to a resolved chat or channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntity {
    /// Provider-side identifier
    pub id: i64,
    /// Display title, when known
    pub title: Option<String>,
    /// Public username, when the chat has one
    pub username: Option<String>,
}

impl ChatEntity {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            title: None,
            username: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl fmt::Display for ChatEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.title, &self.username) {
            (Some(title), _) => write!(f, "{} ({})", title, self.id),
            (None, Some(username)) => write!(f, "@{} ({})", username, self.id),
            (None, None) => write!(f, "chat {}", self.id),
        }
    }
}

/// Result of importing an invite hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteImport {
    /// Chats touched by the import; the joined chat comes first.
    pub chats: Vec<ChatEntity>,
}

/// Result of inspecting an invite hash without joining.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteCheck {
    /// Present only when the account can already see the chat.
    pub chat: Option<ChatEntity>,
}

/// The account the provider session is logged in as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl AccountIdentity {
    /// Placeholder used when no human-readable name is available.
    pub const UNKNOWN: &'static str = "Unknown";

    /// Username if set, otherwise the full name, otherwise [`Self::UNKNOWN`].
    pub fn display_name(&self) -> String {
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return username.to_string();
        }
        let full_name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let full_name = full_name.trim();
        if full_name.is_empty() {
            Self::UNKNOWN.to_string()
        } else {
            full_name.to_string()
        }
    }
}

/// Credentials used to establish a provider session.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    /// Application id issued by the platform
    #[serde(default)]
    pub api_id: i32,
    /// Application hash issued by the platform
    #[serde(default)]
    pub api_hash: String,
    /// Serialized session; empty means the account has not been authenticated yet
    #[serde(default)]
    pub session: String,
}

impl ProviderCredentials {
    pub fn new(api_id: i32, api_hash: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            api_id,
            api_hash: api_hash.into(),
            session: session.into(),
        }
    }

    /// Returns true if a saved session is available to connect with.
    pub fn has_session(&self) -> bool {
        !self.session.is_empty()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &redact(&self.api_hash))
            .field("session", &redact(&self.session))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Client for a messaging platform, as seen by the join workflow.
///
/// One client is shared by every concurrent attempt. Implementations must be safe
/// to call concurrently; any serialization the remote protocol needs is theirs
/// to provide.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Resolve a username (or, as a fallback, an invite hash) to a chat.
    async fn resolve_entity(&self, reference: &str) -> ProviderResult<ChatEntity>;

    /// Join a public group or channel.
    async fn join_by_username(&self, entity: &ChatEntity) -> ProviderResult<()>;

    /// Join a private group through its invite hash.
    async fn import_invite(&self, hash: &str) -> ProviderResult<InviteImport>;

    /// Inspect an invite hash without joining.
    async fn check_invite(&self, hash: &str) -> ProviderResult<InviteCheck>;

    /// Post a text message to a chat.
    async fn send_message(&self, entity: &ChatEntity, text: &str) -> ProviderResult<()>;

    /// Fetch the logged-in account.
    async fn get_self(&self) -> ProviderResult<AccountIdentity>;

    /// Close the session. Called once, by [`super::ProviderConnection`].
    async fn disconnect(&self) -> ProviderResult<()>;
}

/// Establishes provider sessions from credentials.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    /// Returns the name of this provider (e.g., "telegram")
    fn name(&self) -> &str;

    /// Open a session with the given credentials.
    async fn connect(
        &self,
        credentials: &ProviderCredentials,
    ) -> ProviderResult<Arc<dyn ProviderClient>>;
}
