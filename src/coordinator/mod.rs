//! Join workflow orchestration
//!
//! [`JoinCoordinator`] drives one attempt through parse, resolve/join, verify,
//! confirm and finalize, writing every transition to the [`JoinLogStore`].
//! [`JoinService`] is the caller-facing wrapper around it.

pub mod service;

pub use service::{AccountSummary, JoinService};

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ClassifiedError, ErrorClassifier, ErrorKind};
use crate::joinlog::{
    ErrorDetail, JoinAttempt, JoinLogError, JoinLogStore, JoinLogUpdate, JoinState,
    NewJoinAttempt,
};
use crate::link::{LinkParser, LinkReference};
use crate::provider::{
    AccountIdentity, ChatEntity, ConnectionError, InviteCheck, ProviderClient, ProviderConnection,
    ProviderError,
};

/// Text posted to a group once membership is confirmed.
pub const DEFAULT_CONFIRMATION_TEXT: &str = "A";

const INVALID_LINK_MESSAGE: &str =
    "Invalid Telegram group link. Use format: t.me/username or t.me/+invitehash";

/// Misuse of the coordinator. Provider failures are never reported here; they
/// end up in a failed [`JoinOutcome`].
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Join attempt not found: {0}")]
    NotFound(String),

    #[error("Join attempt {id} was already executed (state: {state})")]
    AlreadyExecuted { id: String, state: JoinState },

    #[error("Join attempt {0} is already being executed")]
    InProgress(String),

    #[error("Provider is not connected. Configure credentials and connect first.")]
    NotConnected,

    #[error("Join log error: {0}")]
    Store(#[from] JoinLogError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The attempt failed, but writing that to the join log failed twice.
    /// `detail` is what should have been recorded.
    #[error("Join attempt {id} failed ({}) but the failure could not be recorded: {source}", .detail.kind)]
    FailureNotRecorded {
        id: String,
        detail: ErrorDetail,
        source: JoinLogError,
    },

    /// The workflow panicked; the attempt was finalized as failed.
    #[error("Internal error while executing join attempt {id}: {message}")]
    Internal { id: String, message: String },
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Result of executing one join attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Display name of the joining account, on success
    pub identity: Option<String>,
    pub attempt_id: String,
    /// Final state of the attempt
    pub state: JoinState,
    pub error: Option<ErrorDetail>,
}

/// A terminal condition raised while obtaining the chat entity.
#[derive(Debug)]
struct JoinFailure {
    error: ClassifiedError,
    message: String,
}

impl JoinFailure {
    fn new(error: ClassifiedError, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }

    fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            message: self.message.clone(),
            ..ErrorDetail::from(&self.error)
        }
    }
}

impl From<ClassifiedError> for JoinFailure {
    fn from(error: ClassifiedError) -> Self {
        let message = error.user_message();
        Self { error, message }
    }
}

/// Orchestrates join attempts against a shared provider connection.
pub struct JoinCoordinator {
    connection: Arc<ProviderConnection>,
    store: Arc<dyn JoinLogStore>,
    parser: LinkParser,
    classifier: ErrorClassifier,
    confirmation_text: String,
    in_flight: Mutex<HashSet<String>>,
}

impl JoinCoordinator {
    pub fn new(connection: Arc<ProviderConnection>, store: Arc<dyn JoinLogStore>) -> Self {
        Self {
            connection,
            store,
            parser: LinkParser::new(),
            classifier: ErrorClassifier::new(),
            confirmation_text: DEFAULT_CONFIRMATION_TEXT.to_string(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_confirmation_text(mut self, text: impl Into<String>) -> Self {
        self.confirmation_text = text.into();
        self
    }

    pub fn confirmation_text(&self) -> &str {
        &self.confirmation_text
    }

    pub fn connection(&self) -> &Arc<ProviderConnection> {
        &self.connection
    }

    pub fn store(&self) -> &Arc<dyn JoinLogStore> {
        &self.store
    }

    /// Record a new attempt in the joining state. No provider I/O.
    pub async fn begin(
        &self,
        raw_link: impl Into<String>,
        group_ref: Option<String>,
    ) -> CoordinatorResult<String> {
        let request = NewJoinAttempt::new(raw_link, group_ref);
        let id = self.store.create(request).await?;
        tracing::info!(attempt_id = %id, state = %JoinState::Joining, "Join attempt created");
        Ok(id)
    }

    /// Run the join workflow for a previously created attempt.
    ///
    /// Every provider failure is classified and recorded, and comes back as an
    /// outcome with `success == false`. The attempt always ends in a terminal
    /// state unless the join log itself is failing.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt does not exist, was already executed or is
    /// executing now, no provider is connected, the join log cannot be written,
    /// or the workflow panicked. When only the final failure write is lost,
    /// [`CoordinatorError::FailureNotRecorded`] still carries the classified
    /// detail.
    pub async fn execute(&self, attempt_id: &str) -> CoordinatorResult<JoinOutcome> {
        let _claim = InFlight::claim(&self.in_flight, attempt_id)
            .ok_or_else(|| CoordinatorError::InProgress(attempt_id.to_string()))?;

        // Read under the claim so a finished concurrent run is seen as terminal
        let attempt = self
            .store
            .get(attempt_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(attempt_id.to_string()))?;
        if attempt.state != JoinState::Joining {
            return Err(CoordinatorError::AlreadyExecuted {
                id: attempt.id,
                state: attempt.state,
            });
        }

        let client = self
            .connection
            .client()
            .await
            .ok_or(CoordinatorError::NotConnected)?;

        let result = AssertUnwindSafe(self.run(client.as_ref(), &attempt))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(CoordinatorError::FailureNotRecorded { id, detail, source })) => {
                tracing::error!(
                    attempt_id,
                    kind = %detail.kind,
                    error = %source,
                    "Could not record classified failure"
                );
                self.finalize_after_fault(attempt_id, format!("Internal error: {}", source))
                    .await;
                Err(CoordinatorError::FailureNotRecorded { id, detail, source })
            }
            Ok(Err(e)) => {
                tracing::error!(attempt_id, error = %e, "Join log write failed during workflow");
                self.finalize_after_fault(attempt_id, format!("Internal error: {}", e))
                    .await;
                Err(e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(attempt_id, panic = %message, "Join workflow panicked");
                self.finalize_after_fault(attempt_id, format!("Internal error: {}", message))
                    .await;
                Err(CoordinatorError::Internal {
                    id: attempt_id.to_string(),
                    message,
                })
            }
        }
    }

    async fn run(
        &self,
        client: &dyn ProviderClient,
        attempt: &JoinAttempt,
    ) -> CoordinatorResult<JoinOutcome> {
        let id = attempt.id.as_str();

        let entity = match self.parser.parse(&attempt.raw_link) {
            LinkReference::Invalid => {
                let failure = JoinFailure::new(ClassifiedError::Invalid, INVALID_LINK_MESSAGE);
                return self.finish_failed(id, failure).await;
            }
            LinkReference::Username(username) => self.join_public(client, &username).await,
            LinkReference::InviteHash(hash) => self.join_private(client, &hash).await,
        };
        let entity = match entity {
            Ok(entity) => entity,
            Err(failure) => return self.finish_failed(id, failure).await,
        };

        self.store
            .update(id, JoinLogUpdate::joined(Utc::now()))
            .await?;
        tracing::info!(attempt_id = id, state = %JoinState::Joined, chat = %entity, "Joined chat");

        // Holding the resolved entity is the membership check
        self.store
            .update(id, JoinLogUpdate::verified(Utc::now()))
            .await?;
        tracing::info!(attempt_id = id, state = %JoinState::Verified, "Membership verified");

        tracing::debug!(attempt_id = id, chat = %entity, "Sending confirmation message");
        if let Err(e) = client.send_message(&entity, &self.confirmation_text).await {
            let failure = JoinFailure::from(self.classifier.classify(&e.message));
            return self.finish_failed(id, failure).await;
        }

        self.store
            .update(id, JoinLogUpdate::message_sent(Utc::now()))
            .await?;
        tracing::info!(attempt_id = id, state = %JoinState::MessageSent, "Confirmation message sent");

        let identity = match client.get_self().await {
            Ok(me) => me.display_name(),
            Err(e) => {
                tracing::warn!(attempt_id = id, error = %e, "Could not fetch account identity");
                AccountIdentity::UNKNOWN.to_string()
            }
        };

        Ok(JoinOutcome {
            success: true,
            message: format!(
                "Successfully joined group, verified membership, and sent confirmation message '{}'",
                self.confirmation_text
            ),
            identity: Some(identity),
            attempt_id: id.to_string(),
            state: JoinState::MessageSent,
            error: None,
        })
    }

    async fn join_public(
        &self,
        client: &dyn ProviderClient,
        username: &str,
    ) -> Result<ChatEntity, JoinFailure> {
        tracing::debug!(username, "Resolving public chat");
        let entity = client
            .resolve_entity(username)
            .await
            .map_err(|e| JoinFailure::from(self.classifier.classify(&e.message)))?;

        tracing::debug!(chat = %entity, "Joining public chat");
        if let Err(e) = client.join_by_username(&entity).await {
            match self.classifier.classify(&e.message) {
                ClassifiedError::AlreadyMember => {
                    tracing::info!(chat = %entity, "Already a member; continuing");
                }
                other => return Err(other.into()),
            }
        }
        Ok(entity)
    }

    async fn join_private(
        &self,
        client: &dyn ProviderClient,
        hash: &str,
    ) -> Result<ChatEntity, JoinFailure> {
        tracing::debug!("Importing invite");
        match client.import_invite(hash).await {
            Ok(import) => import.chats.into_iter().next().ok_or_else(|| {
                JoinFailure::new(
                    ClassifiedError::Unknown("invite import returned no chats".to_string()),
                    "Failed to get chat information from invite link",
                )
            }),
            Err(e) => match self.classifier.classify(&e.message) {
                ClassifiedError::AlreadyMember => {
                    tracing::info!("Already a member of invited chat; looking it up");
                    self.recover_member_chat(client, hash).await
                }
                other => Err(other.into()),
            },
        }
    }

    /// Find the chat behind an invite the account has already used.
    async fn recover_member_chat(
        &self,
        client: &dyn ProviderClient,
        hash: &str,
    ) -> Result<ChatEntity, JoinFailure> {
        match client.check_invite(hash).await {
            Ok(InviteCheck { chat: Some(chat) }) => return Ok(chat),
            Ok(InviteCheck { chat: None }) => {
                tracing::debug!("Invite check returned no chat; resolving hash directly");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Invite check failed; resolving hash directly");
            }
        }

        client.resolve_entity(hash).await.map_err(|e| {
            let error = self.classifier.classify(&e.message);
            let message = format!(
                "Already a member but failed to get chat information: {}",
                error.user_message()
            );
            JoinFailure::new(error, message)
        })
    }

    async fn finish_failed(
        &self,
        attempt_id: &str,
        failure: JoinFailure,
    ) -> CoordinatorResult<JoinOutcome> {
        let detail = failure.detail();
        if let Err(e) = self
            .store
            .update(attempt_id, JoinLogUpdate::failed(detail.clone()))
            .await
        {
            tracing::warn!(attempt_id, error = %e, "Failed to record failure; retrying once");
            self.store
                .update(attempt_id, JoinLogUpdate::failed(detail.clone()))
                .await
                .map_err(|source| CoordinatorError::FailureNotRecorded {
                    id: attempt_id.to_string(),
                    detail: detail.clone(),
                    source,
                })?;
        }
        tracing::warn!(
            attempt_id,
            state = %JoinState::Failed,
            kind = %detail.kind,
            error = %detail.message,
            "Join attempt failed"
        );

        Ok(JoinOutcome {
            success: false,
            message: failure.message,
            identity: None,
            attempt_id: attempt_id.to_string(),
            state: JoinState::Failed,
            error: Some(detail),
        })
    }

    /// Best-effort move to failed after the workflow itself broke.
    async fn finalize_after_fault(&self, attempt_id: &str, message: String) {
        let detail = ErrorDetail::new(ErrorKind::Unknown, message);
        if let Err(e) = self
            .store
            .update(attempt_id, JoinLogUpdate::failed(detail))
            .await
        {
            tracing::error!(attempt_id, error = %e, "Could not record failure for join attempt");
        }
    }
}

impl std::fmt::Debug for JoinCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinCoordinator")
            .field("connection", &self.connection)
            .field("confirmation_text", &self.confirmation_text)
            .finish_non_exhaustive()
    }
}

/// Marks an attempt id as executing until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        inserted.then(|| Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
