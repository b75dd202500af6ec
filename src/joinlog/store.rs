//! Join log persistence.
//!
//! [`JoinLogStore`] is the persistence contract the coordinator writes through.
//! Records are kept in creation order; listings return them most recent first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{JoinAttempt, JoinLogError, JoinLogResult, JoinLogUpdate, NewJoinAttempt};

/// Persistence for join attempt records.
///
/// `update` is last-write-wins on the current record; no history of intermediate
/// states is kept.
#[async_trait]
pub trait JoinLogStore: Send + Sync {
    /// Record a new attempt in the joining state and return its id.
    async fn create(&self, request: NewJoinAttempt) -> JoinLogResult<String>;

    /// Apply a partial update to an existing attempt.
    async fn update(&self, id: &str, update: JoinLogUpdate) -> JoinLogResult<()>;

    /// Fetch one attempt.
    async fn get(&self, id: &str) -> JoinLogResult<Option<JoinAttempt>>;

    /// All attempts, optionally filtered by group reference, most recent first.
    async fn list(&self, group_ref: Option<&str>) -> JoinLogResult<Vec<JoinAttempt>>;
}

/// The full set of records, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct JoinLogDocument {
    pub(crate) version: u32,
    pub(crate) attempts: Vec<JoinAttempt>,
}

impl JoinLogDocument {
    /// Current on-disk format version
    pub(crate) const CURRENT_VERSION: u32 = 1;

    pub(crate) fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            attempts: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, request: NewJoinAttempt) -> String {
        let id = Uuid::new_v4().to_string();
        self.attempts.push(JoinAttempt::new(id.clone(), request));
        id
    }

    pub(crate) fn apply(&mut self, id: &str, update: JoinLogUpdate) -> JoinLogResult<()> {
        self.attempts
            .iter_mut()
            .find(|attempt| attempt.id == id)
            .ok_or_else(|| JoinLogError::NotFound(id.to_string()))?
            .apply(update)
    }

    pub(crate) fn get(&self, id: &str) -> Option<JoinAttempt> {
        self.attempts.iter().find(|attempt| attempt.id == id).cloned()
    }

    pub(crate) fn list(&self, group_ref: Option<&str>) -> Vec<JoinAttempt> {
        self.attempts
            .iter()
            .rev()
            .filter(|attempt| group_ref.map_or(true, |r| attempt.group_ref.as_deref() == Some(r)))
            .cloned()
            .collect()
    }
}

impl Default for JoinLogDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryJoinLogStore {
    document: RwLock<JoinLogDocument>,
}

impl MemoryJoinLogStore {
    pub fn new() -> Self {
        Self {
            document: RwLock::new(JoinLogDocument::new()),
        }
    }
}

#[async_trait]
impl JoinLogStore for MemoryJoinLogStore {
    async fn create(&self, request: NewJoinAttempt) -> JoinLogResult<String> {
        Ok(self.document.write().await.insert(request))
    }

    async fn update(&self, id: &str, update: JoinLogUpdate) -> JoinLogResult<()> {
        self.document.write().await.apply(id, update)
    }

    async fn get(&self, id: &str) -> JoinLogResult<Option<JoinAttempt>> {
        Ok(self.document.read().await.get(id))
    }

    async fn list(&self, group_ref: Option<&str>) -> JoinLogResult<Vec<JoinAttempt>> {
        Ok(self.document.read().await.list(group_ref))
    }
}
