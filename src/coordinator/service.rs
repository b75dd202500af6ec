//! Caller-facing join service.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{CoordinatorError, CoordinatorResult, JoinCoordinator, JoinOutcome};
use crate::config::AppConfig;
use crate::joinlog::{AttemptSummary, FileJoinLogStore, JoinLogStore};
use crate::provider::{ProviderConnection, ProviderConnector};

/// Shown in place of a phone number the provider does not expose.
pub const PHONE_NOT_AVAILABLE: &str = "Not available";

/// The account the service joins groups as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub username: String,
    pub phone: String,
}

/// Submits join requests and answers status queries.
#[derive(Debug)]
pub struct JoinService {
    coordinator: JoinCoordinator,
}

impl JoinService {
    pub fn new(connection: Arc<ProviderConnection>, store: Arc<dyn JoinLogStore>) -> Self {
        Self::from_coordinator(JoinCoordinator::new(connection, store))
    }

    /// Build a connected service from loaded configuration.
    ///
    /// Opens the file join log under `storage.dir`, connects `connector` with the
    /// provider credentials and posts `join.confirmation_text` on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the join log cannot be opened or the provider
    /// connection fails.
    pub async fn from_config(
        config: &AppConfig,
        connector: Arc<dyn ProviderConnector>,
    ) -> CoordinatorResult<Self> {
        let store = FileJoinLogStore::open(&config.storage.dir)?;
        let connection = Arc::new(ProviderConnection::new(connector));
        connection.connect(&config.provider).await?;

        tracing::info!(
            provider = connection.provider_name(),
            join_log = %store.log_path().display(),
            "Join service ready"
        );

        let coordinator = JoinCoordinator::new(connection, Arc::new(store))
            .with_confirmation_text(&config.join.confirmation_text);
        Ok(Self::from_coordinator(coordinator))
    }

    pub fn from_coordinator(coordinator: JoinCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &JoinCoordinator {
        &self.coordinator
    }

    /// Create and execute a join attempt in one call.
    ///
    /// Connection is checked first so no attempt is recorded while disconnected.
    pub async fn submit(
        &self,
        raw_link: &str,
        group_ref: Option<&str>,
    ) -> CoordinatorResult<JoinOutcome> {
        if !self.is_connected().await {
            return Err(CoordinatorError::NotConnected);
        }
        let id = self
            .coordinator
            .begin(raw_link, group_ref.map(str::to_string))
            .await?;
        self.coordinator.execute(&id).await
    }

    /// Attempt summaries, most recent first.
    pub async fn query_status(
        &self,
        group_ref: Option<&str>,
    ) -> CoordinatorResult<Vec<AttemptSummary>> {
        let attempts = self.coordinator.store().list(group_ref).await?;
        Ok(attempts.iter().map(|a| a.summary()).collect())
    }

    pub async fn is_connected(&self) -> bool {
        self.coordinator.connection().is_connected().await
    }

    /// The logged-in account.
    pub async fn current_account(&self) -> CoordinatorResult<AccountSummary> {
        let client = self
            .coordinator
            .connection()
            .client()
            .await
            .ok_or(CoordinatorError::NotConnected)?;
        let me = client.get_self().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get current account");
            e
        })?;

        Ok(AccountSummary {
            username: me.display_name(),
            phone: me
                .phone
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| PHONE_NOT_AVAILABLE.to_string()),
        })
    }
}
