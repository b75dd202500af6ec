//! Provider connection lifecycle
//!
//! A [`ProviderConnection`] owns the single process-wide provider session. It is
//! created once, shared (behind an `Arc`) by every join attempt, and torn down
//! explicitly on shutdown or reconfiguration.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use super::traits::{ProviderClient, ProviderConnector, ProviderCredentials, ProviderError};

/// Errors from connection lifecycle operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Credentials carry no saved session, so the account must authenticate first.
    #[error("no saved session; the account must be authenticated before connecting")]
    MissingSession,

    /// `connect` was called on a live connection.
    #[error("provider '{0}' is already connected")]
    AlreadyConnected(String),

    /// The provider rejected the operation.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type for connection lifecycle operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// The shared provider session.
pub struct ProviderConnection {
    connector: Arc<dyn ProviderConnector>,
    client: RwLock<Option<Arc<dyn ProviderClient>>>,
}

impl ProviderConnection {
    /// Create a disconnected connection for the given connector.
    pub fn new(connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            connector,
            client: RwLock::new(None),
        }
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &str {
        self.connector.name()
    }

    /// Open the session.
    ///
    /// # Errors
    ///
    /// Fails if the credentials have no session, a session is already open, or
    /// the provider refuses the connection.
    pub async fn connect(&self, credentials: &ProviderCredentials) -> ConnectionResult<()> {
        if !credentials.has_session() {
            tracing::warn!(
                provider = self.provider_name(),
                "No session found; account needs to be authenticated"
            );
            return Err(ConnectionError::MissingSession);
        }

        let mut slot = self.client.write().await;
        if slot.is_some() {
            return Err(ConnectionError::AlreadyConnected(
                self.provider_name().to_string(),
            ));
        }

        let client = self.connector.connect(credentials).await.map_err(|e| {
            tracing::error!(provider = self.provider_name(), error = %e, "Failed to connect");
            e
        })?;
        *slot = Some(client);
        tracing::info!(provider = self.provider_name(), "Provider connected");
        Ok(())
    }

    /// Close the session. Does nothing if no session is open.
    ///
    /// The slot is cleared even if the provider reports an error while closing.
    pub async fn disconnect(&self) -> ConnectionResult<()> {
        let client = self.client.write().await.take();
        match client {
            Some(client) => {
                client.disconnect().await?;
                tracing::info!(provider = self.provider_name(), "Provider disconnected");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Replace the session with one opened from new credentials.
    pub async fn reconnect(&self, credentials: &ProviderCredentials) -> ConnectionResult<()> {
        if let Err(e) = self.disconnect().await {
            tracing::warn!(
                provider = self.provider_name(),
                error = %e,
                "Error while closing previous session; reconnecting anyway"
            );
        }
        self.connect(credentials).await
    }

    /// Returns true while a session is open.
    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// The live client, if connected.
    pub async fn client(&self) -> Option<Arc<dyn ProviderClient>> {
        self.client.read().await.clone()
    }
}

impl std::fmt::Debug for ProviderConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConnection")
            .field("provider", &self.provider_name())
            .finish_non_exhaustive()
    }
}
