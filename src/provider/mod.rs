//! Messaging provider module
//!
//! This module contains the provider traits the join workflow consumes and the
//! connection wrapper that owns the shared provider session.

pub mod connection;
pub mod traits;

pub use connection::{ConnectionError, ConnectionResult, ProviderConnection};
pub use traits::{
    AccountIdentity, ChatEntity, InviteCheck, InviteImport, ProviderClient, ProviderConnector,
    ProviderCredentials, ProviderError, ProviderResult,
};
