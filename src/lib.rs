//! linkjoin - join messaging groups from invite links
//!
//! This library exposes the join workflow (link parsing, provider error
//! classification, the join log and the coordinator) for embedding and for
//! integration testing. Provider clients are supplied by the embedder through
//! [`provider::ProviderConnector`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod joinlog;
pub mod link;
pub mod logging;
pub mod provider;
