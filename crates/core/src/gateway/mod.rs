//! Loading and saving a [`GameState`] by save identity.
//!
//! Every gateway runs stored documents through [`crate::save::migrate`], so
//! callers always receive a current-schema state.

mod http;
mod local;

use std::future::Future;

use thiserror::Error;

use crate::{models::GameState, save::StoreError};

pub use http::HttpGateway;
pub use local::LocalGateway;

/// Failures of a load or save call. All of them are transient from the game's
/// point of view: the caller keeps playing on its in-memory state.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request did not complete.
    #[error("save request failed")]
    Transport(#[from] reqwest::Error),
    /// The backend answered with an unexpected status.
    #[error("save backend answered {0}")]
    Status(u16),
    /// The local store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The state could not be encoded.
    #[error("failed to encode save")]
    Encode(#[from] serde_json::Error),
    /// A blocking store task did not finish.
    #[error("save task aborted")]
    Join(#[from] tokio::task::JoinError),
}

/// Durable home of save documents.
pub trait SaveGateway: Send + Sync + 'static {
    /// Load the state saved under `save_id`; `Ok(None)` when nothing was saved yet.
    fn load(
        &self,
        save_id: &str,
    ) -> impl Future<Output = Result<Option<GameState>, GatewayError>> + Send;

    /// Replace whatever is saved under `save_id` with `state`.
    fn save(
        &self,
        save_id: &str,
        state: &GameState,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}
