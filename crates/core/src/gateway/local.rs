use std::sync::Arc;

use tokio::task;

use super::{GatewayError, SaveGateway};
use crate::{
    models::GameState,
    save::{self, SaveStore},
};

/// Gateway writing straight to a [`SaveStore`] on the blocking thread pool.
#[derive(Debug)]
pub struct LocalGateway<S> {
    store: Arc<S>,
}

impl<S> Clone for LocalGateway<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SaveStore + 'static> LocalGateway<S> {
    /// Wrap a store.
    pub fn new(store: S) -> Self {
        Self::shared(Arc::new(store))
    }

    /// Wrap a store that is shared with other owners.
    pub fn shared(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: SaveStore + 'static> SaveGateway for LocalGateway<S> {
    async fn load(&self, save_id: &str) -> Result<Option<GameState>, GatewayError> {
        let store = Arc::clone(&self.store);
        let save_id = save_id.to_string();
        let record = task::spawn_blocking(move || store.get(&save_id)).await??;
        Ok(record.map(|record| save::decode_text(&record.data)))
    }

    async fn save(&self, save_id: &str, state: &GameState) -> Result<(), GatewayError> {
        let data = save::encode_text(state)?;
        let store = Arc::clone(&self.store);
        let save_id = save_id.to_string();
        task::spawn_blocking(move || store.put(&save_id, &data)).await??;
        Ok(())
    }
}
