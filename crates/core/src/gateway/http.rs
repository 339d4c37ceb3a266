use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{GatewayError, SaveGateway};
use crate::{models::GameState, save};

/// Gateway speaking the `/api/save` JSON contract of the backend.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct SaveRequest<'a> {
    id: &'a str,
    data: Value,
}

impl HttpGateway {
    /// Gateway for the backend at `base_url`, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Gateway reusing an existing client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl SaveGateway for HttpGateway {
    async fn load(&self, save_id: &str) -> Result<Option<GameState>, GatewayError> {
        let url = format!("{}/api/save/{save_id}", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(save_id, "No save on the backend");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        Ok(Some(save::decode_text(&body)))
    }

    async fn save(&self, save_id: &str, state: &GameState) -> Result<(), GatewayError> {
        let url = format!("{}/api/save", self.base_url);
        let request = SaveRequest {
            id: save_id,
            data: save::encode(state)?,
        };
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        Ok(())
    }
}
