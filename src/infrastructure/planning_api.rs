//! HTTP client for the planning service.
//!
//! Implements both outbound ports the service exposes: validation-message
//! retrieval and snapshot download/upload. Authentication uses the OAuth2
//! client-credentials grant; the access token is fetched lazily and cached
//! until a request comes back 401, at which point it is discarded and
//! fetched again on the next call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::config::ApiConfig;
use crate::domain::models::document::Snapshot;
use crate::domain::models::validation::ValidationMessage;
use crate::domain::ports::document_store::{DocumentStore, UploadAck};
use crate::domain::ports::validation_service::ValidationService;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(default)]
    is_successfully_validated: bool,
}

/// Client for the planning service's snapshot and validation endpoints.
pub struct PlanningApiClient {
    client: Client,
    base_uri: String,
    token_uri: String,
    client_id: String,
    client_secret: Option<String>,
    timeout: Duration,
    token: RwLock<Option<String>>,
}

impl PlanningApiClient {
    pub fn new(config: &ApiConfig) -> PortResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PortError::Transient(err.to_string()))?;
        let base_uri = config.base_uri.trim_end_matches('/').to_string();
        let token_uri = if config.token_uri.trim().is_empty() {
            format!("{base_uri}/auth/token")
        } else {
            config.token_uri.clone()
        };
        Ok(Self {
            client,
            base_uri,
            token_uri,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout,
            token: RwLock::new(None),
        })
    }

    /// Returns the cached access token, fetching one if necessary.
    async fn access_token(&self) -> PortResult<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        let secret = self.client_secret.as_deref().ok_or_else(|| {
            PortError::AuthenticationFailed("api.client_secret is not configured".to_string())
        })?;
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", secret),
            ])
            .send()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PortError::AuthenticationFailed(format!(
                "token endpoint rejected client '{}' ({status}); check client_secret",
                self.client_id
            )));
        }
        if !status.is_success() {
            return Err(PortError::Transient(format!(
                "token endpoint returned {status}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        debug!(client_id = %self.client_id, "access token acquired");
        *self.token.write().await = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn send(
        &self,
        document_id: &str,
        request: RequestBuilder,
    ) -> PortResult<reqwest::Response> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Drop the cached token so the next call re-authenticates.
            *self.token.write().await = None;
            return Err(PortError::AuthenticationFailed(format!(
                "planning service returned {status}"
            )));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PortError::DocumentNotFound(document_id.to_string()));
        }
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            return Err(PortError::Transient(format!(
                "planning service returned {status}"
            )));
        }
        Err(PortError::Permanent(format!(
            "planning service returned {status}"
        )))
    }

    fn map_transport_error(&self, err: reqwest::Error) -> PortError {
        if err.is_timeout() {
            PortError::Timeout(self.timeout)
        } else {
            PortError::Transient(err.to_string())
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_uri)
    }
}

#[async_trait]
impl ValidationService for PlanningApiClient {
    async fn validate(&self, document_id: &str) -> PortResult<Vec<ValidationMessage>> {
        let url = self.url(&format!("/snapshots/{document_id}/validation-messages"));
        let response = self.send(document_id, self.client.get(url)).await?;
        let messages: Vec<ValidationMessage> = response
            .json()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        debug!(document_id, count = messages.len(), "validation report fetched");
        Ok(messages)
    }
}

#[async_trait]
impl DocumentStore for PlanningApiClient {
    async fn create(&self, name: &str) -> PortResult<String> {
        let url = self.url("/snapshots");
        let response = self
            .send("", self.client.post(url).json(&json!({ "name": name })))
            .await?;
        let created: CreatedDocument = response
            .json()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        info!(document_id = %created.id, name, "document created");
        Ok(created.id)
    }

    async fn fetch(&self, document_id: &str) -> PortResult<Snapshot> {
        let url = self.url(&format!("/snapshots/{document_id}/data"));
        let response = self.send(document_id, self.client.get(url)).await?;
        let snapshot: Snapshot = response
            .json()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        Ok(snapshot)
    }

    async fn update(
        &self,
        document_id: &str,
        snapshot: &Snapshot,
        name: &str,
        comment: Option<&str>,
    ) -> PortResult<UploadAck> {
        let url = self.url(&format!("/snapshots/{document_id}"));
        let body = json!({
            "name": name,
            "comment": comment,
            "data": snapshot,
        });
        let response = self
            .send(document_id, self.client.put(url).json(&body))
            .await?;
        let server_response: Value = response
            .json()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        let parsed: UploadResponse =
            serde_json::from_value(server_response.clone()).unwrap_or(UploadResponse {
                is_successfully_validated: false,
            });
        info!(
            document_id,
            validated = parsed.is_successfully_validated,
            "document uploaded"
        );
        Ok(UploadAck {
            is_successfully_validated: parsed.is_successfully_validated,
            server_response,
        })
    }
}
