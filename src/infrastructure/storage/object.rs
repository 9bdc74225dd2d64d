//! HTTP object-store artifact storage.
//!
//! Talks to a blob store with a flat REST layout: artifacts live at
//! `{endpoint}/{container}/{key}` and respond to PUT/GET/HEAD. Listing
//! queries `{endpoint}/{container}?prefix={p}` and expects a JSON array
//! of key strings. An optional bearer token covers stores that require
//! auth.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::config::StorageConfig;
use crate::domain::ports::storage::ArtifactStorage;

const REQUEST_TIMEOUT_SECS: u64 = 90;

/// Artifact storage over a blob-store REST API.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    client: Client,
    endpoint: String,
    container: String,
    token: Option<String>,
}

impl ObjectStorage {
    pub fn new(config: &StorageConfig) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| PortError::Storage(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            container: config.container.clone(),
            token: config.access_token.clone(),
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}/{key}", self.endpoint, self.container)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        let response = self
            .authorized(self.client.get(self.url(key)))
            .send()
            .await
            .map_err(map_transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response)?;
        let body = response.text().await.map_err(map_transport_error)?;
        Ok(Some(body))
    }

    async fn put(&self, key: &str, body: String, content_type: &str) -> PortResult<()> {
        let response = self
            .authorized(self.client.put(self.url(key)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        check_status(response)?;
        debug!(key, "artifact uploaded");
        Ok(())
    }
}

#[async_trait]
impl ArtifactStorage for ObjectStorage {
    async fn load_json(&self, key: &str) -> PortResult<Option<Value>> {
        match self.get(key).await? {
            Some(body) => {
                let value = serde_json::from_str(&body)
                    .map_err(|err| PortError::Serialization(err.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn save_json(&self, key: &str, value: &Value) -> PortResult<()> {
        let body = serde_json::to_string_pretty(value)
            .map_err(|err| PortError::Serialization(err.to_string()))?;
        self.put(key, body, "application/json").await
    }

    async fn load_text(&self, key: &str) -> PortResult<Option<String>> {
        self.get(key).await
    }

    async fn save_text(&self, key: &str, content: &str) -> PortResult<()> {
        self.put(key, content.to_string(), "text/plain").await
    }

    async fn exists(&self, key: &str) -> PortResult<bool> {
        let response = self
            .authorized(self.client.head(self.url(key)))
            .send()
            .await
            .map_err(map_transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response)?;
        Ok(true)
    }

    async fn list(&self, prefix: &str) -> PortResult<Vec<String>> {
        let url = format!("{}/{}", self.endpoint, self.container);
        let response = self
            .authorized(self.client.get(url).query(&[("prefix", prefix)]))
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_status(response)?;
        let keys: Vec<String> = response.json().await.map_err(map_transport_error)?;
        Ok(keys)
    }
}

fn map_transport_error(err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::Timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    } else {
        PortError::Transient(err.to_string())
    }
}

fn check_status(response: reqwest::Response) -> PortResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(PortError::AuthenticationFailed(format!(
            "object store returned {status}"
        )))
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(PortError::Transient(format!(
            "object store returned {status}"
        )))
    } else {
        Err(PortError::Permanent(format!(
            "object store returned {status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn storage(endpoint: &str) -> ObjectStorage {
        ObjectStorage::new(&StorageConfig {
            mode: crate::domain::models::config::StorageMode::Object,
            local_path: String::new(),
            endpoint: endpoint.to_string(),
            container: "runs".to_string(),
            access_token: Some("token-123".to_string()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn saves_and_loads_json_artifacts() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/runs/snap-1/iteration-1/applied-patch.json")
            .match_header("authorization", "Bearer token-123")
            .match_header("content-type", "application/json")
            .with_status(201)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/runs/snap-1/iteration-1/applied-patch.json")
            .with_status(200)
            .with_body(r#"{"action": "update_field"}"#)
            .create_async()
            .await;

        let storage = storage(&server.url());
        storage
            .save_json(
                "snap-1/iteration-1/applied-patch.json",
                &json!({"action": "update_field"}),
            )
            .await
            .unwrap();
        let value = storage
            .load_json("snap-1/iteration-1/applied-patch.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["action"], "update_field");
        put.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn missing_blobs_load_as_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/runs/absent.json")
            .with_status(404)
            .create_async()
            .await;
        let storage = storage(&server.url());
        assert!(storage.load_json("absent.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn auth_failures_map_to_authentication_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/runs/secret.json")
            .with_status(401)
            .create_async()
            .await;
        let storage = storage(&server.url());
        let err = storage
            .save_json("secret.json", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn lists_keys_by_prefix() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/runs")
            .match_query(mockito::Matcher::UrlEncoded(
                "prefix".into(),
                "snap-1/".into(),
            ))
            .with_status(200)
            .with_body(r#"["snap-1/iteration-1/a.json", "snap-1/iteration-2/b.json"]"#)
            .create_async()
            .await;
        let storage = storage(&server.url());
        let keys = storage.list("snap-1/").await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn head_answers_existence() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/runs/there.json")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("HEAD", "/runs/missing.json")
            .with_status(404)
            .create_async()
            .await;
        let storage = storage(&server.url());
        assert!(storage.exists("there.json").await.unwrap());
        assert!(!storage.exists("missing.json").await.unwrap());
    }
}
