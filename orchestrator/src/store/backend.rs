use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ProxyError;

/// A key-value surface over a single binary-valued record in an external
/// secret store (spec.md §4.5, §9 "Mutable tenant registry"). The
/// orchestrator never talks to a concrete secret-store product directly —
/// it is kept pluggable, analogous to how the teacher's `Database` wraps
/// a `sqlx::PgPool` behind a small inherent-impl surface.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    async fn get_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, ProxyError>;
    async fn put_blob(&self, namespace: &str, key: &str, data: Vec<u8>) -> Result<(), ProxyError>;
}

fn namespaced(namespace: &str, key: &str) -> String {
    format!("{namespace}/{key}")
}

/// In-memory backend used by tests and local development.
#[derive(Default)]
pub struct InMemorySecretBackend {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecretBackend for InMemorySecretBackend {
    async fn get_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, ProxyError> {
        let blobs = self.blobs.lock().map_err(|_| ProxyError::Internal("poisoned lock".into()))?;
        Ok(blobs.get(&namespaced(namespace, key)).cloned())
    }

    async fn put_blob(&self, namespace: &str, key: &str, data: Vec<u8>) -> Result<(), ProxyError> {
        let mut blobs = self.blobs.lock().map_err(|_| ProxyError::Internal("poisoned lock".into()))?;
        blobs.insert(namespaced(namespace, key), data);
        Ok(())
    }
}

/// HTTP-based backend for a Vault-/Kubernetes-Secrets-style external
/// secret store, reached over `reqwest`. Writes retry once on a transient
/// failure at the critical-section level, per spec.md §7.
pub struct HttpSecretBackend {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpSecretBackend {
    pub fn new(base_url: String, bearer_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            bearer_token,
        }
    }

    fn url(&self, namespace: &str, key: &str) -> String {
        format!("{}/v1/secret/{namespace}/{key}", self.base_url.trim_end_matches('/'))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl SecretBackend for HttpSecretBackend {
    async fn get_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, ProxyError> {
        let resp = self
            .request(reqwest::Method::GET, &self.url(namespace, key))
            .send()
            .await
            .map_err(|e| ProxyError::Internal(format!("secret store get failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ProxyError::Internal(format!(
                "secret store returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ProxyError::Internal(format!("secret store body read failed: {e}")))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put_blob(&self, namespace: &str, key: &str, data: Vec<u8>) -> Result<(), ProxyError> {
        let url = self.url(namespace, key);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self
                .request(reqwest::Method::PUT, &url)
                .body(data.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if attempts < 2 => {
                    tracing::warn!(status = %resp.status(), "secret store write failed, retrying once");
                    continue;
                }
                Ok(resp) => {
                    return Err(ProxyError::Internal(format!(
                        "secret store write failed with {}",
                        resp.status()
                    )))
                }
                Err(e) if attempts < 2 => {
                    tracing::warn!(error = %e, "secret store write errored, retrying once");
                    continue;
                }
                Err(e) => return Err(ProxyError::Internal(format!("secret store write failed: {e}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_blob_returns_none_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/ns/registry"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = HttpSecretBackend::new(server.uri(), None);
        let result = backend.get_blob("ns", "registry").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn get_blob_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/ns/registry"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let backend = HttpSecretBackend::new(server.uri(), None);
        let result = backend.get_blob("ns", "registry").await.unwrap();
        assert_eq!(result, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn put_blob_retries_once_on_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/secret/ns/registry"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/secret/ns/registry"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let backend = HttpSecretBackend::new(server.uri(), None);
        backend.put_blob("ns", "registry", b"data".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn put_blob_fails_after_second_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/secret/ns/registry"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = HttpSecretBackend::new(server.uri(), None);
        let result = backend.put_blob("ns", "registry", b"data".to_vec()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn requests_carry_bearer_token_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/ns/registry"))
            .and(wiremock::matchers::header("authorization", "Bearer s3cr3t"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = HttpSecretBackend::new(server.uri(), Some("s3cr3t".to_string()));
        backend.get_blob("ns", "registry").await.unwrap();
    }
}
