//! HTTP client for network-based API calls

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use shared::response::ApiResponse;

use crate::{ClientConfig, ClientError, ClientResult};

/// HTTP client for making network requests to the order service
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry_attempts: u32,
    retry_base_delay: std::time::Duration,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &ClientConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            retry_attempts: config.retry_attempts.max(1),
            retry_base_delay: config.retry_base_delay,
        }
    }

    /// Build authorization header value
    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let mut request = self.client.get(self.url(path));

        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let mut request = self.client.post(self.url(path)).json(body);

        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Make a PATCH request with JSON body
    pub async fn patch<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let mut request = self.client.patch(self.url(path)).json(body);

        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// GET an enveloped resource, retrying transient failures with backoff.
    ///
    /// Only reads go through here; mutations must not be replayed blindly.
    pub async fn get_data<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get::<ApiResponse<T>>(path).await {
                Ok(envelope) => return Self::unwrap_envelope(envelope),
                Err(err) if attempt < self.retry_attempts && err.is_transient() => {
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::debug!(path, attempt, error = %err, "Retrying GET after transient failure");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// POST an enveloped resource
    pub async fn post_data<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let envelope = self.post::<ApiResponse<T>, _>(path, body).await?;
        Self::unwrap_envelope(envelope)
    }

    /// PATCH an enveloped resource
    pub async fn patch_data<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let envelope = self.patch::<ApiResponse<T>, _>(path, body).await?;
        Self::unwrap_envelope(envelope)
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await?;
            return match status {
                StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
                StatusCode::FORBIDDEN => Err(ClientError::Forbidden(text)),
                StatusCode::NOT_FOUND => Err(ClientError::NotFound(text)),
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    Err(ClientError::Validation(text))
                }
                _ => Err(ClientError::Internal(text)),
            };
        }

        response.json().await.map_err(Into::into)
    }

    fn unwrap_envelope<T>(envelope: ApiResponse<T>) -> ClientResult<T> {
        if !envelope.is_success() {
            return Err(ClientError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }
        envelope
            .data
            .ok_or_else(|| ClientError::InvalidResponse("Missing data in success envelope".to_string()))
    }
}
