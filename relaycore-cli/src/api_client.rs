// relaycore-cli/src/api_client.rs
// ============================================================================
// Module: Submission API HTTP Client
// Description: Thin REST client for the RelayCore Submission API.
// Purpose: Give the CLI one place to call submit/status/artifact/operator
// endpoints, shared across subcommands.
// Dependencies: relaycore-contract, reqwest, serde_json
// ============================================================================

//! ## Overview
//! Wraps the five Submission API endpoints described in spec.md §6 behind a
//! small [`SubmissionApiClient`]. Every call returns [`ApiClientError`],
//! which distinguishes transport failures from the server's own closed
//! failure taxonomy so the CLI can render either case clearly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use relaycore_contract::ApiErrorBody;
use relaycore_contract::ManualDecisionRequest;
use relaycore_contract::OperatorInputRequest;
use relaycore_contract::ResumeResponse;
use relaycore_contract::RunStateResponse;
use relaycore_contract::SubmitRunRequest;
use relaycore_contract::SubmitRunResponse;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Serialize;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Connection settings for talking to a Submission API server.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the Submission API, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Bearer token sent as `Authorization: Bearer <token>`, if configured.
    pub bearer_token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures from calling the Submission API.
#[derive(Debug)]
pub enum ApiClientError {
    /// The request could not be sent or the response could not be read.
    Transport(String),
    /// The server returned a structured error body.
    Api(ApiErrorBody),
    /// The response body did not match the expected shape.
    Decode(String),
}

impl std::fmt::Display for ApiClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "request failed: {message}"),
            Self::Api(body) => write!(f, "{:?}: {}", body.code, body.message),
            Self::Decode(message) => write!(f, "invalid response: {message}"),
        }
    }
}

impl std::error::Error for ApiClientError {}

// ============================================================================
// SECTION: Client
// ============================================================================

/// HTTP client for the Submission API.
pub struct SubmissionApiClient {
    base_url: String,
    client: Client,
    bearer_token: Option<String>,
}

impl SubmissionApiClient {
    /// Builds a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError::Transport`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ApiClientError::Transport(err.to_string()))?;
        Ok(Self { base_url: config.base_url, client, bearer_token: config.bearer_token })
    }

    /// Submits a new run.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] on transport failure or a Submission API
    /// error response.
    pub async fn submit_run(
        &self,
        request: &SubmitRunRequest,
    ) -> Result<SubmitRunResponse, ApiClientError> {
        self.post("/runs", request).await
    }

    /// Fetches the current state of a run.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] on transport failure or a Submission API
    /// error response.
    pub async fn fetch_run_state(&self, run_id: &str) -> Result<RunStateResponse, ApiClientError> {
        self.get(&format!("/runs/{run_id}")).await
    }

    /// Lists artifact paths recorded against a run.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] on transport failure or a Submission API
    /// error response.
    pub async fn list_artifacts(&self, run_id: &str) -> Result<Vec<String>, ApiClientError> {
        self.get(&format!("/runs/{run_id}/artifacts")).await
    }

    /// Fetches the raw bytes of a single artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] on transport failure or a Submission API
    /// error response.
    pub async fn fetch_artifact(
        &self,
        run_id: &str,
        path: &str,
    ) -> Result<Vec<u8>, ApiClientError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/runs/{run_id}/artifacts/{path}"))
            .send()
            .await
            .map_err(|err| ApiClientError::Transport(err.to_string()))?;
        let response = Self::check_status(response).await?;
        response.bytes().await.map(|bytes| bytes.to_vec()).map_err(|err| ApiClientError::Transport(err.to_string()))
    }

    /// Submits operator input to resume a paused run.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] on transport failure or a Submission API
    /// error response.
    pub async fn submit_operator_input(
        &self,
        request: &OperatorInputRequest,
    ) -> Result<ResumeResponse, ApiClientError> {
        self.post("/operator-input", request).await
    }

    /// Submits a manual governance decision for a paused run.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError`] on transport failure or a Submission API
    /// error response.
    pub async fn submit_manual_decision(
        &self,
        request: &ManualDecisionRequest,
    ) -> Result<ResumeResponse, ApiClientError> {
        self.post("/decision", request).await
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.bearer_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiClientError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|err| ApiClientError::Transport(err.to_string()))?;
        Self::decode(response).await
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, ApiClientError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|err| ApiClientError::Transport(err.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiClientError> {
        let response = Self::check_status(response).await?;
        let body = response.text().await.map_err(|err| ApiClientError::Transport(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| ApiClientError::Decode(err.to_string()))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiClientError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(api_error) => Err(ApiClientError::Api(api_error)),
            Err(_) => Err(ApiClientError::Transport(body)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn client_builds_from_config() {
        let config = ApiClientConfig {
            base_url: "http://127.0.0.1:0".to_string(),
            bearer_token: None,
            timeout: Duration::from_secs(1),
        };
        assert!(SubmissionApiClient::new(config).is_ok());
    }
}
