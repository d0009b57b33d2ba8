//! Backend function client
//!
//! Invokes `POST {base_url}/functions/v1/{name}` with the caller's bearer
//! token and a JSON body. Transport retries (5xx, connection failures) are
//! handled by [`HttpClient`]; authorization handling and circuit breaking
//! live one layer up in `GuardedInvoker`.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use superapp_common::auth::{FunctionCall, FunctionInvoker, InvokeError};
use superapp_domain::constants::{API_KEY_HEADER, FUNCTIONS_PATH, IDEMPOTENCY_KEY_HEADER};
use superapp_domain::{BackendConfig, SuperAppError};
use tracing::{debug, instrument, warn};

use super::errors::{invoke_error_from_response, invoke_error_from_transport};
use crate::http::HttpClient;

/// HTTPS client for the backend's function-invocation surface
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: HttpClient,
    functions_url: String,
    api_key: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, SuperAppError> {
        Ok(Self::with_http_client(config, HttpClient::from_config(config)?))
    }

    pub fn with_http_client(config: &BackendConfig, http: HttpClient) -> Self {
        Self {
            http,
            functions_url: format!("{}/{FUNCTIONS_PATH}", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        }
    }

    pub fn function_url(&self, name: &str) -> String {
        format!("{}/{}", self.functions_url, name.trim_start_matches('/'))
    }
}

#[async_trait]
impl FunctionInvoker for BackendClient {
    #[instrument(skip(self, call, access_token), fields(function = call.name))]
    async fn invoke(
        &self,
        call: FunctionCall<'_>,
        access_token: &str,
    ) -> Result<Value, InvokeError> {
        let mut request = self
            .http
            .request(Method::POST, self.function_url(call.name))
            .bearer_auth(access_token)
            .json(call.payload);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        if let Some(idempotency_key) = call.idempotency_key {
            request = request.header(IDEMPOTENCY_KEY_HEADER, idempotency_key);
        }

        let response = self
            .http
            .send(request)
            .await
            .map_err(|e| invoke_error_from_transport(e, self.http.timeout()))?;

        let status = response.status();
        if !status.is_success() {
            let error = invoke_error_from_response(response).await;
            warn!(%status, error = %error, "Backend function returned an error");
            return Err(error);
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let body = response.bytes().await.map_err(|e| InvokeError::Network(e.to_string()))?;
        debug!(%status, bytes = body.len(), "Backend function succeeded");
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| InvokeError::InvalidResponse(e.to_string()))
    }
}
