//! Session refresh against the backend auth service
//!
//! Exchanges the stored refresh token for a new access token via
//! `POST {auth_url}/token?grant_type=refresh_token`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use superapp_common::auth::{RefreshError, Session, SessionRefresher};
use superapp_common::time::{Clock, SystemClock};
use superapp_domain::constants::API_KEY_HEADER;
use superapp_domain::{BackendConfig, SuperAppError};
use tracing::{info, instrument, warn};

use super::errors::{error_message, refresh_error_from_transport};
use crate::http::HttpClient;

/// Token endpoint response
///
/// The auth service reports expiry either as an absolute `expires_at` or a
/// relative `expires_in`; absolute wins when both are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<TokenUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUser {
    pub id: String,
}

impl TokenResponse {
    /// Build the renewed session, keeping whatever the response omits
    pub fn into_session(self, previous: &Session, now_unix: i64) -> Result<Session, RefreshError> {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => at,
            (None, Some(secs)) => now_unix + secs,
            (None, None) => {
                return Err(RefreshError::Transport(
                    "token response carries no expiry".to_string(),
                ))
            }
        };
        Ok(Session::new(
            self.access_token,
            self.refresh_token.or_else(|| previous.refresh_token.clone()),
            expires_at,
            self.user.map(|u| u.id).unwrap_or_else(|| previous.user_id.clone()),
        ))
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// [`SessionRefresher`] backed by the auth service's token endpoint
pub struct HttpSessionRefresher {
    http: HttpClient,
    token_url: String,
    api_key: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HttpSessionRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSessionRefresher")
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl HttpSessionRefresher {
    pub fn new(config: &BackendConfig) -> Result<Self, SuperAppError> {
        Ok(Self::with_parts(config, HttpClient::from_config(config)?, Arc::new(SystemClock)))
    }

    pub fn with_parts(config: &BackendConfig, http: HttpClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            token_url: format!("{}/token", config.resolved_auth_url()),
            api_key: config.api_key.clone(),
            clock,
        }
    }
}

#[async_trait]
impl SessionRefresher for HttpSessionRefresher {
    #[instrument(skip_all, fields(user_id = %session.user_id))]
    async fn refresh(&self, session: &Session) -> Result<Session, RefreshError> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .ok_or_else(|| RefreshError::Rejected("session has no refresh token".to_string()))?;

        let mut request = self
            .http
            .request(Method::POST, &self.token_url)
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshRequest { refresh_token });
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = self.http.send(request).await.map_err(refresh_error_from_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            warn!(%status, %message, "Session refresh failed");
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    RefreshError::Rejected(message)
                }
                _ => RefreshError::Transport(format!("HTTP {}: {message}", status.as_u16())),
            });
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::Transport(format!("invalid token response: {e}")))?;
        let renewed = tokens.into_session(session, self.clock.unix_seconds())?;
        info!(expires_at = renewed.expires_at, "Session refreshed");
        Ok(renewed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use superapp_common::time::MockClock;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn refresher(server: &MockServer) -> HttpSessionRefresher {
        let config = BackendConfig {
            base_url: server.uri(),
            api_key: Some("anon-key".into()),
            retry_base_delay_ms: 1,
            ..BackendConfig::default()
        };
        let http = HttpClient::from_config(&config).unwrap();
        HttpSessionRefresher::with_parts(&config, http, Arc::new(MockClock::at_unix_seconds(NOW)))
    }

    fn session() -> Session {
        Session::new("old-access", Some("refresh-1".into()), NOW as i64 + 60, "user-1")
    }

    /// Validates a successful refresh.
    ///
    /// Assertions:
    /// - Confirms the request hits the token endpoint with the refresh token.
    /// - Confirms `expires_in` is converted to an absolute expiry.
    /// - Confirms the rotated refresh token replaces the old one.
    #[tokio::test]
    async fn refresh_rotates_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(header("apikey", "anon-key"))
            .and(body_json(json!({"refresh_token": "refresh-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "refresh-2",
                "expires_in": 3600,
                "user": {"id": "user-1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let renewed = refresher(&server).refresh(&session()).await.unwrap();
        assert_eq!(renewed.access_token, "new-access");
        assert_eq!(renewed.refresh_token.as_deref(), Some("refresh-2"));
        assert_eq!(renewed.expires_at, NOW as i64 + 3600);
        assert_eq!(renewed.user_id, "user-1");
    }

    #[tokio::test]
    async fn rejected_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid Refresh Token"
            })))
            .mount(&server)
            .await;

        let err = refresher(&server).refresh(&session()).await.unwrap_err();
        assert!(matches!(err, RefreshError::Rejected(ref m) if m == "Invalid Refresh Token"));
    }

    #[tokio::test]
    async fn server_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = refresher(&server).refresh(&session()).await.unwrap_err();
        assert!(matches!(err, RefreshError::Transport(_)));
    }

    #[tokio::test]
    async fn missing_refresh_token_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let session = Session::new("a", None, NOW as i64, "u");
        assert!(matches!(
            refresher(&server).refresh(&session).await,
            Err(RefreshError::Rejected(_))
        ));
    }

    /// Validates fields the response may omit.
    #[test]
    fn token_response_keeps_previous_values() {
        let tokens = TokenResponse {
            access_token: "a2".into(),
            refresh_token: None,
            expires_in: Some(10),
            expires_at: Some(5_000),
            user: None,
        };
        let renewed = tokens.into_session(&session(), 100).unwrap();
        assert_eq!(renewed.expires_at, 5_000);
        assert_eq!(renewed.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(renewed.user_id, "user-1");

        let no_expiry = TokenResponse {
            access_token: "a3".into(),
            refresh_token: None,
            expires_in: None,
            expires_at: None,
            user: None,
        };
        assert!(no_expiry.into_session(&session(), 100).is_err());
    }
}
