//! Shared fixtures for infra integration tests

#![allow(dead_code)]

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use superapp_common::Session;
use superapp_domain::Config;
use superapp_infra::AppContext;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REFRESH_PATH: &str = "/auth/v1/token";

pub fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or_default()
}

/// Configuration pointing at `server`, storing state under `data_dir`
///
/// Transport retries are disabled so every request is visible to the
/// breaker exactly once.
pub fn config_for(server: &MockServer, data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.backend.base_url = server.uri();
    config.backend.api_key = Some("anon-key".into());
    config.backend.max_transport_retries = 0;
    config.backend.request_timeout_secs = 5;
    config.circuit_breaker.failure_threshold = 3;
    config.storage.data_dir = data_dir.to_path_buf();
    config
}

pub fn session(access_token: &str, lifetime_secs: i64) -> Session {
    Session::new(access_token, Some("refresh-1".into()), unix_now() + lifetime_secs, "user-1")
}

pub async fn signed_in(config: Config, access_token: &str, lifetime_secs: i64) -> AppContext {
    let ctx = AppContext::build(config).await.expect("context should build");
    ctx.guardian()
        .store_session(session(access_token, lifetime_secs))
        .await
        .expect("session should persist");
    ctx
}

/// Token endpoint handing out `access_token`, expected `calls` times
pub async fn mount_refresh(server: &MockServer, access_token: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "refresh_token": "refresh-2",
            "expires_in": 3600,
            "user": {"id": "user-1"}
        })))
        .expect(calls)
        .mount(server)
        .await;
}
