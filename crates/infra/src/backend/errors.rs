//! Response and transport error mapping for backend calls

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde_json::Value;
use superapp_common::auth::{InvokeError, RefreshError};

use crate::http::HttpError;

pub(crate) fn invoke_error_from_transport(err: HttpError, timeout: Duration) -> InvokeError {
    match err {
        HttpError::Timeout => InvokeError::Timeout(timeout),
        HttpError::NotCloneable => InvokeError::InvalidResponse(err.to_string()),
        other => InvokeError::Network(other.to_string()),
    }
}

pub(crate) fn refresh_error_from_transport(err: HttpError) -> RefreshError {
    RefreshError::Transport(err.to_string())
}

/// Map a non-success response to an [`InvokeError`], keeping the server's
/// own message when the body carries one
pub(crate) async fn invoke_error_from_response(response: Response) -> InvokeError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    InvokeError::from_status(status.as_u16(), error_message(status, &body))
}

/// Pull a human-readable message out of an error body
///
/// Accepts `{"message": ..}`, `{"error": ..}`, `{"msg": ..}` and
/// `{"error_description": ..}`; falls back to the raw body, then to the
/// status reason.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for field in ["message", "error_description", "msg", "error"] {
            if let Some(Value::String(message)) = map.get(field) {
                return message.clone();
            }
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.chars().take(512).collect();
    }
    status.canonical_reason().unwrap_or("unknown status").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#),
            "JWT expired"
        );
        assert_eq!(
            error_message(
                StatusCode::BAD_REQUEST,
                r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#
            ),
            "Refresh Token Not Found"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, " upstream down "), "upstream down");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }

    #[test]
    fn transport_errors_map_to_network_or_timeout() {
        let timeout = Duration::from_secs(3);
        assert!(matches!(
            invoke_error_from_transport(HttpError::Timeout, timeout),
            InvokeError::Timeout(t) if t == timeout
        ));
        assert!(matches!(
            invoke_error_from_transport(HttpError::Connect("refused".into()), timeout),
            InvokeError::Network(_)
        ));
    }
}
