//! Axum WebSocket upgrade handler and token admission.

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{OriginalUri, State};
use axum::http::Uri;
use axum::response::IntoResponse;
use tracing::warn;
use url::Url;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::error::BridgeError;

/// `GET /ws` (and `GET /`) — Upgrade HTTP connection to WebSocket.
///
/// The upgrade is always accepted; a connection that fails admission is
/// closed with a policy or protocol close code before any message is sent.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    OriginalUri(uri): OriginalUri,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let admission = admit(&uri, &state.token);
    ws.on_upgrade(move |socket| async move {
        match admission {
            Ok(()) => run_connection(socket, state).await,
            Err(err) => reject(socket, err).await,
        }
    })
}

/// Checks the `token` query parameter of `uri` against `token`.
///
/// # Errors
///
/// Returns [`BridgeError::Protocol`] if the request target cannot be parsed
/// and [`BridgeError::Auth`] if a token is required and does not match.
pub fn admit(uri: &Uri, token: &str) -> Result<(), BridgeError> {
    let supplied = query_token(uri)?;
    if token.is_empty() || supplied.as_deref() == Some(token) {
        Ok(())
    } else {
        Err(BridgeError::Auth)
    }
}

/// Extracts the `token` query parameter from a request target.
///
/// # Errors
///
/// Returns [`BridgeError::Protocol`] if the target is not a valid URL
/// reference. Request targets have already been validated by the HTTP
/// layer, so this is rarely reached.
pub fn query_token(uri: &Uri) -> Result<Option<String>, BridgeError> {
    let base = Url::parse("http://localhost/")
        .map_err(|e| BridgeError::Protocol(e.to_string()))?;
    let url = base
        .join(&uri.to_string())
        .map_err(|e| BridgeError::Protocol(e.to_string()))?;
    Ok(url
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned()))
}

async fn reject(mut socket: WebSocket, err: BridgeError) {
    warn!(error = %err, "rejecting connection");
    let _ = socket.send(Message::Close(Some(close_frame(&err)))).await;
}

/// Close frame sent when admission fails with `err`.
fn close_frame(err: &BridgeError) -> CloseFrame {
    CloseFrame {
        code: err.close_code(),
        reason: Utf8Bytes::from_static(err.close_reason()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap_or_default()
    }

    #[test]
    fn no_configured_token_admits_everyone() {
        assert!(admit(&uri("/"), "").is_ok());
        assert!(admit(&uri("/?token=whatever"), "").is_ok());
    }

    #[test]
    fn matching_token_is_admitted() {
        assert!(admit(&uri("/?token=s3cret"), "s3cret").is_ok());
        assert!(admit(&uri("/ws?a=1&token=s3cret"), "s3cret").is_ok());
    }

    #[test]
    fn wrong_or_missing_token_is_rejected() {
        assert!(matches!(admit(&uri("/"), "s3cret"), Err(BridgeError::Auth)));
        assert!(matches!(
            admit(&uri("/?token=nope"), "s3cret"),
            Err(BridgeError::Auth)
        ));
        assert!(matches!(
            admit(&uri("/?token=S3CRET"), "s3cret"),
            Err(BridgeError::Auth)
        ));
    }

    #[test]
    fn token_is_percent_decoded() {
        let Ok(Some(t)) = query_token(&uri("/?token=a%20b%26c")) else {
            panic!("token present");
        };
        assert_eq!(t, "a b&c");
    }

    #[test]
    fn absolute_targets_are_understood() {
        let Ok(t) = query_token(&uri("http://example.org:9400/?token=x")) else {
            panic!("parses");
        };
        assert_eq!(t.as_deref(), Some("x"));
    }

    #[test]
    fn protocol_failure_closes_with_bad_request() {
        let frame = close_frame(&BridgeError::Protocol("unparsable target".into()));
        assert_eq!(frame.code, 1002);
        assert_eq!(frame.reason.as_str(), "bad request");
    }

    #[test]
    fn auth_failure_closes_with_policy_violation() {
        let frame = close_frame(&BridgeError::Auth);
        assert_eq!(frame.code, 1008);
        assert_eq!(frame.reason.as_str(), "invalid token");
    }
}
