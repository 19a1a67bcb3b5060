use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
};
use log::debug;

use crate::{connection::run_connection, Router, ServerContext, ServerError};

/// The cookie holding the session of a user
pub const AUTH_COOKIE: &str = "auth";

/// Returns the value of the auth cookie, if the request carries one
fn auth_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Upgrades to a websocket. The session is resolved before upgrading, so refused
/// users get a plain HTTP error.
async fn socket(
    State(context): State<ServerContext>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let cookie = auth_cookie(&headers);

    let user = match context.collab.auth.resolve(cookie.as_deref()).await {
        Ok(user) => user,
        Err(e) => {
            debug!("Refused websocket upgrade: {}", e);
            return ServerError::from(e).into_response();
        }
    };

    let max_size = context.collab.config().max_frame_size;

    upgrade
        .max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| run_connection(socket, context, user))
}

pub fn router() -> Router {
    Router::new().route("/socket", get(socket))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_auth_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; auth=abc123; lang=en"),
        );

        assert_eq!(auth_cookie(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_missing_auth_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(auth_cookie(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("authority=1"));
        assert_eq!(auth_cookie(&headers), None);
    }
}
