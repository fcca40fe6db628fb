//! Inbound authentication.
//!
//! The `Authorization` header must equal the configured API key verbatim.
//! Credentials in the query string are refused outright. The key itself
//! never reaches the logs.

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use mcpg_core::session::CredentialCheck;

use crate::state::AppState;

/// Query parameters that look like a credential.
const QUERY_TOKEN_PARAMS: [&str; 3] = ["token", "access_token", "apiKey"];

pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    if let Some(query) = request.uri().query()
        && has_query_token(query)
    {
        warn!(path = %path, reason = "token_in_query_string", "authentication failed");
        return (
            StatusCode::BAD_REQUEST,
            "Bad Request: tokens must not be included in query string",
        )
            .into_response();
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.api_key.verify(presented) {
        CredentialCheck::Disabled | CredentialCheck::Accepted => {
            debug!(path = %path, "request authorized");
            next.run(request).await
        }
        CredentialCheck::Missing => {
            warn!(path = %path, reason = "missing_auth_header", "authentication failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized: missing Authorization header").into_response()
        }
        CredentialCheck::Mismatch => {
            warn!(path = %path, reason = "invalid_api_key", "authentication failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized: invalid API key").into_response()
        }
    }
}

fn has_query_token(query: &str) -> bool {
    query.split('&').any(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        !value.is_empty() && QUERY_TOKEN_PARAMS.contains(&name)
    })
}
