//! Binds every request to a session.
//!
//! [`session_middleware`] resolves or mints the session before the handler
//! runs, and sets the session cookie on the way out. Handlers reach the
//! session through the [`CurrentSession`] extractor.

use std::ops::Deref;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderValue,
        header::{CONTENT_TYPE, SET_COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use msm_session::Session;
use tracing::{error, warn};

use crate::error::ServerError;
use crate::state::AppState;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// The session bound to the current request.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Arc<Session>);

impl Deref for CurrentSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or_else(|| ServerError::Internal("session middleware is not installed".to_string()))
    }
}

/// Start the request's session and attach its cookie to the response.
///
/// A urlencoded form body is buffered (up to the configured limit) so the
/// session id can be read from it, then handed on to the handler unchanged.
pub async fn session_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let (mut parts, body) = request.into_parts();

    let (form, body): (Option<Bytes>, Body) = if is_form(&parts) {
        let bytes = axum::body::to_bytes(body, state.config.max_form_size)
            .await
            .map_err(|e| ServerError::BadRequest(format!("cannot read form body: {e}")))?;
        (Some(bytes.clone()), Body::from(bytes))
    } else {
        (None, body)
    };

    let started = state
        .registry
        .start(&mut parts, form.as_deref())
        .await
        .map_err(|e| {
            error!(path = %parts.uri.path(), error = %e, "Cannot start session");
            ServerError::SessionUnavailable
        })?;

    parts
        .extensions
        .insert(CurrentSession(started.session.clone()));

    let mut response = next.run(Request::from_parts(parts, body)).await;

    match HeaderValue::from_str(&started.cookie.to_set_cookie()) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => {
            warn!(session_id = %started.session.id(), error = %e, "Cannot encode session cookie");
        }
    }

    Ok(response)
}

fn is_form(parts: &Parts) -> bool {
    parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with(FORM_CONTENT_TYPE))
}
