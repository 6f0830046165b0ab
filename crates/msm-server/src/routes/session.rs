//! Session endpoints.
//!
//! Every handler here runs behind the session middleware and works on the
//! request's [`CurrentSession`].

use axum::{
    Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
};
use msm_session::{Key, SessionValues, Value};
use serde::{Deserialize, Serialize};

use crate::convert::{json_to_value, value_to_json, values_to_json};
use crate::error::{Result, ServerError};
use crate::session::CurrentSession;
use crate::state::AppState;

/// Key under which the root page counts visits.
pub const VISITS_KEY: &str = "visits";

/// Response of the root page.
#[derive(Debug, Serialize, Deserialize)]
pub struct VisitResponse {
    pub session_id: String,
    pub visits: i64,
}

/// A whole session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub values: serde_json::Value,
}

/// A single stored value.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValueResponse {
    pub key: String,
    pub value: serde_json::Value,
}

/// Query parameters for a counter increment.
#[derive(Debug, Default, Deserialize)]
pub struct CounterRequest {
    /// Amount to add. Defaults to 1.
    pub by: Option<i64>,
}

/// Count a visit and report the total for this session.
pub async fn root_handler(session: CurrentSession) -> Result<Json<VisitResponse>> {
    let visits = session.with_lock(|values| increment(values, Key::from(VISITS_KEY), 1))?;
    Ok(Json(VisitResponse {
        session_id: session.id().to_string(),
        visits,
    }))
}

/// Return the session id and all of its values.
pub async fn get_session_handler(session: CurrentSession) -> Json<SessionResponse> {
    let (values, _) = session.snapshot();
    Json(SessionResponse {
        id: session.id().to_string(),
        values: values_to_json(&values),
    })
}

pub async fn get_value_handler(
    session: CurrentSession,
    Path(key): Path<String>,
) -> Result<Json<ValueResponse>> {
    let value = session
        .get(key.as_str())?
        .ok_or_else(|| ServerError::NotFound(format!("No value for key '{key}'")))?;
    Ok(Json(ValueResponse {
        value: value_to_json(&value),
        key,
    }))
}

pub async fn put_value_handler(
    session: CurrentSession,
    Path(key): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ValueResponse>> {
    let value = json_to_value(&body);
    session.set(key.as_str(), value.clone())?;
    Ok(Json(ValueResponse {
        value: value_to_json(&value),
        key,
    }))
}

pub async fn delete_value_handler(
    session: CurrentSession,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    session.delete(key.as_str())?;
    Ok(StatusCode::NO_CONTENT)
}

/// Atomically add to an integer counter, creating it at zero.
pub async fn increment_handler(
    session: CurrentSession,
    Path(key): Path<String>,
    Query(request): Query<CounterRequest>,
) -> Result<Json<ValueResponse>> {
    let by = request.by.unwrap_or(1);
    let total = session.with_lock(|values| increment(values, Key::from(key.as_str()), by))?;
    Ok(Json(ValueResponse {
        key,
        value: serde_json::Value::from(total),
    }))
}

fn increment(values: &mut SessionValues, key: Key, by: i64) -> Result<i64> {
    if key.is_absent() {
        return Err(ServerError::BadRequest("counter key must not be empty".to_string()));
    }
    let current = match values.get(&key) {
        None => 0,
        Some(Value::Int(i)) => *i,
        Some(other) => {
            return Err(ServerError::BadRequest(format!(
                "value at '{key}' is {}, not int",
                other.kind()
            )));
        }
    };
    let next = current
        .checked_add(by)
        .ok_or_else(|| ServerError::BadRequest(format!("counter '{key}' would overflow")))?;
    values.insert(key, Value::Int(next));
    Ok(next)
}

/// Create the session routes.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/session", get(get_session_handler))
        .route(
            "/session/values/{key}",
            get(get_value_handler)
                .put(put_value_handler)
                .delete(delete_value_handler),
        )
        .route("/session/counters/{key}", post(increment_handler))
}
