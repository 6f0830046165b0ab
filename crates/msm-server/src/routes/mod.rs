//! HTTP route handlers.

pub mod health;
pub mod session;

pub use health::{HealthResponse, health, health_routes};
pub use session::{
    CounterRequest, SessionResponse, ValueResponse, VisitResponse, delete_value_handler,
    get_session_handler, get_value_handler, increment_handler, put_value_handler, root_handler,
    session_routes,
};
