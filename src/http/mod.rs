//! HTTP API for the coaching UI
//!
//! This module provides a REST API for controlling the voice coaching session:
//! - POST /coach/session/start - Start a session
//! - POST /coach/session/stop - Stop the session
//! - GET /coach/session/status - Query session state and counters
//! - GET /coach/session/transcript - Get accumulated transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
