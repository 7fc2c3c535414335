//! HTTP surface over the tracker tools.
//!
//! Lets an orchestration layer in another process drive the tracker with
//! the same JSON arguments an agent would pass to the tools.
//!
//! # Endpoints
//!
//! - `GET  /health`      - Liveness probe
//! - `GET  /tools`       - Tool definitions
//! - `POST /tools/:name` - Run a tool
//! - `GET  /requests`    - List requests
//! - `GET  /tasks/:id`   - Task details

pub mod routes;

pub use routes::{app_router, AppState};
