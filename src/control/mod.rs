//! HTTP control surface for operators
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           Control Server            │
//! │                                     │
//! │  GET  /api/health                   │
//! │  GET  /api/status                   │
//! │  POST /api/monitor/start            │
//! │  POST /api/monitor/stop             │
//! │  POST /api/monitor/restart          │
//! │  POST /api/monitor/refresh          │
//! │  GET  /api/events/stats             │
//! │  GET  /metrics                      │
//! └─────────────────────────────────────┘
//! ```
//!
//! Start and restart accept an optional JSON body of
//! [`crate::scheduler::MonitorOverrides`].

pub mod api;
pub mod server;

pub use api::{create_router, ApiResponse, ErrorResponse};
pub use server::{AppState, ControlServer, ServerError};
