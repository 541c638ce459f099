//! HTTP layer.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → server.rs (TraceLayer, base /api route)
//!     → handlers.rs (kernel routes registered by the personality)
//!     → response.rs (GatewayError → status + JSON body)
//! ```

pub mod handlers;
pub mod response;
pub mod server;

pub use server::{build_router, serve, ListenerControl, ServerHandle, ServerSettings};
