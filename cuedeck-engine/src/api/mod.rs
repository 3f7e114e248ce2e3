//! HTTP/SSE control surface
//!
//! REST endpoints for registry mutation and switching, plus a server-sent
//! event stream mirroring the engine's event bus.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{run, AppContext};
