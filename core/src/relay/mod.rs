//! Relay module - WebSocket streaming relay

pub mod error;
pub mod frame;
pub mod handlers;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod sse;
pub mod upstream;

pub use frame::ClientFrame;
pub use registry::{ClientHandle, ConnectionRegistry};
pub use server::{create_router, AppState, RelayServer};
pub use session::{RelayContext, RelaySession, SessionOutcome};
