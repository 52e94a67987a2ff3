pub mod client;
pub mod handlers;
pub mod server;
pub mod session;

pub use client::{
    ConnectionRegistry, Outbound, CLOSE_GOING_AWAY, CLOSE_INTERNAL_ERROR, CLOSE_NORMAL,
};
pub use server::{start, ServerConfig, ServerHandle};
pub use session::{ChatSession, ConnectionFault, SessionState};
