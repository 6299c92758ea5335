//! TCP transports speaking line-delimited JSON

pub mod client;
pub mod server;

pub use client::{ConnectionState, TcpClientTransport};
pub use server::TcpServerTransport;
