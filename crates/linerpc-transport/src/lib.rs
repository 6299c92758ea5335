//! # linerpc transports
//!
//! Line-delimited JSON framing and the transports built on it:
//!
//! - [`codec`]: `\n`-delimited JSON frames, tolerant of arbitrary chunking
//! - [`tcp::TcpClientTransport`]: one outbound connection with reconnect,
//!   retry, per-request timeout and stop-buffering policies
//! - [`tcp::TcpServerTransport`]: accepts connections and feeds each decoded
//!   frame to a [`MessageHandler`]
//! - [`LoopbackTransport`]: same-process transport for tests and embedding
//! - [`compression`]: `z`-prefixed gzip envelope for message transports
//! - [`RpcServer`]: one dispatcher served over several listeners

pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod loopback;
pub mod tcp;
pub mod transport;

pub use codec::{DecodedFrame, FrameDecoder, JsonLineCodec, encode_frame};
pub use compression::{pack_message, unpack_message};
pub use config::{CompressionConfig, TcpClientConfig, TcpServerConfig};
pub use error::{CodecError, TransportError, TransportResult};
pub use events::{EventBus, EventReceiver, TransportEvent};
pub use host::RpcServer;
pub use loopback::LoopbackTransport;
pub use tcp::{ConnectionState, TcpClientTransport, TcpServerTransport};
pub use transport::{ClientTransport, MessageHandler, ResponseWriter};
