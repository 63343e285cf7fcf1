//! WebSocket transport: wire envelope, control protocol and per-connection
//! pumps

mod handler;
mod message;
mod protocol;

pub use handler::{handle_frame, handle_socket, ws_handler};
pub use message::Message;
pub use protocol::{Command, ProtocolError};
