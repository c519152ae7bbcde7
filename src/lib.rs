//! Multi-client TCP Chat Server Library
//!
//! A line-oriented chat service built on blocking sockets and one thread
//! per connection. Every line a client sends is rebroadcast to all
//! connected clients, tagged with the sender's name.
//!
//! # Features
//! - Name handshake with duplicate-name rejection
//! - Broadcast of chat lines as timestamped messages
//! - Control commands: `bye`, `kick <name>`, `kill`
//! - Privileged first client (may kick others or stop the server)
//! - Optional shutdown when the last client leaves
//! - Client-side duplex pump pairing user input and server input
//!
//! # Architecture
//! - `ChatServer` runs the accept loop and spawns a `ClientHandler`
//!   thread per admitted connection
//! - Sessions live in a shared `Registry` guarded by a single lock; a
//!   broadcast holds that lock for its whole fan-out
//! - Shutdown is cooperative through flags (`ServerControl`, `RunFlag`)
//!   plus closing sockets to wake blocked reads
//!
//! # Example
//! ```no_run
//! use broadcast_chat::{ChatServer, ServerConfig};
//!
//! let server = ChatServer::bind(ServerConfig::default())?;
//! server.run()?;
//! # Ok::<(), broadcast_chat::AppError>(())
//! ```

pub mod client;
pub mod codec;
pub mod command;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use client::{
    ChatClient, MessageSink, ObjectSink, OutputMode, PumpExit, PumpOutcome, Roster, RosterSink,
    RunFlag, TextSink,
};
pub use command::Command;
pub use error::{AppError, Failure, SendError};
pub use handler::{ClientHandler, HandlerState};
pub use message::{Message, MessageOrder, OrderCriteria};
pub use registry::Registry;
pub use server::{ChatServer, ServerConfig, ServerControl};
pub use session::Session;
pub use types::SessionId;
