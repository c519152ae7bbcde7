//! Error types for the chat server
//!
//! Defines application-level errors, per-recipient send errors and the
//! process-level failure taxonomy used by the binaries as exit codes.
//! Uses thiserror for ergonomic error definitions.

use std::fmt;
use std::io;

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (the listening socket is unusable) and
/// per-connection errors (handshake, name collision) that only cost
/// the offending connection.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on a single connection
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The listening socket could not be created (fatal)
    #[error("unable to bind server socket on {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    /// The listening socket could not be configured for timed accepts (fatal)
    #[error("unable to configure server socket accept timeout: {0}")]
    ListenerSetup(#[source] io::Error),

    /// `accept()` failed for a reason other than a timeout (fatal)
    #[error("server socket accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The connecting client did not send a usable name line
    #[error("name handshake failed: {0}")]
    Handshake(String),

    /// Another active session already uses this display name
    #[error("name already in use: {0}")]
    NameTaken(String),

    /// The client could not reach the server
    #[error("unable to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    /// A writable handle on a connection could not be obtained
    #[error("unable to get output stream: {0}")]
    OutputStream(#[source] io::Error),

    /// A handler thread could not be spawned
    #[error("unable to spawn thread: {0}")]
    Spawn(#[source] io::Error),
}

impl AppError {
    /// The process-level failure this error corresponds to
    pub fn failure(&self) -> Failure {
        match self {
            AppError::Bind { .. } => Failure::CreateServerSocket,
            AppError::ListenerSetup(_) => Failure::SetServerSocketTimeout,
            AppError::Accept(_) => Failure::ServerConnection,
            AppError::Handshake(_) | AppError::NameTaken(_) => Failure::NoNameClient,
            AppError::Connect { .. } => Failure::ClientConnection,
            AppError::OutputStream(_) => Failure::ClientOutputStream,
            AppError::Io(_) | AppError::Json(_) => Failure::ClientInputStream,
            AppError::Spawn(_) => Failure::Other,
        }
    }
}

/// Message send errors
///
/// Occurs when writing a message to one session's output fails. Broadcast
/// logs these and carries on with the remaining recipients.
#[derive(Debug, Error)]
pub enum SendError {
    /// The session's output has been released
    #[error("output closed")]
    Closed,

    /// The underlying stream rejected the write
    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    /// The message could not be encoded
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fatal conditions, each with its own process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    Other,
    InvalidPort,
    CreateServerSocket,
    SetServerSocketTimeout,
    ServerConnection,
    ClientInputStream,
    ClientOutputStream,
    NoNameClient,
    ClientConnection,
    NoUserName,
}

impl Failure {
    /// Every failure, in exit code order
    pub const ALL: [Failure; 10] = [
        Failure::Other,
        Failure::InvalidPort,
        Failure::CreateServerSocket,
        Failure::SetServerSocketTimeout,
        Failure::ServerConnection,
        Failure::ClientInputStream,
        Failure::ClientOutputStream,
        Failure::NoNameClient,
        Failure::ClientConnection,
        Failure::NoUserName,
    ];

    /// Process exit status for this failure (never 0)
    pub fn code(self) -> i32 {
        match self {
            Failure::Other => 1,
            Failure::InvalidPort => 2,
            Failure::CreateServerSocket => 3,
            Failure::SetServerSocketTimeout => 4,
            Failure::ServerConnection => 5,
            Failure::ClientInputStream => 6,
            Failure::ClientOutputStream => 7,
            Failure::NoNameClient => 8,
            Failure::ClientConnection => 9,
            Failure::NoUserName => 10,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Failure::Other => "Other failure",
            Failure::InvalidPort => "Invalid port number",
            Failure::CreateServerSocket => "Unable to create server socket",
            Failure::SetServerSocketTimeout => "Unable to set server socket timeout",
            Failure::ServerConnection => "Server connection failure",
            Failure::ClientInputStream => "Unable to get client input stream",
            Failure::ClientOutputStream => "Unable to get client output stream",
            Failure::NoNameClient => "Client did not send a usable name",
            Failure::ClientConnection => "Client connection failure",
            Failure::NoUserName => "No user name available",
        };
        f.write_str(text)
    }
}
