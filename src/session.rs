//! Session struct definition
//!
//! Server-side record of one connected client: its identity, output
//! channel and the ready/banned flags other handlers observe.

use std::fmt;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::codec::MessageWriter;
use crate::error::{AppError, SendError};
use crate::message::Message;
use crate::types::SessionId;

type Output = MessageWriter<Box<dyn Write + Send>>;

/// Longest a single write to a client socket may block
///
/// Broadcasts write while holding the registry lock, so a client that stops
/// reading must not hold up every other handler indefinitely.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connected client information
///
/// Shared between the registry and the session's own handler. Only the
/// handler closes it; other handlers write to it during broadcast and a
/// privileged handler may ban it.
pub struct Session {
    /// Unique identifier for this session
    id: SessionId,
    /// Display name, unique among active sessions
    name: String,
    /// Server → client message stream (None once closed)
    output: Mutex<Option<Output>>,
    /// Socket handle used to unblock the handler's pending read
    connection: Option<TcpStream>,
    ready: AtomicBool,
    banned: AtomicBool,
}

impl Session {
    /// Create a session writing to the given socket
    ///
    /// The session is ready once its output handle has been obtained.
    pub fn connect(name: impl Into<String>, stream: &TcpStream) -> Result<Self, AppError> {
        let output = stream.try_clone().map_err(AppError::OutputStream)?;
        output
            .set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(AppError::OutputStream)?;
        let connection = stream.try_clone()?;
        let mut session = Self::with_output(name, output);
        session.connection = Some(connection);
        Ok(session)
    }

    /// Create a session writing to an arbitrary byte sink
    pub fn with_output(name: impl Into<String>, output: impl Write + Send + 'static) -> Self {
        let output: Box<dyn Write + Send> = Box::new(output);
        Self {
            id: SessionId::new(),
            name: name.into(),
            output: Mutex::new(Some(MessageWriter::new(output))),
            connection: None,
            ready: AtomicBool::new(true),
            banned: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the output channel is usable
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_banned(&self) -> bool {
        self.banned.load(Ordering::SeqCst)
    }

    /// Mark this session as banned
    ///
    /// The flag is never cleared. The read half of the socket is shut down
    /// so that a handler blocked on a read wakes up and sees the ban.
    /// Returns false if the session was already banned.
    pub fn ban(&self) -> bool {
        if self.banned.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Session {} ({}) banned", self.name, self.id);
        if let Some(connection) = &self.connection {
            if let Err(e) = connection.shutdown(Shutdown::Read) {
                debug!("Unable to shut down input of {}: {}", self.name, e);
            }
        }
        true
    }

    /// Send a message to this session
    ///
    /// Returns an error if the session is closed or the write fails.
    pub fn send(&self, message: &Message) -> Result<(), SendError> {
        if !self.is_ready() {
            return Err(SendError::Closed);
        }
        match lock(&self.output).as_mut() {
            Some(output) => output.write_message(message),
            None => Err(SendError::Closed),
        }
    }

    /// Release the output channel and the socket
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
        if lock(&self.output).take().is_some() {
            debug!("Closed output stream of {}", self.name);
        }
        if let Some(connection) = &self.connection {
            match connection.shutdown(Shutdown::Both) {
                Ok(()) => debug!("Closed socket of {}", self.name),
                Err(e) => debug!("Socket of {} already closed: {}", self.name, e),
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .field("banned", &self.is_banned())
            .finish()
    }
}
