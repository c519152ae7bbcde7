//! Client-side duplex pump
//!
//! A connected client runs two loops on two threads:
//! - outbound: user input lines → server
//! - inbound: server messages → a [`MessageSink`] (console, GUI pipe, ...)
//!
//! Both loops share one [`RunFlag`] and check it before every read. The
//! first loop to stop clears the flag and the other one stops at its next
//! iteration. Nothing is interrupted: a loop blocked on a read only notices
//! once that read returns.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, info, warn};

use crate::codec::{MessageReader, MessageWriter};
use crate::command::Command;
use crate::error::{AppError, SendError};
use crate::message::Message;
use crate::session::lock;

/// Run state shared by the two pump loops (and optionally a GUI)
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag; returns true if this call is the one that cleared it
    pub fn stop(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a pump loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The other loop cleared the run flag
    Stopped,
    /// The input reached end of stream
    InputClosed,
    /// The user sent `bye`
    Bye,
    /// A read, decode or render error occurred
    Fault,
}

/// Exit reasons of both loops of one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpOutcome {
    pub outbound: PumpExit,
    pub inbound: PumpExit,
}

/// How inbound messages are handed to the user side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Rendered text lines
    #[default]
    Text,
    /// One JSON message per line
    Object,
}

impl OutputMode {
    /// 1 = Text, 2 = Object; out-of-range values are clamped
    pub fn from_index(index: i32) -> Self {
        if index >= 2 {
            OutputMode::Object
        } else {
            OutputMode::Text
        }
    }

    pub fn index(self) -> i32 {
        match self {
            OutputMode::Text => 1,
            OutputMode::Object => 2,
        }
    }

    /// Sink writing to `out` in this mode
    pub fn sink<W: Write + Send + 'static>(self, out: W) -> Box<dyn MessageSink> {
        match self {
            OutputMode::Text => Box::new(TextSink::new(out)),
            OutputMode::Object => Box::new(ObjectSink::new(out)),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Text => f.write_str("Text output type"),
            OutputMode::Object => f.write_str("Object output type"),
        }
    }
}

/// Receiver of the messages a client gets from the server
pub trait MessageSink: Send {
    /// Called once per message, in delivery order
    fn on_message(&mut self, message: &Message) -> io::Result<()>;

    /// Called after a message announcing that `name` left
    fn on_user_left(&mut self, _name: &str) -> io::Result<()> {
        Ok(())
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn on_message(&mut self, message: &Message) -> io::Result<()> {
        (**self).on_message(message)
    }

    fn on_user_left(&mut self, name: &str) -> io::Result<()> {
        (**self).on_user_left(name)
    }
}

/// Writes `[date] author > content` lines
#[derive(Debug)]
pub struct TextSink<W> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> MessageSink for TextSink<W> {
    fn on_message(&mut self, message: &Message) -> io::Result<()> {
        writeln!(self.out, "{}", message)?;
        self.out.flush()
    }
}

/// Re-emits messages as JSON lines, e.g. into a GUI pipe
#[derive(Debug)]
pub struct ObjectSink<W> {
    out: MessageWriter<W>,
}

impl<W: Write> ObjectSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: MessageWriter::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> MessageSink for ObjectSink<W> {
    fn on_message(&mut self, message: &Message) -> io::Result<()> {
        self.out.write_message(message).map_err(|e| match e {
            SendError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })
    }
}

/// Live set of user names seen in the chat
#[derive(Debug, Clone, Default)]
pub struct Roster(Arc<Mutex<BTreeSet<String>>>);

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the name was not yet listed
    pub fn insert(&self, name: &str) -> bool {
        lock(&self.0).insert(name.to_string())
    }

    pub fn remove(&self, name: &str) -> bool {
        lock(&self.0).remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.0).contains(name)
    }

    /// Names in alphabetical order
    pub fn names(&self) -> Vec<String> {
        lock(&self.0).iter().cloned().collect()
    }
}

/// Sink decorator maintaining a [`Roster`]
#[derive(Debug)]
pub struct RosterSink<S> {
    inner: S,
    roster: Roster,
}

impl<S> RosterSink<S> {
    pub fn new(inner: S, roster: Roster) -> Self {
        Self { inner, roster }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: MessageSink> MessageSink for RosterSink<S> {
    fn on_message(&mut self, message: &Message) -> io::Result<()> {
        if let Some(author) = message.author() {
            self.roster.insert(author);
        }
        self.inner.on_message(message)
    }

    fn on_user_left(&mut self, name: &str) -> io::Result<()> {
        self.roster.remove(name);
        self.inner.on_user_left(name)
    }
}

/// Forward user lines to the server until input ends, `bye`, or stop
pub fn pump_user_input<R: BufRead, W: Write>(
    mut user_in: R,
    mut server_out: W,
    run: &RunFlag,
) -> PumpExit {
    let mut line = String::new();
    let exit = loop {
        if !run.is_running() {
            break PumpExit::Stopped;
        }

        line.clear();
        match user_in.read_line(&mut line) {
            Ok(0) => {
                warn!("User input closed");
                break PumpExit::InputClosed;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Cannot read user input: {}", e);
                break PumpExit::Fault;
            }
        }

        let text = line.trim_end_matches(['\r', '\n']);
        let sent = writeln!(server_out, "{}", text).and_then(|()| server_out.flush());
        if let Err(e) = sent {
            warn!("Write to server failed: {}", e);
        }

        if Command::parse(text) == Command::Bye {
            debug!("Bye sent, outbound loop ending");
            break PumpExit::Bye;
        }
    };

    if run.stop() {
        info!("Outbound loop changed run state at the end");
    }
    exit
}

/// Hand server messages to `sink` until the stream ends, a fault, or stop
pub fn pump_server_input<R: BufRead, S: MessageSink + ?Sized>(
    server_in: R,
    sink: &mut S,
    run: &RunFlag,
) -> PumpExit {
    let mut reader = MessageReader::new(server_in);
    let exit = loop {
        if !run.is_running() {
            break PumpExit::Stopped;
        }

        let message = match reader.read_message() {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!("Server closed the connection");
                break PumpExit::InputClosed;
            }
            Err(e) => {
                warn!("Unable to read message from server: {}", e);
                break PumpExit::Fault;
            }
        };

        if let Err(e) = sink.on_message(&message) {
            warn!("Unable to render message: {}", e);
            break PumpExit::Fault;
        }

        if let Some(name) = message.departed_user() {
            if let Err(e) = sink.on_user_left(name) {
                warn!("Unable to retire {} from roster: {}", name, e);
            }
        }
    };

    if run.stop() {
        info!("Inbound loop changed run state at the end");
    }
    exit
}

/// A client connection ready to run its duplex pump
#[derive(Debug)]
pub struct ChatClient {
    name: String,
    stream: TcpStream,
    run: RunFlag,
}

impl ChatClient {
    /// Connect to the server and send the name line
    pub fn connect(addr: impl ToSocketAddrs + fmt::Debug, name: &str) -> Result<Self, AppError> {
        let stream = TcpStream::connect(&addr).map_err(|source| AppError::Connect {
            addr: format!("{:?}", addr),
            source,
        })?;
        info!("Connected to {:?} as {}", addr, name);

        let mut writer = &stream;
        writeln!(writer, "{}", name)?;
        writer.flush()?;

        Ok(Self {
            name: name.to_string(),
            stream,
            run: RunFlag::new(),
        })
    }

    /// Share an externally owned run flag (e.g. with a GUI)
    pub fn with_run_flag(mut self, run: RunFlag) -> Self {
        self.run = run;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_flag(&self) -> RunFlag {
        self.run.clone()
    }

    /// Run both loops until they have stopped, then close the socket
    pub fn run<R, S>(self, user_in: R, sink: &mut S) -> Result<PumpOutcome, AppError>
    where
        R: BufRead + Send,
        S: MessageSink + ?Sized,
    {
        let server_out = self.stream.try_clone().map_err(AppError::OutputStream)?;
        let server_in = BufReader::new(self.stream.try_clone()?);
        let run = &self.run;

        let outcome = thread::scope(|scope| {
            let outbound = thread::Builder::new()
                .name("user-handler".to_string())
                .spawn_scoped(scope, move || {
                    let exit = pump_user_input(user_in, &server_out, run);
                    // Lets the server see end of stream if we never said bye
                    if let Err(e) = server_out.shutdown(Shutdown::Write) {
                        debug!("Server output already closed: {}", e);
                    }
                    exit
                })?;

            let inbound = pump_server_input(server_in, sink, run);
            let outbound = outbound.join().unwrap_or_else(|_| {
                warn!("User handler thread panicked");
                PumpExit::Fault
            });
            Ok::<_, io::Error>(PumpOutcome { outbound, inbound })
        })?;

        info!("All client threads terminated");
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Client socket already closed: {}", e);
        }
        Ok(outcome)
    }
}
