//! ChatServer accept loop
//!
//! The server owns the listening socket and runs the accept loop on the
//! calling thread. Each admitted connection gets a `Session` in the shared
//! `Registry` and a dedicated `ClientHandler` thread.
//!
//! Shutdown is cooperative: the loop runs while `ServerControl` says the
//! server is listening. That flag is cleared either by the privileged
//! client's `kill` or, with quit-on-empty, by the last handler to exit.

use std::io::{self, BufRead, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::handler::{ClientHandler, HandlerState};
use crate::message::Message;
use crate::registry::Registry;
use crate::session::{lock, Session};

/// Default listening port
pub const DEFAULT_PORT: u16 = 1394;

/// Default wait for a new connection before re-checking the listening flag
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default wait for a new connection's name line
pub const DEFAULT_NAME_TIMEOUT: Duration = Duration::from_secs(30);

/// Granularity of the non-blocking accept poll
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Startup settings, fixed for the life of the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind (0 picks a free port)
    pub port: u16,
    /// How long one accept attempt waits
    pub accept_timeout: Duration,
    /// Stop once the last client handler exits
    pub quit_on_empty: bool,
    /// How long a new connection may take to send its name
    pub name_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            quit_on_empty: true,
            name_timeout: DEFAULT_NAME_TIMEOUT,
        }
    }
}

impl ServerConfig {
    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Listening state shared between the accept loop and the handlers
#[derive(Debug)]
pub struct ServerControl {
    listening: AtomicBool,
    live_handlers: Mutex<usize>,
    quit_on_empty: bool,
}

impl ServerControl {
    pub fn new(quit_on_empty: bool) -> Self {
        Self {
            listening: AtomicBool::new(true),
            live_handlers: Mutex::new(0),
            quit_on_empty,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Make the accept loop exit at its next check
    pub fn stop_listening(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            info!("Server stops listening");
        }
    }

    pub fn live_handlers(&self) -> usize {
        *lock(&self.live_handlers)
    }

    /// Count a handler about to be spawned
    pub fn handler_started(&self) {
        *lock(&self.live_handlers) += 1;
    }

    /// Undo [`handler_started`](Self::handler_started) for a handler that
    /// never ran; does not trigger quit-on-empty
    pub fn handler_aborted(&self) {
        let mut live = lock(&self.live_handlers);
        *live = live.saturating_sub(1);
    }

    /// Population callback, called exactly once by every exiting handler
    ///
    /// Returns the number of handlers still running. When that reaches
    /// zero and quit-on-empty is set, listening stops.
    pub fn handler_finished(&self) -> usize {
        let mut live = lock(&self.live_handlers);
        *live = live.saturating_sub(1);
        if *live == 0 {
            if self.quit_on_empty {
                info!("No more client handlers");
                self.stop_listening();
            }
        } else {
            info!("Still {} client handlers remaining", *live);
        }
        *live
    }
}

/// The chat server
pub struct ChatServer {
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<Registry>,
    control: Arc<ServerControl>,
}

impl ChatServer {
    /// Bind the listening socket
    ///
    /// Fails with `Bind` if the socket cannot be created and with
    /// `ListenerSetup` if it cannot be put in timed-accept mode.
    pub fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr).map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(AppError::ListenerSetup)?;

        info!(
            "ChatServer bound on {} (accept timeout {:?}, quit on empty {})",
            addr, config.accept_timeout, config.quit_on_empty
        );

        let control = Arc::new(ServerControl::new(config.quit_on_empty));
        Ok(Self {
            listener,
            config,
            registry: Arc::new(Registry::new()),
            control,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn control(&self) -> Arc<ServerControl> {
        Arc::clone(&self.control)
    }

    /// Run the accept loop until listening stops
    ///
    /// Returns `Err(Accept)` if the listening socket fails; that error is
    /// meant to end the process. On a normal stop every remaining session
    /// is closed, all handler threads are joined and the socket is closed.
    pub fn run(self) -> Result<(), AppError> {
        info!("ChatServer started");
        let mut handlers: Vec<JoinHandle<HandlerState>> = Vec::new();

        while self.control.is_listening() {
            let (stream, peer) = match self.accept() {
                Ok(Some(conn)) => conn,
                Ok(None) => {
                    debug!("Accept timeout, waiting again");
                    continue;
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                    self.registry.close_all();
                    return Err(AppError::Accept(e));
                }
            };

            info!("New connection from {}", peer);
            match self.admit(stream) {
                Ok(handle) => handlers.push(handle),
                Err(e) => warn!("Connection from {} refused: {}", peer, e),
            }

            reap_finished(&mut handlers);
        }

        // Handlers may still be blocked reading from their clients
        self.registry.close_all();
        for handle in handlers {
            match handle.join() {
                Ok(state) => debug!("Handler joined in state {:?}", state),
                Err(_) => error!("Client handler panicked"),
            }
        }
        info!("All client handlers terminated");
        info!("Closing server socket");
        Ok(())
    }

    /// Wait up to the accept timeout for a connection
    ///
    /// Returns early with `None` if listening stops while waiting.
    fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let deadline = Instant::now() + self.config.accept_timeout;
        loop {
            match self.listener.accept() {
                Ok(conn) => return Ok(Some(conn)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline || !self.control.is_listening() {
                        return Ok(None);
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Name handshake, registration and handler spawn for one connection
    fn admit(&self, stream: TcpStream) -> Result<JoinHandle<HandlerState>, AppError> {
        stream.set_nonblocking(false)?;
        let mut input = BufReader::new(stream.try_clone()?);
        let name = read_name(&stream, &mut input, self.config.name_timeout)?;
        info!("Client name: {}", name);

        let session = Arc::new(Session::connect(name.as_str(), &stream)?);

        self.control.handler_started();
        if let Err(e) = self.registry.register(Arc::clone(&session)) {
            self.control.handler_aborted();
            let notice = Message::control(format!(
                "Sorry, another client already uses the name {}. Try another name.",
                name
            ));
            if let Err(send_err) = session.send(&notice) {
                warn!("Unable to notify rejected client {}: {}", name, send_err);
            }
            session.close();
            return Err(e);
        }

        let handler = ClientHandler::new(
            Arc::clone(&session),
            input,
            Arc::clone(&self.registry),
            Arc::clone(&self.control),
        );
        thread::Builder::new()
            .name(format!("handler-{}", name))
            .spawn(move || handler.run())
            .map_err(|e| {
                // The handler never ran, so undo its registration by hand
                self.registry.unregister(session.id());
                session.close();
                self.control.handler_aborted();
                AppError::Spawn(e)
            })
    }
}

/// Read the first line of a new connection as the client's display name
fn read_name(
    stream: &TcpStream,
    input: &mut impl BufRead,
    timeout: Duration,
) -> Result<String, AppError> {
    stream.set_read_timeout(Some(timeout))?;

    let mut line = String::new();
    let read = input.read_line(&mut line);
    stream.set_read_timeout(None)?;

    match read {
        Ok(0) => Err(AppError::Handshake(
            "connection closed before a name was sent".to_string(),
        )),
        Ok(_) => {
            let name = line.trim();
            if name.is_empty() {
                Err(AppError::Handshake("empty name".to_string()))
            } else {
                Ok(name.to_string())
            }
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            Err(AppError::Handshake(format!("no name received within {:?}", timeout)))
        }
        Err(e) => Err(AppError::Handshake(e.to_string())),
    }
}

/// Join handler threads that have already finished
fn reap_finished(handlers: &mut Vec<JoinHandle<HandlerState>>) {
    let mut i = 0;
    while i < handlers.len() {
        if handlers[i].is_finished() {
            let handle = handlers.swap_remove(i);
            match handle.join() {
                Ok(state) => debug!("Reaped handler in state {:?}", state),
                Err(_) => error!("Client handler panicked"),
            }
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            accept_timeout: Duration::from_millis(50),
            quit_on_empty: true,
            name_timeout: Duration::from_millis(300),
        }
    }

    #[test]
    fn test_population_callback_quits_on_empty() {
        let control = ServerControl::new(true);
        control.handler_started();
        control.handler_started();

        assert_eq!(control.handler_finished(), 1);
        assert!(control.is_listening());
        assert_eq!(control.handler_finished(), 0);
        assert!(!control.is_listening());
    }

    #[test]
    fn test_population_callback_without_quit() {
        let control = ServerControl::new(false);
        control.handler_started();

        assert_eq!(control.handler_finished(), 0);
        assert!(control.is_listening());
    }

    #[test]
    fn test_concurrent_handler_exits_counted_once() {
        let control = Arc::new(ServerControl::new(true));
        for _ in 0..16 {
            control.handler_started();
        }

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let control = Arc::clone(&control);
                thread::spawn(move || {
                    control.handler_finished();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(control.live_handlers(), 0);
        assert!(!control.is_listening());
    }

    #[test]
    fn test_aborted_handler_does_not_stop_server() {
        let control = ServerControl::new(true);
        control.handler_started();
        control.handler_aborted();

        assert_eq!(control.live_handlers(), 0);
        assert!(control.is_listening());
    }

    #[test]
    fn test_bind_failure_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = ServerConfig {
            port,
            ..local_config()
        };

        assert!(matches!(ChatServer::bind(config), Err(AppError::Bind { .. })));
    }

    #[test]
    fn test_accept_times_out() {
        let server = ChatServer::bind(local_config()).unwrap();
        let started = Instant::now();

        assert!(server.accept().unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_accept_returns_early_when_stopped() {
        let config = ServerConfig {
            accept_timeout: Duration::from_secs(30),
            ..local_config()
        };
        let server = ChatServer::bind(config).unwrap();
        server.control().stop_listening();
        let started = Instant::now();

        assert!(server.accept().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_read_name() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        client.write_all(b"  alice \r\n").unwrap();

        let mut input = BufReader::new(stream.try_clone().unwrap());
        let name = read_name(&stream, &mut input, Duration::from_secs(5)).unwrap();
        assert_eq!(name, "alice");
    }

    #[test]
    fn test_read_name_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();

        let mut input = BufReader::new(stream.try_clone().unwrap());
        let result = read_name(&stream, &mut input, Duration::from_millis(100));
        assert!(matches!(result, Err(AppError::Handshake(_))));
    }

    #[test]
    fn test_read_name_rejects_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        client.write_all(b"\n").unwrap();

        let mut input = BufReader::new(stream.try_clone().unwrap());
        let result = read_name(&stream, &mut input, Duration::from_secs(5));
        assert!(matches!(result, Err(AppError::Handshake(_))));
    }
}
