//! Shared helpers for the loopback integration tests

#![allow(dead_code)]

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use broadcast_chat::codec::MessageReader;
use broadcast_chat::{AppError, ChatServer, Message, Registry, ServerConfig, ServerControl};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// A server running its accept loop on a background thread
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    pub control: Arc<ServerControl>,
    pub handle: JoinHandle<Result<(), AppError>>,
}

impl TestServer {
    pub fn start(quit_on_empty: bool) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            accept_timeout: Duration::from_millis(50),
            quit_on_empty,
            name_timeout: Duration::from_secs(2),
        };
        let server = ChatServer::bind(config).expect("bind test server");
        let addr = server.local_addr().expect("local addr");
        let registry = server.registry();
        let control = server.control();
        let handle = thread::spawn(move || server.run());
        Self {
            addr,
            registry,
            control,
            handle,
        }
    }

    /// Connect a raw client and wait until the server has registered it
    pub fn join(&self, name: &str) -> TestClient {
        let before = self.registry.len();
        let client = TestClient::connect(self.addr, name);
        let registry = Arc::clone(&self.registry);
        let expected = name.to_string();
        wait_until(move || {
            registry.len() > before && registry.names().contains(&expected)
        });
        client
    }

    /// Wait for the accept loop to return
    pub fn finish(self) -> Result<(), AppError> {
        let handle = self.handle;
        wait_until(|| handle.is_finished());
        handle.join().expect("server thread panicked")
    }
}

/// Plain socket client speaking the wire protocol directly
pub struct TestClient {
    stream: TcpStream,
    reader: MessageReader<BufReader<TcpStream>>,
}

impl TestClient {
    pub fn connect(addr: SocketAddr, name: &str) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream.set_read_timeout(Some(WAIT)).expect("read timeout");
        let reader = MessageReader::new(BufReader::new(stream.try_clone().expect("clone")));
        let mut client = Self { stream, reader };
        client.send(name);
        client
    }

    pub fn send(&mut self, line: &str) {
        writeln!(self.stream, "{}", line).expect("send line");
        self.stream.flush().expect("flush");
    }

    /// Next message from the server; panics on EOF or timeout
    pub fn recv(&mut self) -> Message {
        self.reader
            .read_message()
            .expect("read message")
            .expect("connection closed")
    }

    /// True once the server has closed this connection
    pub fn is_closed(&mut self) -> bool {
        match self.reader.read_message() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(_) => true,
        }
    }
}

/// Poll `condition` until it holds, panicking after [`WAIT`]
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", WAIT);
        thread::sleep(Duration::from_millis(10));
    }
}
