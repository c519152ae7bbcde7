//! In-memory stand-ins for socket streams used by unit tests

use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

use crate::codec::MessageReader;
use crate::message::Message;
use crate::session::lock;

/// Cloneable writer whose bytes can be inspected afterwards
#[derive(Debug, Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as UTF-8 text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }

    /// Decode everything written so far as a message stream
    pub fn messages(&self) -> Vec<Message> {
        let bytes = lock(&self.0).clone();
        let mut reader = MessageReader::new(Cursor::new(bytes));
        let mut messages = Vec::new();
        while let Some(message) = reader.read_message().unwrap() {
            messages.push(message);
        }
        messages
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that rejects every write
#[derive(Debug, Clone, Copy)]
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
    }
}
