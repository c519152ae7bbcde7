//! Server → client wire format
//!
//! Messages travel as newline-delimited JSON, one `Message` object per line.

use std::io::{BufRead, Write};

use crate::error::{AppError, SendError};
use crate::message::Message;

/// Encode a message as a single JSON line (newline included)
pub fn encode_line(message: &Message) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Writes messages to a byte stream, one per line
#[derive(Debug)]
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one message and flush it
    pub fn write_message(&mut self, message: &Message) -> Result<(), SendError> {
        let line = encode_line(message)?;
        self.inner.write_all(line.as_bytes())?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads messages written by [`MessageWriter`]
#[derive(Debug)]
pub struct MessageReader<R> {
    inner: R,
    line: String,
}

impl<R: BufRead> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
        }
    }

    /// Read the next message
    ///
    /// Returns `Ok(None)` once the stream is closed. Blank lines are skipped.
    pub fn read_message(&mut self) -> Result<Option<Message>, AppError> {
        loop {
            self.line.clear();
            if self.inner.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(text)?));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_stream_of_messages() {
        let mut writer = MessageWriter::new(Vec::new());
        writer.write_message(&Message::authored("hello", "alice")).unwrap();
        writer.write_message(&Message::control("alice logged out")).unwrap();

        let bytes = writer.into_inner();
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 2);

        let mut reader = MessageReader::new(Cursor::new(bytes));
        let first = reader.read_message().unwrap().unwrap();
        assert_eq!(first.author(), Some("alice"));
        assert_eq!(first.content(), "hello");

        let second = reader.read_message().unwrap().unwrap();
        assert!(second.is_control());

        assert!(reader.read_message().unwrap().is_none());
    }

    #[test]
    fn test_malformed_line_is_error() {
        let mut reader = MessageReader::new(Cursor::new(b"not json\n".to_vec()));
        assert!(matches!(reader.read_message(), Err(AppError::Json(_))));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let line = encode_line(&Message::control("hi")).unwrap();
        let input = format!("\n\r\n{}", line);
        let mut reader = MessageReader::new(Cursor::new(input.into_bytes()));
        assert_eq!(reader.read_message().unwrap().unwrap().content(), "hi");
    }
}
