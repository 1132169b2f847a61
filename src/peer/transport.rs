use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use super::error::PeerError;
use super::message::Message;
use crate::constants::{MAX_LINE_LENGTH, READ_BUFFER_CAPACITY};

/// Reads newline-framed messages from a byte stream.
///
/// Bytes accumulate in an internal buffer until a `\n` appears; each line is
/// then parsed as JSON. Empty lines are skipped, and a line that fails to
/// parse is logged and dropped without affecting the connection.
pub struct MessageReader<R> {
    reader: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// Returns the next well-formed message.
    ///
    /// Errors with [`PeerError::ConnectionClosed`] on EOF and
    /// [`PeerError::LineTooLong`] when a line exceeds the frame limit
    /// without terminating.
    pub async fn next(&mut self) -> Result<Message, PeerError> {
        loop {
            while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                let line = &line[..pos];
                if line.is_empty() {
                    continue;
                }
                match Message::from_line(line) {
                    Ok(message) => return Ok(message),
                    Err(e) => {
                        warn!("dropping unparseable message: {e}");
                    }
                }
            }

            if self.buf.len() > MAX_LINE_LENGTH {
                return Err(PeerError::LineTooLong(self.buf.len()));
            }

            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(PeerError::ConnectionClosed);
            }
        }
    }
}

/// Writes newline-framed messages to a byte stream.
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), PeerError> {
        let line = message.to_line()?;
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }
}
