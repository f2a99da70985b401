use bytes::BytesMut;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::{io::AsyncReadExt, io::AsyncWriteExt, io::BufWriter, net::TcpStream};

use super::{Event, FrameError};

/// Longest inbound line we will buffer before giving up on the peer.
const MAX_LINE_LEN: usize = 8 * 1024;

pub fn from_socket(socket: TcpStream) -> (ConnectionTx, ConnectionRx) {
    let (read_stream, write_stream) = socket.into_split();

    (
        ConnectionTx {
            write_stream: BufWriter::new(write_stream),
        },
        ConnectionRx {
            read_stream,
            buffer: BytesMut::with_capacity(64),
        },
    )
}

#[derive(Debug)]
pub struct ConnectionTx {
    write_stream: BufWriter<OwnedWriteHalf>,
}

pub struct ConnectionRx {
    read_stream: OwnedReadHalf,
    buffer: BytesMut,
}

impl ConnectionTx {
    /// Encode one event as a JSON object and flush it to the peer as a
    /// newline-terminated line.
    pub async fn write_event(&mut self, event: &Event) -> Result<(), FrameError> {
        let mut bytes = serde_json::to_vec(event)?;
        bytes.push(b'\n');
        self.write_stream.write_all(&bytes).await?;
        self.write_stream.flush().await?;
        Ok(())
    }
}

impl ConnectionRx {
    /// Read the next newline-terminated line from the peer.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection cleanly.
    pub async fn read_line(&mut self) -> Result<Option<String>, FrameError> {
        loop {
            if let Some(line) = self.parse_line()? {
                return Ok(Some(line));
            }

            if self.read_stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    // Remote closed Connection
                    return Ok(None);
                } else {
                    // Connection closed while still sending data
                    return Err(FrameError::ConnectionReset);
                }
            }
        }
    }

    fn parse_line(&mut self) -> Result<Option<String>, FrameError> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(idx) => {
                // Consume the line and its terminator from the buffer
                let line = self.buffer.split_to(idx + 1);
                Ok(Some(String::from_utf8_lossy(&line[..idx]).into_owned()))
            }
            None if self.buffer.len() > MAX_LINE_LEN => Err(FrameError::LineLength),
            None => Ok(None),
        }
    }
}
