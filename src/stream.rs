//! Line I/O (spec component C2): CRLF-terminated reads and writes
//! over a pluggable transport, with the wire-level debug tracing
//! every consumer of this crate inherits for free.

use std::fmt::Display;

use log::debug;

use crate::codec::ClientCodec;
use crate::commands::*;
use crate::error::{Error, SmtpResult};
use crate::extension::ClientId;
use crate::response::parse_response;
use crate::util::escape_crlf;

use tokio::io::{
    AsyncBufReadExt, AsyncRead as Read, AsyncReadExt, AsyncWrite as Write, AsyncWriteExt, BufReader,
};

/// A buffered line-oriented wrapper over any `AsyncRead + AsyncWrite`
/// transport.
#[derive(Debug)]
pub struct SmtpStream<S: Read + Write + Unpin> {
    inner: BufReader<S>,
}

impl<S: Read + Write + Unpin> SmtpStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::new(stream),
        }
    }

    /// Returns the inner stream. Should only be called when there are
    /// no unread responses pending, since the `BufReader`'s read-ahead
    /// buffer is discarded.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }

    pub async fn ehlo(&mut self, client_id: ClientId) -> SmtpResult {
        self.command(EhloCommand::new(client_id)).await
    }

    /// Writes a command and waits for its response — a synchronization
    /// point.
    pub async fn command(&mut self, command: impl Display) -> SmtpResult {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Writes a command without waiting for its response, for use
    /// inside a pipelined batch.
    pub async fn send_command(&mut self, command: impl Display) -> Result<(), Error> {
        self.write(command.to_string().as_bytes()).await?;
        Ok(())
    }

    async fn write(&mut self, string: &[u8]) -> Result<(), Error> {
        self.inner.get_mut().write_all(string).await?;
        self.inner.get_mut().flush().await?;
        debug!(">> {}", escape_crlf(String::from_utf8_lossy(string).as_ref()));
        Ok(())
    }

    /// Reads one reply off the wire, accumulating continuation lines
    /// until a line with a space (not a hyphen) after the code marks
    /// the end (spec §4.1).
    pub async fn read_response(&mut self) -> SmtpResult {
        let mut buffer = String::with_capacity(128);

        loop {
            let mut line = String::with_capacity(128);
            let read = self.inner.read_line(&mut line).await?;
            if read == 0 {
                return Err(Error::Protocol("connection closed while reading a reply"));
            }
            debug!("<< {}", escape_crlf(&line));

            let is_final = line
                .as_bytes()
                .get(3)
                .map(|&b| b == b' ')
                .unwrap_or(false);

            buffer.push_str(&line);

            if is_final {
                break;
            }
        }

        match parse_response(buffer.as_bytes()) {
            Ok((_, response)) => {
                if response.is_positive() {
                    Ok(response)
                } else {
                    Err(response.into())
                }
            }
            Err(_) => Err(Error::ResponseParsing("malformed SMTP reply")),
        }
    }

    /// Streams `message` as the DATA payload, dot-stuffed, then reads
    /// the final response.
    pub(crate) async fn message<T: Read + Unpin>(&mut self, message: T) -> SmtpResult {
        let mut codec = ClientCodec::new();
        let mut message_reader = BufReader::new(message);
        let mut message_bytes = Vec::new();
        message_reader.read_to_end(&mut message_bytes).await?;

        codec.encode(&message_bytes, self.inner.get_mut()).await?;
        codec.encode(&[], self.inner.get_mut()).await?;
        self.inner.get_mut().flush().await?;

        self.read_response().await
    }
}
