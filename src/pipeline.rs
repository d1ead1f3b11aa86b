//! Command pipeline (spec component C6): a FIFO of pending commands,
//! flushed either one at a time (serial mode) or as a batch whose
//! replies are drained in issue order (pipelined mode), per the
//! RFC 2920 rules cited in spec §4.6.
//!
//! This module only implements the MAIL/RCPT batch the transaction
//! engine needs — `EHLO`, `DATA`, `STARTTLS`, `AUTH`, `QUIT` are
//! synchronization points by construction and go straight through
//! `SmtpStream::command`, never through here.

use crate::error::{Error, SmtpResult};
use crate::stream::SmtpStream;
use std::fmt::Display;
use tokio::io::{AsyncRead as Read, AsyncWrite as Write};

/// A FIFO of commands queued for one pipelined (or serial) batch.
pub struct Pipeline {
    pipelined: bool,
    commands: Vec<String>,
}

impl Pipeline {
    /// `pipelined` should be true only when both the client wants
    /// pipelining and the server advertised PIPELINING; otherwise
    /// every command in the batch becomes its own synchronization
    /// point (spec §4.6, "when pipelining is not advertised, all
    /// commands are synchronization points").
    pub fn new(pipelined: bool) -> Pipeline {
        Pipeline {
            pipelined,
            commands: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, command: impl Display) {
        self.commands.push(command.to_string());
    }

    /// Flushes the queue and returns one result per enqueued command,
    /// in issue order (spec P3).
    pub async fn flush<S: Read + Write + Unpin>(
        self,
        stream: &mut SmtpStream<S>,
    ) -> Result<Vec<SmtpResult>, Error> {
        if self.commands.is_empty() {
            return Ok(Vec::new());
        }

        if self.pipelined {
            for command in &self.commands {
                stream.send_command(RawCommand(command)).await?;
            }
            let mut responses = Vec::with_capacity(self.commands.len());
            for _ in &self.commands {
                responses.push(stream.read_response().await);
            }
            Ok(responses)
        } else {
            let mut responses = Vec::with_capacity(self.commands.len());
            for command in &self.commands {
                responses.push(stream.command(RawCommand(command)).await);
            }
            Ok(responses)
        }
    }
}

struct RawCommand<'a>(&'a str);

impl<'a> Display for RawCommand<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::mock::MockStream;

    #[tokio::test]
    async fn test_pipelined_flush_matches_responses_in_order() {
        let mut mock = MockStream::new();
        mock.next_vec(b"250 2.1.0 Sender OK\r\n250 2.1.5 Recipient OK\r\n250 2.1.5 Recipient OK\r\n");
        let mut stream = SmtpStream::new(mock);

        let mut pipeline = Pipeline::new(true);
        pipeline.enqueue("MAIL FROM:<a@example.org>\r\n");
        pipeline.enqueue("RCPT TO:<b@example.org>\r\n");
        pipeline.enqueue("RCPT TO:<c@example.org>\r\n");

        let responses = pipeline.flush(&mut stream).await.unwrap();
        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_serial_flush_one_roundtrip_per_command() {
        let mut mock = MockStream::new();
        mock.next_vec(b"250 ok\r\n");
        let mut stream = SmtpStream::new(mock);

        let mut pipeline = Pipeline::new(false);
        pipeline.enqueue("NOOP\r\n");
        let responses = pipeline.flush(&mut stream).await.unwrap();
        assert_eq!(responses.len(), 1);
    }
}
