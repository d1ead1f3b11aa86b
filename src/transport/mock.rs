//! An in-memory transport double for tests: separate read and write
//! cursors, with helpers to feed canned server replies and inspect
//! what the client wrote.

use pin_project::pin_project;
use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};

pub type MockCursor = Cursor<Vec<u8>>;

#[pin_project]
#[derive(Clone, Debug, Default)]
pub struct MockStream {
    #[pin]
    reader: MockCursor,
    #[pin]
    writer: MockCursor,
}

impl MockStream {
    pub fn new() -> MockStream {
        MockStream::default()
    }

    pub fn with_vec(vec: Vec<u8>) -> MockStream {
        MockStream {
            reader: MockCursor::new(vec),
            writer: MockCursor::new(Vec::new()),
        }
    }

    /// Drains and returns everything written so far.
    pub fn take_vec(&mut self) -> Vec<u8> {
        let vec = self.writer.get_ref().to_vec();
        self.writer.set_position(0);
        self.writer.get_mut().clear();
        vec
    }

    /// Queues up the next bytes to be read, replacing whatever was
    /// queued before.
    pub fn next_vec(&mut self, vec: &[u8]) {
        let cursor = &mut self.reader;
        cursor.set_position(0);
        cursor.get_mut().clear();
        cursor.get_mut().extend_from_slice(vec);
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().reader.poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.project().writer.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        self.project().writer.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        self.project().writer.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_take_test() {
        let mut mock = MockStream::new();
        mock.write_all(&[1, 2, 3]).await.unwrap();
        assert_eq!(mock.take_vec(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn read_with_vec_test() {
        let mut mock = MockStream::with_vec(vec![4, 5]);
        let mut vec = Vec::new();
        mock.read_to_end(&mut vec).await.unwrap();
        assert_eq!(vec, vec![4, 5]);
    }
}
