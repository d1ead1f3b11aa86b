//! Network transport: a plain TCP stream that can be upgraded to TLS
//! in place (spec component C3).

use super::mock::MockStream;
use async_native_tls::{TlsConnector, TlsStream};
use async_trait::async_trait;
use pin_project::pin_project;
use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Parameters for a TLS handshake: the connector to use and the
/// server name to validate the certificate against.
pub struct ClientTlsParameters {
    pub connector: TlsConnector,
    pub domain: String,
}

impl fmt::Debug for ClientTlsParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientTlsParameters")
            .field("domain", &self.domain)
            .finish()
    }
}

impl ClientTlsParameters {
    pub fn new(domain: String, connector: TlsConnector) -> ClientTlsParameters {
        ClientTlsParameters { connector, domain }
    }
}

/// The underlying byte stream: plain TCP, TLS-wrapped TCP (after
/// STARTTLS or for an implicit-TLS connection), or the in-memory
/// mock used by tests.
#[pin_project(project = NetworkStreamProj)]
pub enum NetworkStream {
    Tcp(#[pin] TcpStream),
    Tls(#[pin] TlsStream<TcpStream>),
    Mock(#[pin] MockStream),
}

impl NetworkStream {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            NetworkStream::Tcp(s) => s.peer_addr(),
            NetworkStream::Tls(s) => s.get_ref().peer_addr(),
            NetworkStream::Mock(_) => Ok(SocketAddr::from(([127, 0, 0, 1], 0))),
        }
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        match self {
            NetworkStream::Tcp(s) => s.shutdown().await,
            NetworkStream::Tls(s) => s.get_mut().shutdown().await,
            NetworkStream::Mock(_) => Ok(()),
        }
    }
}

impl AsyncRead for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Mock(s) => s.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NetworkStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Mock(s) => s.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_flush(cx),
            NetworkStreamProj::Tls(s) => s.poll_flush(cx),
            NetworkStreamProj::Mock(s) => s.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_shutdown(cx),
            NetworkStreamProj::Tls(s) => s.poll_shutdown(cx),
            NetworkStreamProj::Mock(s) => s.poll_shutdown(cx),
        }
    }
}

/// Connect and TLS-upgrade operations, abstracted so the session
/// engine does not need to know which variant it is driving.
#[async_trait]
pub trait Connector: Sized {
    async fn connect(addr: &SocketAddr) -> io::Result<Self>;
    async fn upgrade_tls(self, tls_parameters: &ClientTlsParameters) -> io::Result<Self>;
    fn is_encrypted(&self) -> bool;
}

#[async_trait]
impl Connector for NetworkStream {
    async fn connect(addr: &SocketAddr) -> io::Result<NetworkStream> {
        Ok(NetworkStream::Tcp(TcpStream::connect(addr).await?))
    }

    async fn upgrade_tls(self, tls_parameters: &ClientTlsParameters) -> io::Result<Self> {
        match self {
            NetworkStream::Tcp(stream) => {
                let tls_stream = tls_parameters
                    .connector
                    .connect(&tls_parameters.domain, stream)
                    .await
                    .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
                Ok(NetworkStream::Tls(tls_stream))
            }
            NetworkStream::Tls(_) => Ok(self),
            NetworkStream::Mock(_) => Ok(self),
        }
    }

    fn is_encrypted(&self) -> bool {
        matches!(self, NetworkStream::Tls(_))
    }
}
