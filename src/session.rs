//! Session engine (spec component C9): drives one connection through
//! greeting, EHLO, optional STARTTLS, optional AUTH, one or more
//! transactions, and QUIT, owning error classification and the abort
//! policy for the whole run.

use crate::authentication::{Credentials, Mechanism};
use crate::commands::{AuthCancelCommand, QuitCommand, StarttlsCommand};
use crate::error::Error;
use crate::extension::{ClientId, Extension, ServerInfo};
use crate::status::Status;
use crate::stream::SmtpStream;
use crate::transaction::{self, Message};
use crate::transport::net::{ClientTlsParameters, Connector, NetworkStream};
use async_native_tls::TlsConnector;
use log::{debug, info};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio::time::timeout;

/// How STARTTLS is applied during the session (§4.9).
#[derive(Clone, Debug)]
pub enum ClientSecurity {
    /// Never attempt STARTTLS.
    None,
    /// Use STARTTLS if the server advertises it; continue in
    /// cleartext if it does not, or if the server refuses the
    /// STARTTLS command outright. A handshake failure *after* a 220
    /// reply aborts the session — by then the underlying connection
    /// has already been consumed by the failed TLS attempt and is no
    /// longer usable in cleartext.
    Opportunistic(TlsConnector),
    /// STARTTLS must succeed or the session aborts with local-error.
    Required(TlsConnector),
}

/// Session configuration, built once and handed to `Session::new`.
/// Mirrors the "Application API" surface of spec §6: plain builder
/// methods, each mutation growing the required-extensions mask.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    host: String,
    port: u16,
    hello_name: ClientId,
    smtp_utf8: bool,
    pipelining: bool,
    credentials: Option<(Credentials, Vec<Mechanism>)>,
    reply_deadline: Duration,
    required: HashSet<Extension>,
}

impl SessionConfig {
    /// `host[:service]`, defaulting the service to the submission
    /// port 587, per spec §6.
    pub fn new(host: impl Into<String>) -> SessionConfig {
        SessionConfig {
            host: host.into(),
            port: 587,
            hello_name: ClientId::hostname(),
            smtp_utf8: false,
            pipelining: true,
            credentials: None,
            reply_deadline: Duration::from_secs(60),
            required: HashSet::new(),
        }
    }

    pub fn port(mut self, port: u16) -> SessionConfig {
        self.port = port;
        self
    }

    pub fn hello_name(mut self, hello_name: ClientId) -> SessionConfig {
        self.hello_name = hello_name;
        self
    }

    pub fn smtp_utf8(mut self, enabled: bool) -> SessionConfig {
        self.smtp_utf8 = enabled;
        if enabled {
            self.required.insert(Extension::SmtpUtfEight);
        }
        self
    }

    pub fn pipelining(mut self, enabled: bool) -> SessionConfig {
        self.pipelining = enabled;
        self
    }

    pub fn reply_deadline(mut self, deadline: Duration) -> SessionConfig {
        self.reply_deadline = deadline;
        self
    }

    /// Configures AUTH; adds `Authentication` to the required-
    /// extensions mask only implicitly, through `try_auth`'s mechanism
    /// lookup — a server that advertises none of `mechanisms` simply
    /// skips authentication (mirrors the teacher's `try_login`).
    pub fn credentials(mut self, credentials: Credentials, mechanisms: Vec<Mechanism>) -> SessionConfig {
        self.credentials = Some((credentials, mechanisms));
        self
    }

    /// Marks an extension as required: the session aborts with
    /// protocol-error if the server never advertises it (spec §3(ii),
    /// §4.9 "Required-extensions check").
    pub fn require(mut self, extension: Extension) -> SessionConfig {
        self.required.insert(extension);
        self
    }
}

/// Why a STARTTLS attempt failed, distinguishing a still-usable
/// connection from one the failed handshake already consumed.
#[derive(Debug)]
enum StartTlsFailure {
    Refused(Error),
    HandshakeFailed(Error),
}

/// Drives the connection described by a `SessionConfig` through its
/// whole lifecycle exactly once.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    security: ClientSecurity,
    pub status: Status,
}

impl Session {
    pub fn new(config: SessionConfig, security: ClientSecurity) -> Session {
        Session {
            config,
            security,
            status: Status::pending(),
        }
    }

    /// Runs the whole session once: connect, greeting, EHLO, optional
    /// STARTTLS + re-EHLO, optional AUTH, the required-extensions
    /// check, every message in `messages`, then QUIT. Per-recipient
    /// and per-message failures are recorded as status on `messages`
    /// and do not make this function return `Err`; only connection-
    /// and protocol-level failures do, after which `self.status`
    /// already reflects the abort reason.
    pub async fn run(&mut self, messages: &mut [Message]) -> Result<(), Error> {
        let addr = self.resolve().await?;
        let net_stream = NetworkStream::connect(&addr).await.map_err(Error::Io)?;
        let mut stream = SmtpStream::new(net_stream);

        if let Err(err) = self.greeting(&mut stream).await {
            self.status = Status::local_error(&err.to_string());
            return Err(err);
        }

        let mut server_info = match self.ehlo(&mut stream).await {
            Ok(info) => info,
            Err(err) => {
                self.status = Status::local_error(&err.to_string());
                return Err(err);
            }
        };

        match &self.security {
            ClientSecurity::None => {}
            ClientSecurity::Opportunistic(connector) => {
                if server_info.supports_feature(Extension::StartTls) {
                    match self.starttls(&mut stream, connector).await {
                        Ok(upgraded) => {
                            stream = upgraded;
                            server_info = self.ehlo(&mut stream).await?;
                        }
                        Err(StartTlsFailure::Refused(err)) => {
                            debug!("opportunistic STARTTLS refused, continuing in cleartext: {}", err);
                        }
                        Err(StartTlsFailure::HandshakeFailed(err)) => {
                            // The connection was consumed by the failed handshake attempt;
                            // there is no cleartext connection left to fall back to.
                            self.status = Status::local_error(&err.to_string());
                            self.quit(&mut stream).await;
                            return Err(err);
                        }
                    }
                }
            }
            ClientSecurity::Required(connector) => {
                if !server_info.supports_feature(Extension::StartTls) {
                    self.status = Status::local_error("server does not support mandatory STARTTLS");
                    self.quit(&mut stream).await;
                    return Err(Error::Protocol("STARTTLS required but not advertised"));
                }
                match self.starttls(&mut stream, connector).await {
                    Ok(upgraded) => {
                        stream = upgraded;
                        server_info = self.ehlo(&mut stream).await?;
                    }
                    Err(StartTlsFailure::Refused(err) | StartTlsFailure::HandshakeFailed(err)) => {
                        self.status = Status::local_error(&err.to_string());
                        self.quit(&mut stream).await;
                        return Err(err);
                    }
                }
            }
        }

        if let Some((credentials, mechanisms)) = self.config.credentials.clone() {
            if let Some(mechanism) = mechanisms
                .iter()
                .find(|m| server_info.supports_auth_mechanism(**m))
            {
                if let Err(err) = self.auth(&mut stream, *mechanism, &credentials).await {
                    self.status = Status::local_error(&err.to_string());
                    self.quit(&mut stream).await;
                    return Err(err);
                }
                server_info = self.ehlo(&mut stream).await?;
            } else {
                info!("no supported authentication mechanism advertised by server");
            }
        }

        let missing: Vec<Extension> = self
            .config
            .required
            .iter()
            .filter(|ext| !server_info.supports_feature(**ext))
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.status = Status::protocol_error("a required extension was not advertised by the server");
            self.quit(&mut stream).await;
            return Err(Error::Protocol("required extension not available"));
        }

        for message in messages.iter_mut() {
            transaction::run_transaction(
                &mut stream,
                &server_info,
                self.config.pipelining,
                self.config.smtp_utf8,
                self.config.hello_name.to_string().as_str(),
                message,
            )
            .await?;
        }

        self.status = Status::from_response(&self.quit(&mut stream).await.unwrap_or_else(|_| {
            crate::response::Response::new(
                crate::response::Code::new(
                    crate::response::Severity::PositiveCompletion,
                    crate::response::Category::MailSystem,
                    crate::response::Detail::Zero,
                ),
                vec!["closed".to_string()],
                None,
            )
        }));
        Ok(())
    }

    /// ETRN (RFC 1985): a standalone entry point, not part of the
    /// main TRANSACT loop (spec §1 calls it out as optional).
    #[cfg(feature = "etrn")]
    pub async fn etrn(&mut self, domain: &str) -> Result<crate::response::Response, Error> {
        let addr = self.resolve().await?;
        let net_stream = NetworkStream::connect(&addr).await.map_err(Error::Io)?;
        let mut stream = SmtpStream::new(net_stream);
        self.greeting(&mut stream).await?;
        self.ehlo(&mut stream).await?;
        let response = stream
            .command(crate::commands::EtrnCommand::new(domain.to_string()))
            .await;
        self.quit(&mut stream).await;
        response
    }

    async fn resolve(&self) -> Result<SocketAddr, Error> {
        lookup_host((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|_| Error::Resolution)?
            .next()
            .ok_or(Error::Resolution)
    }

    async fn greeting(&mut self, stream: &mut SmtpStream<NetworkStream>) -> Result<(), Error> {
        let greeting = timeout(self.config.reply_deadline, stream.read_response())
            .await
            .map_err(|_| Error::Timeout)??;
        if !greeting.has_code(220) {
            return Err(Error::Protocol("server did not send a 220 greeting"));
        }
        Ok(())
    }

    async fn ehlo(&mut self, stream: &mut SmtpStream<NetworkStream>) -> Result<ServerInfo, Error> {
        let response = stream.ehlo(self.config.hello_name.clone()).await;
        let response = match response {
            Ok(r) => r,
            Err(Error::Permanent(_)) => {
                stream
                    .command(crate::commands::EhloCommand::new(self.config.hello_name.clone()))
                    .await?
            }
            Err(err) => return Err(err),
        };
        ServerInfo::from_response(&response)
    }

    /// Attempts the STARTTLS upgrade. The server's command is issued
    /// over `stream` unchanged; only once a 220 reply is seen is the
    /// underlying connection handed to the TLS connector, which
    /// consumes it whether or not the handshake succeeds. Callers must
    /// therefore distinguish `Refused` (the original connection is
    /// still intact, safe to keep using in cleartext) from
    /// `HandshakeFailed` (the connection is gone).
    async fn starttls(
        &mut self,
        stream: &mut SmtpStream<NetworkStream>,
        connector: &TlsConnector,
    ) -> Result<SmtpStream<NetworkStream>, StartTlsFailure> {
        let response = stream
            .command(StarttlsCommand)
            .await
            .map_err(StartTlsFailure::Refused)?;
        if !response.has_code(220) {
            return Err(StartTlsFailure::Refused(Error::Protocol("server refused STARTTLS")));
        }
        let raw = std::mem::replace(stream, SmtpStream::new(NetworkStream::Mock(Default::default())))
            .into_inner();
        let tls_parameters = ClientTlsParameters::new(self.config.host.clone(), connector.clone());
        let upgraded = raw
            .upgrade_tls(&tls_parameters)
            .await
            .map_err(|err| StartTlsFailure::HandshakeFailed(Error::Io(err)))?;
        Ok(SmtpStream::new(upgraded))
    }

    async fn auth(
        &mut self,
        stream: &mut SmtpStream<NetworkStream>,
        mechanism: Mechanism,
        credentials: &Credentials,
    ) -> Result<(), Error> {
        let mut challenges = 10;
        let mut response = stream
            .command(crate::commands::AuthCommand::new(mechanism, credentials.clone(), None)?)
            .await?;

        while challenges > 0 && response.has_code(334) {
            challenges -= 1;
            let command = match crate::commands::AuthCommand::new_from_response(
                mechanism,
                credentials.clone(),
                &response,
            ) {
                Ok(command) => command,
                Err(err) => {
                    // RFC 4954 §4: a malformed challenge or a SASL-side error
                    // must still be answered with the cancellation line before
                    // the exchange is abandoned.
                    stream.command(AuthCancelCommand).await.ok();
                    return Err(err);
                }
            };
            response = stream.command(command).await?;
        }

        if challenges == 0 {
            return Err(Error::ResponseParsing("unexpected number of AUTH challenges"));
        }
        if !response.has_code(235) {
            return Err(Error::Protocol("authentication did not succeed"));
        }
        Ok(())
    }

    async fn quit(
        &mut self,
        stream: &mut SmtpStream<NetworkStream>,
    ) -> Result<crate::response::Response, Error> {
        stream.command(QuitCommand).await
    }
}
