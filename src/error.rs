//! Error and result types for the submission engine.

use crate::response::{Response, Severity};
use base64::DecodeError;
use std::io;
use std::string::FromUtf8Error;

/// An enum of all error kinds produced while running a session.
///
/// `Transient` and `Permanent` are per-reply outcomes (4xx/5xx) that
/// get attached to the recipient, message, or session level depending
/// on which command produced them. `Protocol`, `Local` and `Cancelled`
/// abort the whole session. `InvalidArgument` is returned synchronously
/// from builder methods instead of being routed through a thread-local
/// slot, as a C library would do.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Transient SMTP error, 4xx reply code.
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    #[error("transient: {}", if .0.message.is_empty() { "undetailed transient error during SMTP transaction".to_string() } else { .0.message.join("; ") })]
    Transient(Response),
    /// Permanent SMTP error, 5xx reply code.
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    #[error("permanent: {}", if .0.message.is_empty() { "undetailed permanent error during SMTP transaction".to_string() } else { .0.message.join("; ") })]
    Permanent(Response),
    /// A reply could not be parsed, or a required extension was not
    /// advertised by the server. The session aborts.
    #[error("protocol: {0}")]
    Protocol(&'static str),
    /// Error parsing a response line.
    #[error("response parsing: {0}")]
    ResponseParsing(&'static str),
    /// Error decoding a base64 challenge/response during AUTH.
    #[error("challenge parsing: {0}")]
    ChallengeParsing(#[from] DecodeError),
    /// Error decoding UTF-8 in a response or challenge.
    #[error("utf8: {0}")]
    Utf8Parsing(#[from] FromUtf8Error),
    /// Internal client-side error not caused by the server.
    #[error("client: {0}")]
    Client(&'static str),
    /// An argument passed to a builder method was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// DNS resolution error.
    #[error("could not resolve hostname")]
    Resolution,
    /// IO error (includes socket and handshake failures).
    #[error("io: {0}")]
    Io(#[from] io::Error),
    /// TLS error, raised by STARTTLS or a wrapper connection.
    #[error("tls: {0}")]
    Tls(#[from] async_native_tls::Error),
    /// No reply arrived before the configured deadline.
    #[error("timeout waiting for a reply")]
    Timeout,
    /// The session was aborted by a monitor callback.
    #[error("cancelled")]
    Cancelled,
    /// No stream is available (called before connect, or after close).
    #[error("no connection established")]
    NoStream,
    /// EHLO has not been run yet, so no server capabilities are known.
    #[error("no server info available")]
    NoServerInfo,
}

impl From<Response> for Error {
    fn from(response: Response) -> Error {
        match response.code.severity {
            Severity::TransientNegativeCompletion => Error::Transient(response),
            Severity::PermanentNegativeCompletion => Error::Permanent(response),
            _ => Error::Client("unexpected non-failure reply routed to error conversion"),
        }
    }
}

impl From<&'static str> for Error {
    fn from(string: &'static str) -> Error {
        Error::Client(string)
    }
}

/// Result of issuing one SMTP command.
pub type SmtpResult = Result<Response, Error>;

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::{Category, Code, Detail, Severity};

    #[test]
    fn test_error_response_to_string() {
        let err = Error::Permanent(Response::new(
            Code::new(
                Severity::PermanentNegativeCompletion,
                Category::Information,
                Detail::Zero,
            ),
            vec!["mailbox unavailable".to_string(), "no such user".to_string()],
            None,
        ));
        assert_eq!(
            format!("{}", err),
            "permanent: mailbox unavailable; no such user"
        );
    }

    #[test]
    fn test_error_response_empty_message() {
        let err = Error::Transient(Response::new(
            Code::new(
                Severity::TransientNegativeCompletion,
                Category::Connections,
                Detail::One,
            ),
            vec![],
            None,
        ));
        assert_eq!(
            format!("{}", err),
            "transient: undetailed transient error during SMTP transaction"
        );
    }
}
