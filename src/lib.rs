//! Async SMTP submission client, built on tokio.
//!
//! Drives one connection through greeting, EHLO, optional STARTTLS,
//! optional AUTH, one or more message transactions, and QUIT, following
//! [RFC 5321](https://tools.ietf.org/html/rfc5321). Designed to hand as
//! much sanity- and policy-checking as possible to the relay server it
//! submits to.
//!
//! It implements the following extensions:
//!
//! * PIPELINING ([RFC 2920](https://tools.ietf.org/html/rfc2920))
//! * SIZE ([RFC 1870](https://tools.ietf.org/html/rfc1870))
//! * 8BITMIME ([RFC 6152](https://tools.ietf.org/html/rfc6152))
//! * STARTTLS ([RFC 3207](https://tools.ietf.org/html/rfc3207))
//! * AUTH ([RFC 4954](https://tools.ietf.org/html/rfc4954)) with PLAIN, LOGIN and XOAUTH2
//! * DSN ([RFC 3461](https://tools.ietf.org/html/rfc3461))
//! * ENHANCEDSTATUSCODES ([RFC 2034](https://tools.ietf.org/html/rfc2034))
//! * DELIVERBY ([RFC 2852](https://tools.ietf.org/html/rfc2852))
//! * ETRN ([RFC 1985](https://tools.ietf.org/html/rfc1985)), optional, behind the `etrn` feature
//! * SMTPUTF8 ([RFC 6531](https://tools.ietf.org/html/rfc6531))

#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    missing_debug_implementations,
    clippy::unwrap_used
)]

pub mod authentication;
mod codec;
pub mod commands;
pub mod error;
pub mod extension;
pub mod message;
pub mod pipeline;
pub mod response;
pub mod session;
pub mod status;
pub mod stream;
pub mod transaction;
pub mod transport;
mod util;

pub use crate::error::{Error, SmtpResult};
pub use crate::message::{BodyKind, BodySource, BytesBody, EmailAddress, Envelope, HeaderTable};
pub use crate::session::{ClientSecurity, Session, SessionConfig};
pub use crate::status::{Classification, Status};
pub use crate::stream::SmtpStream;
pub use crate::transaction::{Message, Recipient};
