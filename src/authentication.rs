//! Authentication driver: SASL mechanisms usable over `AUTH`
//! ([RFC 4954](https://tools.ietf.org/html/rfc4954)).
//!
//! Each `Mechanism` knows how to turn a `Credentials` pair (plus,
//! for challenge-response mechanisms, the server's decoded challenge)
//! into the next response to send. The session engine drives the
//! challenge loop; this module only computes one step of it at a time.

use crate::error::Error;
use std::fmt::{self, Display, Formatter};

/// A username/password pair. Mechanisms that need more than this
/// (e.g. a bearer token for XOAUTH2) are passed the token in `password`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Credentials {
    authcid: String,
    authzid: String,
    password: String,
}

impl Credentials {
    /// Creates a `Credentials` with no separate authorization identity
    /// (`authcid` is reused as `authzid`, the common case).
    pub fn new(authcid: String, password: String) -> Credentials {
        Credentials {
            authzid: String::new(),
            authcid,
            password,
        }
    }

    /// Creates a `Credentials` with a distinct authorization identity,
    /// for PLAIN's `authzid` field.
    pub fn new_with_authzid(authzid: String, authcid: String, password: String) -> Credentials {
        Credentials {
            authzid,
            authcid,
            password,
        }
    }
}

/// SASL mechanisms this driver can perform.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum Mechanism {
    /// [RFC 4616](https://tools.ietf.org/html/rfc4616)
    Plain,
    /// Non-standard but near-universally supported two-step mechanism.
    Login,
    /// Google/Microsoft OAuth2 bridge, used the same way PLAIN is.
    Xoauth2,
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Mechanism::Plain => write!(f, "PLAIN"),
            Mechanism::Login => write!(f, "LOGIN"),
            Mechanism::Xoauth2 => write!(f, "XOAUTH2"),
        }
    }
}

impl Mechanism {
    /// Whether the client can send its first response inline on the
    /// `AUTH` command line, instead of waiting for a 334 challenge.
    pub fn supports_initial_response(&self) -> bool {
        match *self {
            Mechanism::Plain | Mechanism::Xoauth2 => true,
            Mechanism::Login => false,
        }
    }

    /// Computes the next response to send given an optional decoded
    /// challenge from the server. `challenge` is `None` only for the
    /// initial response of a mechanism that supports one.
    pub fn response(
        &self,
        credentials: &Credentials,
        challenge: Option<&str>,
    ) -> Result<String, Error> {
        match *self {
            Mechanism::Plain => match challenge {
                Some(_) => Err(Error::Client("PLAIN does not accept a server challenge")),
                None => Ok(format!(
                    "{}\u{0}{}\u{0}{}",
                    credentials.authzid, credentials.authcid, credentials.password
                )),
            },
            Mechanism::Login => match challenge {
                Some(challenge) => {
                    if challenge.to_lowercase().starts_with("username") {
                        Ok(credentials.authcid.clone())
                    } else if challenge.to_lowercase().starts_with("password") {
                        Ok(credentials.password.clone())
                    } else {
                        Err(Error::Client("unrecognized LOGIN challenge"))
                    }
                }
                None => Err(Error::Client("LOGIN requires a server challenge")),
            },
            Mechanism::Xoauth2 => match challenge {
                Some(_) => Err(Error::Client("XOAUTH2 does not accept a server challenge")),
                None => Ok(format!(
                    "user={}\u{1}auth=Bearer {}\u{1}\u{1}",
                    credentials.authcid, credentials.password
                )),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_plain_response() {
        let credentials = Credentials::new("user".to_string(), "password".to_string());
        assert_eq!(
            Mechanism::Plain.response(&credentials, None).unwrap(),
            "\u{0}user\u{0}password"
        );
    }

    #[test]
    fn test_login_response() {
        let credentials = Credentials::new("user".to_string(), "password".to_string());
        assert_eq!(
            Mechanism::Login
                .response(&credentials, Some("Username:"))
                .unwrap(),
            "user"
        );
        assert_eq!(
            Mechanism::Login
                .response(&credentials, Some("Password:"))
                .unwrap(),
            "password"
        );
        assert!(Mechanism::Login.response(&credentials, None).is_err());
    }

    #[test]
    fn test_xoauth2_response() {
        let credentials = Credentials::new("user@example.com".to_string(), "token".to_string());
        assert_eq!(
            Mechanism::Xoauth2.response(&credentials, None).unwrap(),
            "user=user@example.com\u{1}auth=Bearer token\u{1}\u{1}"
        );
    }

    #[test]
    fn test_supports_initial_response() {
        assert!(Mechanism::Plain.supports_initial_response());
        assert!(Mechanism::Xoauth2.supports_initial_response());
        assert!(!Mechanism::Login.supports_initial_response());
    }
}
