//! ESMTP capability set: client identifiers, the extensions a server can
//! advertise in its EHLO reply, and the per-command parameters those
//! extensions unlock.

use crate::authentication::Mechanism;
use crate::error::Error;
use crate::response::Response;
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Default client id, used if the local hostname cannot be read.
///
/// It passes `smtpd_helo_restrictions = reject_non_fqdn_helo_hostname`
/// on Postfix, but not `reject_unknown_helo_hostname`.
const DEFAULT_DOMAIN_CLIENT_ID: &str = "localhost.localdomain";

/// Client identifier, the parameter to `EHLO`/`HELO`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum ClientId {
    /// A fully-qualified domain name.
    Domain(String),
    /// An IPv4 address.
    Ipv4(Ipv4Addr),
    /// An IPv6 address.
    Ipv6(Ipv6Addr),
}

impl Default for ClientId {
    fn default() -> Self {
        Self::Ipv4(Ipv4Addr::new(127, 0, 0, 1))
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            ClientId::Domain(ref value) => f.write_str(value),
            ClientId::Ipv4(ref value) => write!(f, "[{}]", value),
            ClientId::Ipv6(ref value) => write!(f, "[IPv6:{}]", value),
        }
    }
}

impl ClientId {
    /// Creates a `ClientId` from a fully qualified domain name.
    pub fn new(domain: String) -> ClientId {
        ClientId::Domain(domain)
    }

    /// A `ClientId` built from the local hostname, or
    /// `localhost.localdomain` if it could not be read.
    pub fn hostname() -> ClientId {
        ClientId::Domain(
            hostname::get()
                .ok()
                .and_then(|s| s.into_string().ok())
                .unwrap_or_else(|| DEFAULT_DOMAIN_CLIENT_ID.to_string()),
        )
    }
}

/// Supported ESMTP keywords.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum Extension {
    /// PIPELINING, [RFC 2920](https://tools.ietf.org/html/rfc2920).
    Pipelining,
    /// 8BITMIME, [RFC 6152](https://tools.ietf.org/html/rfc6152).
    EightBitMime,
    /// SMTPUTF8, [RFC 6531](https://tools.ietf.org/html/rfc6531).
    SmtpUtfEight,
    /// STARTTLS, [RFC 3207](https://tools.ietf.org/html/rfc3207).
    StartTls,
    /// AUTH mechanism, [RFC 4954](https://tools.ietf.org/html/rfc4954).
    Authentication(Mechanism),
    /// DSN, [RFC 3461](https://tools.ietf.org/html/rfc3461).
    Dsn,
    /// ENHANCEDSTATUSCODES, [RFC 2034](https://tools.ietf.org/html/rfc2034).
    EnhancedStatusCodes,
    /// DELIVERBY, [RFC 2852](https://tools.ietf.org/html/rfc2852).
    DeliverBy,
    /// ETRN, [RFC 1985](https://tools.ietf.org/html/rfc1985).
    #[cfg(feature = "etrn")]
    Etrn,
    /// SIZE, [RFC 1870](https://tools.ietf.org/html/rfc1870). Carries the
    /// server's advertised maximum, if any (0 means no stated limit).
    Size,
}

impl Display for Extension {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Extension::Pipelining => write!(f, "PIPELINING"),
            Extension::EightBitMime => write!(f, "8BITMIME"),
            Extension::SmtpUtfEight => write!(f, "SMTPUTF8"),
            Extension::StartTls => write!(f, "STARTTLS"),
            Extension::Authentication(ref mechanism) => write!(f, "AUTH {}", mechanism),
            Extension::Dsn => write!(f, "DSN"),
            Extension::EnhancedStatusCodes => write!(f, "ENHANCEDSTATUSCODES"),
            Extension::DeliverBy => write!(f, "DELIVERBY"),
            #[cfg(feature = "etrn")]
            Extension::Etrn => write!(f, "ETRN"),
            Extension::Size => write!(f, "SIZE"),
        }
    }
}

/// What the server told us about itself in its EHLO reply.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerInfo {
    /// The name given in the greeting line of the EHLO reply.
    pub name: String,
    /// Extensions known to this crate that the server advertised.
    pub features: HashSet<Extension>,
    /// `SIZE` limit advertised by the server, if any.
    pub max_size: Option<usize>,
    /// Minimum `by-time` the server accepts for DELIVERBY, if advertised.
    pub deliver_by_min: Option<u32>,
}

impl Display for ServerInfo {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} with {}",
            self.name,
            if self.features.is_empty() {
                "no supported features".to_string()
            } else {
                format!("{:?}", self.features)
            }
        )
    }
}

impl ServerInfo {
    /// Parses the multiline EHLO reply into a `ServerInfo`. Unknown
    /// keywords are silently ignored, per spec: the capability set only
    /// tracks extensions this crate knows how to drive.
    pub fn from_response(response: &Response) -> Result<ServerInfo, Error> {
        let name = match response.first_word() {
            Some(name) => name,
            None => return Err(Error::ResponseParsing("could not read EHLO server name")),
        };

        let mut features: HashSet<Extension> = HashSet::new();
        let mut max_size = None;
        let mut deliver_by_min = None;

        for line in response.message.as_slice() {
            if line.is_empty() {
                continue;
            }

            let split: Vec<&str> = line.split_whitespace().collect();
            match split.first().copied() {
                Some("PIPELINING") => {
                    features.insert(Extension::Pipelining);
                }
                Some("8BITMIME") => {
                    features.insert(Extension::EightBitMime);
                }
                Some("SMTPUTF8") => {
                    features.insert(Extension::SmtpUtfEight);
                }
                Some("STARTTLS") => {
                    features.insert(Extension::StartTls);
                }
                Some("DSN") => {
                    features.insert(Extension::Dsn);
                }
                Some("ENHANCEDSTATUSCODES") => {
                    features.insert(Extension::EnhancedStatusCodes);
                }
                #[cfg(feature = "etrn")]
                Some("ETRN") => {
                    features.insert(Extension::Etrn);
                }
                Some("SIZE") => {
                    features.insert(Extension::Size);
                    max_size = split.get(1).and_then(|v| v.parse().ok());
                }
                Some("DELIVERBY") => {
                    features.insert(Extension::DeliverBy);
                    deliver_by_min = split.get(1).and_then(|v| v.parse().ok());
                }
                Some("AUTH") => {
                    for &mechanism in &split[1..] {
                        match mechanism {
                            "PLAIN" => {
                                features.insert(Extension::Authentication(Mechanism::Plain));
                            }
                            "LOGIN" => {
                                features.insert(Extension::Authentication(Mechanism::Login));
                            }
                            "XOAUTH2" => {
                                features.insert(Extension::Authentication(Mechanism::Xoauth2));
                            }
                            _ => (),
                        }
                    }
                }
                _ => (),
            };
        }

        Ok(ServerInfo {
            name: name.to_string(),
            features,
            max_size,
            deliver_by_min,
        })
    }

    pub fn supports_feature(&self, keyword: Extension) -> bool {
        self.features.contains(&keyword)
    }

    pub fn supports_auth_mechanism(&self, mechanism: Mechanism) -> bool {
        self.features
            .contains(&Extension::Authentication(mechanism))
    }
}

/// `RET` parameter value, DSN (RFC 3461 section 4.3).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum RetParameter {
    Full,
    Hdrs,
}

impl Display for RetParameter {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            RetParameter::Full => f.write_str("FULL"),
            RetParameter::Hdrs => f.write_str("HDRS"),
        }
    }
}

/// `NOTIFY` parameter value, DSN (RFC 3461 section 4.1).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum NotifyParameter {
    Never,
    Success,
    Failure,
    Delay,
}

impl Display for NotifyParameter {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            NotifyParameter::Never => f.write_str("NEVER"),
            NotifyParameter::Success => f.write_str("SUCCESS"),
            NotifyParameter::Failure => f.write_str("FAILURE"),
            NotifyParameter::Delay => f.write_str("DELAY"),
        }
    }
}

/// Address type tag carried by `ORCPT`, DSN (RFC 3461 section 4.4).
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum AddressType {
    Rfc822,
    Other(String),
}

impl Display for AddressType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            AddressType::Rfc822 => f.write_str("rfc822"),
            AddressType::Other(kind) => f.write_str(kind),
        }
    }
}

/// `BY` mode, DELIVERBY (RFC 2852 section 4).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ByMode {
    Notify,
    Return,
}

impl Display for ByMode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            ByMode::Notify => f.write_str("N"),
            ByMode::Return => f.write_str("R"),
        }
    }
}

/// A `MAIL FROM` extension parameter.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum MailParameter {
    /// `BODY=`
    Body(MailBodyParameter),
    /// `SIZE=`
    Size(usize),
    /// `SMTPUTF8`
    SmtpUtfEight,
    /// `RET=`, DSN.
    Ret(RetParameter),
    /// `ENVID=`, DSN.
    Envid(String),
    /// `BY=time;mode[trace]`, DELIVERBY. `mode == Return` requires
    /// `time > 0`, enforced by the transaction engine before the
    /// command is ever built.
    By {
        time: i32,
        mode: ByMode,
        trace: bool,
    },
    /// Unrecognized parameter, passed through as-is.
    Other {
        keyword: String,
        value: Option<String>,
    },
}

impl Display for MailParameter {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            MailParameter::Body(value) => write!(f, "BODY={}", value),
            MailParameter::Size(size) => write!(f, "SIZE={}", size),
            MailParameter::SmtpUtfEight => f.write_str("SMTPUTF8"),
            MailParameter::Ret(value) => write!(f, "RET={}", value),
            MailParameter::Envid(value) => write!(f, "ENVID={}", XText(value)),
            MailParameter::By { time, mode, trace } => {
                write!(f, "BY={};{}{}", time, mode, if *trace { "T" } else { "" })
            }
            MailParameter::Other {
                keyword,
                value: Some(value),
            } => write!(f, "{}={}", keyword, XText(value)),
            MailParameter::Other {
                keyword,
                value: None,
            } => f.write_str(keyword),
        }
    }
}

/// Values for the `BODY` parameter to `MAIL FROM`.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum MailBodyParameter {
    SevenBit,
    EightBitMime,
}

impl Display for MailBodyParameter {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            MailBodyParameter::SevenBit => f.write_str("7BIT"),
            MailBodyParameter::EightBitMime => f.write_str("8BITMIME"),
        }
    }
}

/// A `RCPT TO` extension parameter.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum RcptParameter {
    /// `NOTIFY=`, DSN.
    Notify(Vec<NotifyParameter>),
    /// `ORCPT=`, DSN.
    Orcpt(AddressType, String),
    /// Unrecognized parameter, passed through as-is.
    Other {
        keyword: String,
        value: Option<String>,
    },
}

impl Display for RcptParameter {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            RcptParameter::Notify(values) => {
                write!(f, "NOTIFY=")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", value)?;
                }
                Ok(())
            }
            RcptParameter::Orcpt(kind, addr) => write!(f, "ORCPT={};{}", kind, XText(addr)),
            RcptParameter::Other {
                keyword,
                value: Some(value),
            } => write!(f, "{}={}", keyword, XText(value)),
            RcptParameter::Other {
                keyword,
                value: None,
            } => f.write_str(keyword),
        }
    }
}

/// `xtext` encoding (RFC 3461 section 4): `+`, `=`, and CTLs become
/// `+XX` where `XX` is the uppercase hex byte.
struct XText<'a>(&'a str);

impl<'a> Display for XText<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for byte in self.0.bytes() {
            match byte {
                0x21..=0x2a | 0x2c..=0x3c | 0x3e..=0x7e => write!(f, "{}", byte as char)?,
                _ => write!(f, "+{:02X}", byte)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::{Category, Code, Detail, Severity};
    use std::collections::HashSet;

    #[test]
    fn test_clientid_fmt() {
        assert_eq!(
            format!("{}", ClientId::new("test".to_string())),
            "test".to_string()
        );
    }

    #[test]
    fn test_extension_fmt() {
        assert_eq!(format!("{}", Extension::Pipelining), "PIPELINING");
        assert_eq!(format!("{}", Extension::EightBitMime), "8BITMIME");
        assert_eq!(
            format!("{}", Extension::Authentication(Mechanism::Plain)),
            "AUTH PLAIN"
        );
        assert_eq!(format!("{}", Extension::Dsn), "DSN");
        assert_eq!(format!("{}", Extension::DeliverBy), "DELIVERBY");
    }

    #[test]
    fn test_serverinfo_from_response() {
        let response = Response::new(
            Code::new(
                Severity::PositiveCompletion,
                Category::Unspecified4,
                Detail::One,
            ),
            vec![
                "me".to_string(),
                "AUTH PLAIN XOAUTH2 OTHER".to_string(),
                "8BITMIME".to_string(),
                "SIZE 42".to_string(),
                "DSN".to_string(),
                "DELIVERBY 60".to_string(),
            ],
            None,
        );

        let server_info = ServerInfo::from_response(&response).unwrap();
        assert_eq!(server_info.name, "me");
        assert!(server_info.supports_feature(Extension::EightBitMime));
        assert!(server_info.supports_feature(Extension::Dsn));
        assert!(server_info.supports_feature(Extension::DeliverBy));
        assert!(server_info.supports_auth_mechanism(Mechanism::Plain));
        assert!(server_info.supports_auth_mechanism(Mechanism::Xoauth2));
        assert!(!server_info.supports_auth_mechanism(Mechanism::Login));
        assert_eq!(server_info.max_size, Some(42));
        assert_eq!(server_info.deliver_by_min, Some(60));
        assert!(!server_info.supports_feature(Extension::StartTls));
    }

    #[test]
    fn test_serverinfo_fmt() {
        let mut features = HashSet::new();
        features.insert(Extension::EightBitMime);
        let server_info = ServerInfo {
            name: "me".to_string(),
            features,
            ..Default::default()
        };
        assert_eq!(
            format!("{}", server_info),
            "me with {EightBitMime}".to_string()
        );
    }

    #[test]
    fn test_mail_parameter_fmt() {
        assert_eq!(
            format!("{}", MailParameter::Body(MailBodyParameter::EightBitMime)),
            "BODY=8BITMIME"
        );
        assert_eq!(format!("{}", MailParameter::Size(42)), "SIZE=42");
        assert_eq!(
            format!("{}", MailParameter::Ret(RetParameter::Full)),
            "RET=FULL"
        );
        assert_eq!(
            format!("{}", MailParameter::Envid("abc+1".to_string())),
            "ENVID=abc+2B1"
        );
        assert_eq!(
            format!(
                "{}",
                MailParameter::By {
                    time: 3600,
                    mode: ByMode::Return,
                    trace: true,
                }
            ),
            "BY=3600;RT"
        );
    }

    #[test]
    fn test_rcpt_parameter_fmt() {
        assert_eq!(
            format!(
                "{}",
                RcptParameter::Notify(vec![NotifyParameter::Success, NotifyParameter::Delay])
            ),
            "NOTIFY=SUCCESS,DELAY"
        );
        assert_eq!(
            format!(
                "{}",
                RcptParameter::Orcpt(AddressType::Rfc822, "user@example.com".to_string())
            ),
            "ORCPT=rfc822;user@example.com"
        );
    }
}
