//! Structured status recorded on the session, each message, and each
//! recipient (spec component C10).

use crate::response::{EnhancedStatusCode, Response, Severity};
use std::fmt::{self, Display, Formatter};

/// Broad classification of a `Status`, independent of the exact code.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Classification {
    /// Not yet evaluated.
    Pending,
    /// 2xx, command succeeded.
    Ok,
    /// 4xx, or no reply within the configured deadline.
    TransientFailure,
    /// 5xx.
    PermanentFailure,
    /// Malformed reply, or a required extension was not advertised.
    ProtocolError,
    /// DNS, socket, or TLS handshake failure.
    LocalError,
}

/// A `(code, enhanced status, text, classification)` tuple. Every
/// recipient, message, and session ends a completed run with exactly
/// one of these. Default is `Classification::Pending` with no code.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Status {
    pub code: Option<u16>,
    pub enhanced_code: Option<EnhancedStatusCode>,
    pub text: Vec<String>,
    pub classification: Classification,
}

impl Default for Classification {
    fn default() -> Self {
        Classification::Pending
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} {:?}: {}", code, self.classification, self.summary()),
            None => write!(f, "{:?}", self.classification),
        }
    }
}

impl Status {
    pub fn pending() -> Status {
        Status::default()
    }

    /// Builds a `Status` from a parsed reply, classifying it by the
    /// first digit of the legacy code per spec §4.10.
    pub fn from_response(response: &Response) -> Status {
        let classification = match response.code.severity {
            Severity::PositiveCompletion | Severity::PositiveIntermediate => Classification::Ok,
            Severity::TransientNegativeCompletion => Classification::TransientFailure,
            Severity::PermanentNegativeCompletion => Classification::PermanentFailure,
        };
        Status {
            code: Some(response.code.to_string().parse().unwrap_or(0)),
            enhanced_code: response.enhanced_code.clone(),
            text: response.message.clone(),
            classification,
        }
    }

    pub fn protocol_error(text: &str) -> Status {
        Status {
            code: None,
            enhanced_code: None,
            text: vec![text.to_string()],
            classification: Classification::ProtocolError,
        }
    }

    pub fn local_error(text: &str) -> Status {
        Status {
            code: None,
            enhanced_code: None,
            text: vec![text.to_string()],
            classification: Classification::LocalError,
        }
    }

    /// Code 000, transient-failure: no reply arrived before the
    /// deadline (spec §4.10).
    pub fn timed_out() -> Status {
        Status {
            code: Some(0),
            enhanced_code: None,
            text: vec!["no reply within the configured deadline".to_string()],
            classification: Classification::TransientFailure,
        }
    }

    /// A recipient or message that was never attempted because an
    /// earlier stage (reverse path, EHLO, STARTTLS, AUTH) failed first
    /// (spec §7, cascading "not attempted").
    pub fn not_attempted(reason: &str) -> Status {
        Status {
            code: None,
            enhanced_code: None,
            text: vec![format!("not attempted: {}", reason)],
            classification: Classification::PermanentFailure,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.classification == Classification::Ok
    }

    fn summary(&self) -> String {
        if self.text.is_empty() {
            String::new()
        } else {
            self.text.join("; ")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::{Category, Code, Detail};

    #[test]
    fn test_from_response_classifies_by_severity() {
        let ok = Response::new(
            Code::new(Severity::PositiveCompletion, Category::MailSystem, Detail::Zero),
            vec!["ok".to_string()],
            None,
        );
        assert_eq!(Status::from_response(&ok).classification, Classification::Ok);

        let transient = Response::new(
            Code::new(
                Severity::TransientNegativeCompletion,
                Category::MailSystem,
                Detail::One,
            ),
            vec!["try later".to_string()],
            None,
        );
        assert_eq!(
            Status::from_response(&transient).classification,
            Classification::TransientFailure
        );

        let permanent = Response::new(
            Code::new(
                Severity::PermanentNegativeCompletion,
                Category::MailSystem,
                Detail::Zero,
            ),
            vec!["no such user".to_string()],
            None,
        );
        assert_eq!(
            Status::from_response(&permanent).classification,
            Classification::PermanentFailure
        );
    }

    #[test]
    fn test_timed_out_is_code_000() {
        let status = Status::timed_out();
        assert_eq!(status.code, Some(0));
        assert_eq!(status.classification, Classification::TransientFailure);
    }

    #[test]
    fn test_pending_is_default() {
        assert_eq!(Status::pending().classification, Classification::Pending);
    }
}
