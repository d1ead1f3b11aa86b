//! SMTP reply parsing.
//!
//! A reply is a three digit code followed by enough text to be read by
//! a human, possibly spread across several lines tied together with a
//! `-` continuation marker. [RFC 5321, section 4.2](https://tools.ietf.org/html/rfc5321#section-4.2).

use nom::branch::alt;
use nom::bytes::complete::{tag, take_until};
use nom::character::complete::{char, crlf};
use nom::combinator::{map, map_res, opt};
use nom::multi::many0;
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::{from_utf8, FromStr};

/// First digit of the reply code: broad outcome of the command.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Severity {
    /// 2yz
    PositiveCompletion = 2,
    /// 3yz
    PositiveIntermediate = 3,
    /// 4yz
    TransientNegativeCompletion = 4,
    /// 5yz
    PermanentNegativeCompletion = 5,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", *self as u8)
    }
}

/// Second digit of the reply code: category of condition.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Category {
    /// x0z, syntax
    Syntax = 0,
    /// x1z, information
    Information = 1,
    /// x2z, connections
    Connections = 2,
    Unspecified3 = 3,
    Unspecified4 = 4,
    /// x5z, mail system
    MailSystem = 5,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", *self as u8)
    }
}

/// Third digit of the reply code.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Detail {
    Zero = 0,
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
    Nine = 9,
}

impl Display for Detail {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", *self as u8)
    }
}

/// The 3-digit reply code.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Code {
    pub severity: Severity,
    pub category: Category,
    pub detail: Detail,
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}{}{}", self.severity, self.category, self.detail)
    }
}

impl Code {
    pub fn new(severity: Severity, category: Category, detail: Detail) -> Code {
        Code {
            severity,
            category,
            detail,
        }
    }
}

/// An enhanced status code, RFC 3463, carried when ENHANCEDSTATUSCODES
/// was advertised by the server. Wraps, but never replaces, the legacy
/// 3-digit `Code`.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct EnhancedStatusCode {
    pub class: u8,
    pub subject: u16,
    pub detail: u16,
}

impl Display for EnhancedStatusCode {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

impl FromStr for EnhancedStatusCode {
    type Err = ();

    fn from_str(s: &str) -> Result<EnhancedStatusCode, ()> {
        let mut parts = s.splitn(3, '.');
        let class = parts.next().ok_or(())?.parse().map_err(|_| ())?;
        let subject = parts.next().ok_or(())?.parse().map_err(|_| ())?;
        let detail = parts.next().ok_or(())?.parse().map_err(|_| ())?;
        if (2..=5).contains(&class) {
            Ok(EnhancedStatusCode {
                class,
                subject,
                detail,
            })
        } else {
            Err(())
        }
    }
}

/// A full SMTP reply: a code shared by every line, the text of each
/// line, and an optional enhanced status code lifted out of the first
/// line of text.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Response {
    pub code: Code,
    pub message: Vec<String>,
    pub enhanced_code: Option<EnhancedStatusCode>,
}

impl FromStr for Response {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Response, &'static str> {
        match parse_response(s.as_bytes()) {
            Ok((_, res)) => Ok(res),
            Err(_) => Err("could not parse SMTP reply"),
        }
    }
}

impl Response {
    pub fn new(
        code: Code,
        message: Vec<String>,
        enhanced_code: Option<EnhancedStatusCode>,
    ) -> Response {
        Response {
            code,
            message,
            enhanced_code,
        }
    }

    /// True for 2yz and 3yz codes.
    pub fn is_positive(&self) -> bool {
        matches!(
            self.code.severity,
            Severity::PositiveCompletion | Severity::PositiveIntermediate
        )
    }

    pub fn has_code(&self, code: u16) -> bool {
        self.code.to_string() == code.to_string()
    }

    /// First word of the first text line, if any.
    pub fn first_word(&self) -> Option<&str> {
        self.message
            .get(0)
            .and_then(|line| line.split_whitespace().next())
    }

    /// First text line, if any.
    pub fn first_line(&self) -> Option<&str> {
        self.message.first().map(String::as_str)
    }

    /// Pulls an enhanced status code off the front of `line`, the way a
    /// server that advertises ENHANCEDSTATUSCODES prefixes every text
    /// line with `d.d.d `. The remaining text (without the prefix) is
    /// returned alongside it.
    fn split_enhanced_code(line: &str) -> (Option<EnhancedStatusCode>, &str) {
        if let Some((head, rest)) = line.split_once(' ') {
            if let Ok(code) = head.parse::<EnhancedStatusCode>() {
                return (Some(code), rest);
            }
        }
        (None, line)
    }
}

// nom-based reply line parser, following the wire grammar in
// RFC 5321 section 4.2: single lines are `code SP text CRLF`,
// continuation lines are `code - text CRLF`, and every code in a
// multi-line reply must be identical.

fn parse_code(input: &[u8]) -> IResult<&[u8], Code> {
    map(
        tuple((parse_severity, parse_category, parse_detail)),
        |(severity, category, detail)| Code {
            severity,
            category,
            detail,
        },
    )(input)
}

fn parse_severity(input: &[u8]) -> IResult<&[u8], Severity> {
    alt((
        map(tag("2"), |_| Severity::PositiveCompletion),
        map(tag("3"), |_| Severity::PositiveIntermediate),
        map(tag("4"), |_| Severity::TransientNegativeCompletion),
        map(tag("5"), |_| Severity::PermanentNegativeCompletion),
    ))(input)
}

fn parse_category(input: &[u8]) -> IResult<&[u8], Category> {
    alt((
        map(tag("0"), |_| Category::Syntax),
        map(tag("1"), |_| Category::Information),
        map(tag("2"), |_| Category::Connections),
        map(tag("3"), |_| Category::Unspecified3),
        map(tag("4"), |_| Category::Unspecified4),
        map(tag("5"), |_| Category::MailSystem),
    ))(input)
}

fn parse_detail(input: &[u8]) -> IResult<&[u8], Detail> {
    alt((
        map(tag("0"), |_| Detail::Zero),
        map(tag("1"), |_| Detail::One),
        map(tag("2"), |_| Detail::Two),
        map(tag("3"), |_| Detail::Three),
        map(tag("4"), |_| Detail::Four),
        map(tag("5"), |_| Detail::Five),
        map(tag("6"), |_| Detail::Six),
        map(tag("7"), |_| Detail::Seven),
        map(tag("8"), |_| Detail::Eight),
        map(tag("9"), |_| Detail::Nine),
    ))(input)
}

pub(crate) fn parse_response(input: &[u8]) -> IResult<&[u8], Response> {
    map_res(
        tuple((
            many0(tuple((
                parse_code,
                preceded(char('-'), terminated(take_until("\r\n"), crlf)),
            ))),
            tuple((
                parse_code,
                terminated(opt(preceded(char(' '), take_until("\r\n"))), crlf),
            )),
        )),
        |(lines, (last_code, last_line)): (Vec<(Code, &[u8])>, (Code, Option<&[u8]>))| {
            if !lines.iter().all(|(code, _)| *code == last_code) {
                return Err("mismatched reply codes across continuation lines");
            }

            let mut raw_lines: Vec<&[u8]> = lines.into_iter().map(|(_, text)| text).collect();
            if let Some(text) = last_line {
                raw_lines.push(text);
            }

            let text_lines = raw_lines
                .into_iter()
                .map(|line| from_utf8(line).map(|s| s.to_string()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| "reply text was not valid UTF-8")?;

            let (enhanced_code, text_lines) = match text_lines.split_first() {
                Some((first, rest)) => {
                    let (enhanced, stripped) = Response::split_enhanced_code(first);
                    let mut lines = vec![stripped.to_string()];
                    lines.extend_from_slice(rest);
                    (enhanced, lines)
                }
                None => (None, text_lines),
            };

            Ok(Response {
                code: last_code,
                message: text_lines,
                enhanced_code,
            })
        },
    )(input)
}
