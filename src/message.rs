//! Message source (spec component C4): envelope types, the header
//! table and its repair pass, and the pull-based body-producer
//! interface that feeds the DATA phase.

use crate::error::Error;
use std::ffi::OsStr;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// An RFC 5321 mailbox. Only basic wire-safety is validated here —
/// full mailbox grammar is the server's job.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a new email address, rejecting characters that would
    /// allow command injection into the SMTP command line.
    pub fn new(address: String) -> Result<EmailAddress, Error> {
        if address.chars().any(|c| {
            !c.is_ascii() || c.is_ascii_control() || c.is_ascii_whitespace() || c == '<' || c == '>'
        }) {
            return Err(Error::InvalidArgument("invalid email address"));
        }
        Ok(EmailAddress(address))
    }
}

impl FromStr for EmailAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmailAddress::new(s.to_string())
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<OsStr> for EmailAddress {
    fn as_ref(&self) -> &OsStr {
        self.0.as_ref()
    }
}

/// The envelope: reverse path (possibly null, for bounces) and one or
/// more forward paths. Source-routed addresses are not supported, per
/// RFC 5321.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Envelope {
    forward_path: Vec<EmailAddress>,
    reverse_path: Option<EmailAddress>,
}

impl Envelope {
    /// Creates a new envelope. Fails if `to` is empty — a message
    /// must have at least one recipient (data model invariant).
    pub fn new(from: Option<EmailAddress>, to: Vec<EmailAddress>) -> Result<Envelope, Error> {
        if to.is_empty() {
            return Err(Error::InvalidArgument("envelope has no recipients"));
        }
        Ok(Envelope {
            forward_path: to,
            reverse_path: from,
        })
    }

    pub fn to(&self) -> &[EmailAddress] {
        self.forward_path.as_slice()
    }

    pub fn from(&self) -> Option<&EmailAddress> {
        self.reverse_path.as_ref()
    }
}

/// A header field, preserving its original casing for display while
/// matching by name case-insensitively.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

/// The application-supplied header table, in insertion order. Header
/// repair (spec §4.4.1) reads and mutates one of these before the
/// first body octet is sent.
#[derive(Clone, Debug, Default)]
pub struct HeaderTable {
    fields: Vec<HeaderField>,
}

impl HeaderTable {
    pub fn new() -> HeaderTable {
        HeaderTable::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Appends a field, even if one of the same name already exists —
    /// some headers (`Received`) are legitimately repeated.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(HeaderField {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Removes every field matching `name` case-insensitively.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }
}

/// A pull interface over a message body: "give me up to `len` bytes
/// starting at `offset`", plus a rewind. The session engine reads the
/// body once to stream it, and may read it again from offset 0 if it
/// needs to precompute its canonicalized size for SIZE admission;
/// the reverse path is not retried on transient failure, so no other
/// offset needs to be supported (spec §9, body-producer rewind
/// contract).
pub trait BodySource: Send {
    /// Reads up to `buf.len()` bytes starting at `offset`, returning
    /// the number of bytes written into `buf`. Returns 0 at end of
    /// body.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Rewinds the cursor implied by successive `read_at` calls back
    /// to offset 0. Only offset 0 is required to be supported.
    fn rewind(&mut self) -> std::io::Result<()>;
}

/// A `BodySource` over an in-memory buffer, the common case for
/// applications that already hold the whole message.
#[derive(Clone, Debug)]
pub struct BytesBody {
    data: Vec<u8>,
}

impl BytesBody {
    pub fn new(data: Vec<u8>) -> BytesBody {
        BytesBody { data }
    }
}

impl BodySource for BytesBody {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let n = std::cmp::min(buf.len(), self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    fn rewind(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 8BITMIME body kind, carried by `MailParameter::Body`.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum BodyKind {
    SevenBit,
    EightBitMime,
}

/// Reads the entirety of `source` from offset 0, canonicalizing bare
/// CR/LF to CRLF as it goes (spec §4.4 step 2). Used both to compute
/// the post-canonicalization size and to produce the bytes actually
/// streamed during DATA.
pub fn canonicalize(source: &mut dyn BodySource) -> std::io::Result<Vec<u8>> {
    source.rewind()?;
    let mut raw = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let offset = raw.len() as u64;
        let n = source.read_at(offset, &mut chunk)?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
    }
    Ok(canonicalize_crlf(&raw))
}

fn canonicalize_crlf(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        match byte {
            b'\r' => {
                out.push(b'\r');
                out.push(b'\n');
                if iter.peek() == Some(&b'\n') {
                    iter.next();
                }
            }
            b'\n' => {
                out.push(b'\r');
                out.push(b'\n');
            }
            _ => out.push(byte),
        }
    }
    out
}

/// True if any byte in `body` is outside the 7-bit ASCII range
/// (spec §4.4 step 4).
pub fn has_8bit_octet(body: &[u8]) -> bool {
    body.iter().any(|&b| b > 0x7f)
}

/// Renders the repaired header table followed by a blank line and the
/// canonicalized body, the full content handed to the `DATA` phase.
pub fn render(headers: &HeaderTable, canonical_body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(canonical_body.len() + 256);
    for field in headers.iter() {
        out.extend_from_slice(field.name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(field.value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(canonical_body);
    out
}

/// Synthesizes `Date`, `Message-ID`, and `From` if missing, and strips
/// `Return-Path` if present (spec §4.4 step 1). Idempotent: headers
/// already present are left untouched (spec §8 round-trip property).
pub fn repair_headers(headers: &mut HeaderTable, from: Option<&EmailAddress>, local_domain: &str) {
    headers.remove("Return-Path");

    if !headers.has("Date") {
        headers.push("Date", crate::util::format_rfc5322_date_now());
    }

    if !headers.has("Message-ID") {
        headers.push(
            "Message-ID",
            format!("<{}@{}>", crate::util::random_message_id_token(), local_domain),
        );
    }

    if !headers.has("From") {
        let from = from
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("MAILER-DAEMON@{}", local_domain));
        headers.push("From", from);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_email_address_validation() {
        assert!(EmailAddress::new("foobar@example.org".to_string()).is_ok());
        assert!(EmailAddress::new("foo\rbar@localhost".to_string()).is_err());
        assert!(EmailAddress::new(">foobar@example.org".to_string()).is_err());
        assert!(EmailAddress::new("foo bar@example.org".to_string()).is_err());
    }

    #[test]
    fn test_envelope_requires_recipient() {
        assert!(Envelope::new(None, vec![]).is_err());
        let to = EmailAddress::new("a@example.org".to_string()).unwrap();
        assert!(Envelope::new(None, vec![to]).is_ok());
    }

    #[test]
    fn test_header_table_case_insensitive() {
        let mut headers = HeaderTable::new();
        headers.push("Subject", "hi");
        assert_eq!(headers.get("subject"), Some("hi"));
        headers.remove("SUBJECT");
        assert_eq!(headers.get("Subject"), None);
    }

    #[test]
    fn test_repair_headers_is_idempotent() {
        let mut headers = HeaderTable::new();
        headers.push("Date", "Tue, 01 Jan 2020 00:00:00 +0000");
        headers.push("Message-ID", "<existing@example.org>");
        headers.push("From", "a@example.org");
        let before = headers.clone();

        repair_headers(&mut headers, None, "example.org");

        assert_eq!(headers.get("Date"), before.get("Date"));
        assert_eq!(headers.get("Message-ID"), before.get("Message-ID"));
        assert_eq!(headers.get("From"), before.get("From"));
    }

    #[test]
    fn test_repair_headers_synthesizes_missing() {
        let mut headers = HeaderTable::new();
        repair_headers(&mut headers, None, "example.org");
        assert!(headers.has("Date"));
        assert!(headers.has("Message-ID"));
        assert!(headers.has("From"));
    }

    #[test]
    fn test_repair_headers_strips_return_path() {
        let mut headers = HeaderTable::new();
        headers.push("Return-Path", "<bounce@example.org>");
        repair_headers(&mut headers, None, "example.org");
        assert!(!headers.has("Return-Path"));
    }

    #[test]
    fn test_canonicalize_crlf() {
        let mut body = BytesBody::new(b"a\nb\rc\r\nd".to_vec());
        let out = canonicalize(&mut body).unwrap();
        assert_eq!(out, b"a\r\nb\r\nc\r\nd".to_vec());
    }

    #[test]
    fn test_has_8bit_octet() {
        assert!(!has_8bit_octet(b"plain ascii"));
        assert!(has_8bit_octet(&[0x41, 0xC3, 0x28]));
    }

    #[test]
    fn test_render_headers_then_blank_line_then_body() {
        let mut headers = HeaderTable::new();
        headers.push("Subject", "hi");
        let rendered = render(&headers, b"body text");
        assert_eq!(rendered, b"Subject: hi\r\n\r\nbody text".to_vec());
    }
}
