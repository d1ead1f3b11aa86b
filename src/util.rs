//! Small helpers shared by the message source and the line I/O layer.

use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};

/// Formats the current local time as an RFC 5322 `Date:` value, e.g.
/// `Tue, 1 Jul 2003 10:52:37 +0200`.
pub fn format_rfc5322_date_now() -> String {
    Local::now().format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A unique-enough left-hand side for a synthesized `Message-ID`:
/// current timestamp plus a process-local counter, so two messages
/// generated in the same session never collide.
pub fn random_message_id_token() -> String {
    let counter = MESSAGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}.{:x}", Local::now().timestamp_micros(), counter)
}

/// Renders CRLF visibly for debug logging of wire traffic, the way
/// the teacher's stream layer does.
pub fn escape_crlf(string: &str) -> String {
    string.replace("\r\n", "<CRLF>")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_escape_crlf() {
        assert_eq!(escape_crlf("EHLO\r\n"), "EHLO<CRLF>");
    }

    #[test]
    fn test_message_id_token_unique() {
        let a = random_message_id_token();
        let b = random_message_id_token();
        assert_ne!(a, b);
    }
}
