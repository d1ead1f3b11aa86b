//! Per-transaction engine (spec component C8): the `Message` and
//! `Recipient` data model, and the MAIL/RCPT*/DATA/payload/final-dot
//! sequence that drives one message to completion.

use crate::error::Error;
use crate::extension::{
    AddressType, ByMode, Extension, MailBodyParameter, MailParameter, NotifyParameter,
    RcptParameter, RetParameter, ServerInfo,
};
use crate::message::{
    canonicalize, has_8bit_octet, render, repair_headers, BodySource, EmailAddress, HeaderTable,
};
use crate::pipeline::Pipeline;
use crate::response::Response;
use crate::status::Status;
use crate::stream::SmtpStream;
use log::debug;
use tokio::io::{AsyncRead as Read, AsyncWrite as Write};

/// One recipient of a message (data model §3). Its parent message is
/// immutable once the message has been appended to the session.
#[derive(Debug)]
pub struct Recipient {
    pub mailbox: EmailAddress,
    pub notify: Option<Vec<NotifyParameter>>,
    pub orcpt: Option<(AddressType, String)>,
    pub complete: bool,
    pub status: Status,
}

impl Recipient {
    pub fn new(mailbox: EmailAddress) -> Recipient {
        Recipient {
            mailbox,
            notify: None,
            orcpt: None,
            complete: false,
            status: Status::pending(),
        }
    }

    pub fn with_notify(mut self, notify: Vec<NotifyParameter>) -> Recipient {
        self.notify = Some(notify);
        self
    }

    pub fn with_orcpt(mut self, address_type: AddressType, address: String) -> Recipient {
        self.orcpt = Some((address_type, address));
        self
    }

    fn parameters(&self) -> Vec<RcptParameter> {
        let mut params = Vec::new();
        if let Some(notify) = &self.notify {
            params.push(RcptParameter::Notify(notify.clone()));
        }
        if let Some((kind, addr)) = &self.orcpt {
            params.push(RcptParameter::Orcpt(kind.clone(), addr.clone()));
        }
        params
    }
}

/// One message belonging to a session (data model §3).
pub struct Message {
    pub reverse_path: Option<EmailAddress>,
    pub recipients: Vec<Recipient>,
    pub dsn_ret: Option<RetParameter>,
    pub dsn_envid: Option<String>,
    pub size_estimate: Option<usize>,
    pub request_8bitmime: bool,
    pub deliver_by: Option<(i32, ByMode, bool)>,
    pub headers: HeaderTable,
    pub body: Box<dyn BodySource>,
    pub reverse_path_status: Status,
    pub message_status: Status,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("reverse_path", &self.reverse_path)
            .field("recipients", &self.recipients)
            .field("dsn_ret", &self.dsn_ret)
            .field("dsn_envid", &self.dsn_envid)
            .field("size_estimate", &self.size_estimate)
            .field("request_8bitmime", &self.request_8bitmime)
            .field("deliver_by", &self.deliver_by)
            .field("headers", &self.headers)
            .field("reverse_path_status", &self.reverse_path_status)
            .field("message_status", &self.message_status)
            .finish_non_exhaustive()
    }
}

impl Message {
    pub fn new(reverse_path: Option<EmailAddress>, body: Box<dyn BodySource>) -> Message {
        Message {
            reverse_path,
            recipients: Vec::new(),
            dsn_ret: None,
            dsn_envid: None,
            size_estimate: None,
            request_8bitmime: false,
            deliver_by: None,
            headers: HeaderTable::new(),
            body,
            reverse_path_status: Status::pending(),
            message_status: Status::pending(),
        }
    }

    pub fn add_recipient(&mut self, recipient: Recipient) {
        self.recipients.push(recipient);
    }

    /// Sets DELIVERBY parameters, enforcing the data model invariant
    /// that `Return` mode requires `time > 0` (spec §3(vi)).
    pub fn set_deliver_by(&mut self, time: i32, mode: ByMode, trace: bool) -> Result<(), Error> {
        if mode == ByMode::Return && time <= 0 {
            return Err(Error::InvalidArgument(
                "DELIVERBY mode=RETURN requires a positive time",
            ));
        }
        self.deliver_by = Some((time, mode, trace));
        Ok(())
    }

    fn mail_parameters(&self, server_info: &ServerInfo, smtp_utf8: bool) -> Result<Vec<MailParameter>, Error> {
        let mut params = Vec::new();

        if let Some(size) = self.size_estimate {
            if server_info.supports_feature(Extension::Size) {
                params.push(MailParameter::Size(size));
            }
        }

        if self.request_8bitmime {
            if !server_info.supports_feature(Extension::EightBitMime) {
                return Err(Error::Protocol(
                    "8BITMIME requested but not advertised by the server",
                ));
            }
            params.push(MailParameter::Body(MailBodyParameter::EightBitMime));
        }

        if smtp_utf8 && server_info.supports_feature(Extension::SmtpUtfEight) {
            params.push(MailParameter::SmtpUtfEight);
        }

        if let Some(ret) = self.dsn_ret {
            if !server_info.supports_feature(Extension::Dsn) {
                return Err(Error::Protocol("RET requested but DSN not advertised"));
            }
            params.push(MailParameter::Ret(ret));
        }

        if let Some(envid) = &self.dsn_envid {
            if !server_info.supports_feature(Extension::Dsn) {
                return Err(Error::Protocol("ENVID requested but DSN not advertised"));
            }
            params.push(MailParameter::Envid(envid.clone()));
        }

        if let Some((time, mode, trace)) = self.deliver_by {
            if !server_info.supports_feature(Extension::DeliverBy) {
                return Err(Error::Protocol(
                    "DELIVERBY requested but not advertised by the server",
                ));
            }
            params.push(MailParameter::By { time, mode, trace });
        }

        Ok(params)
    }
}

/// Runs one transaction (MAIL, RCPT*, DATA, payload, final dot) for
/// `message` over `stream`, recording per-recipient and per-message
/// status on it. Returns an error only for protocol-level and I/O
/// failures that should abort the whole session; rejected recipients
/// and messages are recorded as status, not propagated as `Err`.
pub async fn run_transaction<S: Read + Write + Unpin>(
    stream: &mut SmtpStream<S>,
    server_info: &ServerInfo,
    pipelining: bool,
    smtp_utf8: bool,
    local_domain: &str,
    message: &mut Message,
) -> Result<(), Error> {
    repair_headers(&mut message.headers, message.reverse_path.as_ref(), local_domain);

    if !message.request_8bitmime && !server_info.supports_feature(Extension::EightBitMime) {
        let body = canonicalize(message.body.as_mut())?;
        if has_8bit_octet(&body) {
            message.message_status =
                Status::protocol_error("message body contains 8-bit octets but 8BITMIME was not negotiated");
            for recipient in &mut message.recipients {
                recipient.status = Status::not_attempted("8-bit body rejected before RCPT");
            }
            return Ok(());
        }
    }

    let mail_parameters = match message.mail_parameters(server_info, smtp_utf8) {
        Ok(params) => params,
        Err(Error::Protocol(reason)) => {
            message.message_status = Status::protocol_error(reason);
            for recipient in &mut message.recipients {
                recipient.status = Status::not_attempted(reason);
            }
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let mut pipeline = Pipeline::new(pipelining && server_info.supports_feature(Extension::Pipelining));

    pipeline.enqueue(MailCommandText::new(message.reverse_path.clone(), mail_parameters));
    for recipient in &message.recipients {
        pipeline.enqueue(RcptCommandText::new(
            recipient.mailbox.clone(),
            recipient.parameters(),
        ));
    }

    let responses = pipeline.flush(stream).await?;
    let mut responses = responses.into_iter();

    let mail_response = responses.next().expect("MAIL response always present");
    message.reverse_path_status = match &mail_response {
        Ok(r) => Status::from_response(r),
        Err(err) => status_from_command_error(err),
    };

    let mut any_accepted = false;
    for recipient in &mut message.recipients {
        let response = responses.next().expect("one response per RCPT");
        recipient.complete = true;
        recipient.status = match &response {
            Ok(r) => Status::from_response(r),
            Err(err) => status_from_command_error(err),
        };
        if recipient.status.is_ok() {
            any_accepted = true;
        }
    }

    if !message.reverse_path_status.is_ok() {
        stream.command(crate::commands::RsetCommand).await.ok();
        message.message_status = Status::not_attempted("sender rejected");
        for recipient in &mut message.recipients {
            if !recipient.complete || recipient.status.code.is_none() {
                recipient.status = Status::not_attempted("sender rejected");
            }
        }
        return Ok(());
    }

    if !any_accepted {
        stream.command(crate::commands::RsetCommand).await.ok();
        message.message_status = Status::protocol_error("no recipient accepted, DATA not sent");
        return Ok(());
    }

    let data_response = stream.command(crate::commands::DataCommand).await;
    let data_response = match data_response {
        Ok(r) => r,
        Err(err) => {
            message.message_status = status_from_command_error(&err);
            return Ok(());
        }
    };

    if !data_response.has_code(354) {
        message.message_status = Status::from_response(&data_response);
        return Ok(());
    }

    let body = canonicalize(message.body.as_mut())?;
    let full_message = render(&message.headers, &body);
    let final_response = stream.message(std::io::Cursor::new(full_message)).await;
    message.message_status = match final_response {
        Ok(r) => {
            debug!(
                "status=sent ({})",
                r.message.get(0).cloned().unwrap_or_default()
            );
            Status::from_response(&r)
        }
        Err(err) => status_from_command_error(&err),
    };

    Ok(())
}

fn status_from_command_error(err: &Error) -> Status {
    match err {
        Error::Transient(r) | Error::Permanent(r) => Status::from_response(r),
        Error::Timeout => Status::timed_out(),
        Error::Protocol(reason) | Error::ResponseParsing(reason) => Status::protocol_error(reason),
        other => Status::local_error(&other.to_string()),
    }
}

/// A `MAIL FROM` ready to be rendered onto the wire, stored apart from
/// `commands::MailCommand` so the pipeline can own it without
/// borrowing `Message`.
struct MailCommandText(crate::commands::MailCommand);

impl MailCommandText {
    fn new(sender: Option<EmailAddress>, parameters: Vec<MailParameter>) -> MailCommandText {
        MailCommandText(crate::commands::MailCommand::new(sender, parameters))
    }
}

impl std::fmt::Display for MailCommandText {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct RcptCommandText(crate::commands::RcptCommand);

impl RcptCommandText {
    fn new(recipient: EmailAddress, parameters: Vec<RcptParameter>) -> RcptCommandText {
        RcptCommandText(crate::commands::RcptCommand::new(recipient, parameters))
    }
}

impl std::fmt::Display for RcptCommandText {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::extension::RetParameter;
    use crate::message::BytesBody;

    #[test]
    fn test_deliver_by_return_requires_positive_time() {
        let mut message = Message::new(None, Box::new(BytesBody::new(vec![])));
        assert!(message.set_deliver_by(0, ByMode::Return, false).is_err());
        assert!(message.set_deliver_by(60, ByMode::Return, false).is_ok());
        assert!(message.set_deliver_by(0, ByMode::Notify, false).is_ok());
    }

    #[test]
    fn test_mail_parameters_rejects_missing_dsn() {
        let mut message = Message::new(None, Box::new(BytesBody::new(vec![])));
        message.dsn_ret = Some(RetParameter::Full);
        let server_info = ServerInfo::default();
        assert!(matches!(
            message.mail_parameters(&server_info, false),
            Err(Error::Protocol(_))
        ));
    }
}
