//! End-to-end coverage of the per-transaction engine over the mock
//! transport, exercising the scenarios a relay server can produce.

use mailsubmit::extension::{Extension, ServerInfo};
use mailsubmit::status::Classification;
use mailsubmit::transaction::{run_transaction, Recipient};
use mailsubmit::transport::MockStream;
use mailsubmit::{BytesBody, EmailAddress, Message, SmtpStream};

fn server_info(extensions: &[Extension]) -> ServerInfo {
    let mut info = ServerInfo::default();
    info.name = "mx.example.org".to_string();
    for &ext in extensions {
        info.features.insert(ext);
    }
    info
}

fn address(s: &str) -> EmailAddress {
    s.parse().unwrap()
}

#[tokio::test]
async fn scenario_1_happy_path_with_pipelining_and_size() {
    let mut mock = MockStream::new();
    mock.next_vec(b"250 2.1.0 Sender OK\r\n250 2.1.5 Recipient OK\r\n354 Send body\r\n250 2.0.0 Queued\r\n");
    let mut stream = SmtpStream::new(mock);

    let info = server_info(&[Extension::Pipelining, Extension::Size]);
    let mut message = Message::new(
        Some(address("a@x.example")),
        Box::new(BytesBody::new(b"hello".to_vec())),
    );
    message.size_estimate = Some(123);
    message.add_recipient(Recipient::new(address("b@y.example")));

    run_transaction(&mut stream, &info, true, false, "localhost", &mut message)
        .await
        .unwrap();

    assert_eq!(message.reverse_path_status.classification, Classification::Ok);
    assert_eq!(message.recipients[0].status.classification, Classification::Ok);
    assert_eq!(message.message_status.classification, Classification::Ok);

    let mut mock = stream.into_inner();
    let written = String::from_utf8(mock.take_vec()).unwrap();
    assert!(written.contains("MAIL FROM:<a@x.example> SIZE=123\r\n"));
    assert!(written.contains("RCPT TO:<b@y.example>\r\n"));
    assert!(written.contains("DATA\r\n"));
}

#[tokio::test]
async fn scenario_2_partial_recipient_rejection_still_sends() {
    let mut mock = MockStream::new();
    mock.next_vec(
        b"250 2.1.0 Sender OK\r\n250 2.1.5 Recipient OK\r\n550 5.1.1 No such user\r\n354 Send body\r\n250 2.0.0 Queued\r\n",
    );
    let mut stream = SmtpStream::new(mock);

    let info = server_info(&[Extension::Pipelining]);
    let mut message = Message::new(
        Some(address("a@x.example")),
        Box::new(BytesBody::new(b"hello".to_vec())),
    );
    message.add_recipient(Recipient::new(address("b@y.example")));
    message.add_recipient(Recipient::new(address("c@y.example")));

    run_transaction(&mut stream, &info, true, false, "localhost", &mut message)
        .await
        .unwrap();

    assert_eq!(message.recipients[0].status.classification, Classification::Ok);
    assert_eq!(
        message.recipients[1].status.classification,
        Classification::PermanentFailure
    );
    assert!(message.recipients[0].complete);
    assert!(message.recipients[1].complete);
    assert_eq!(message.message_status.classification, Classification::Ok);
}

#[tokio::test]
async fn scenario_3_all_recipients_rejected_sends_rset_not_data() {
    let mut mock = MockStream::new();
    mock.next_vec(
        b"250 2.1.0 Sender OK\r\n550 5.1.1 No such user\r\n550 5.1.1 No such user\r\n250 2.0.0 OK\r\n",
    );
    let mut stream = SmtpStream::new(mock);

    let info = server_info(&[Extension::Pipelining]);
    let mut message = Message::new(
        Some(address("a@x.example")),
        Box::new(BytesBody::new(b"hello".to_vec())),
    );
    message.add_recipient(Recipient::new(address("b@y.example")));
    message.add_recipient(Recipient::new(address("c@y.example")));

    run_transaction(&mut stream, &info, true, false, "localhost", &mut message)
        .await
        .unwrap();

    assert_eq!(
        message.message_status.classification,
        Classification::ProtocolError
    );

    let mut mock = stream.into_inner();
    let written = String::from_utf8(mock.take_vec()).unwrap();
    assert!(written.contains("RSET\r\n"));
    assert!(!written.contains("DATA\r\n"));
}

#[tokio::test]
async fn scenario_6_eight_bit_body_on_seven_bit_server_is_rejected_before_mail() {
    let mock = MockStream::new();
    let mut stream = SmtpStream::new(mock);

    let info = server_info(&[]);
    let mut message = Message::new(
        Some(address("a@x.example")),
        Box::new(BytesBody::new(vec![0x41, 0xC3, 0x28])),
    );
    message.add_recipient(Recipient::new(address("b@y.example")));

    run_transaction(&mut stream, &info, true, false, "localhost", &mut message)
        .await
        .unwrap();

    assert_eq!(
        message.message_status.classification,
        Classification::ProtocolError
    );
    assert_eq!(
        message.recipients[0].status.classification,
        Classification::PermanentFailure
    );
    assert!(
        !message.recipients[0].complete,
        "RCPT was never sent, so complete must stay false"
    );

    let mut mock = stream.into_inner();
    assert!(mock.take_vec().is_empty(), "no command should reach the wire");
}
