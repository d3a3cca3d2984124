use crate::tests::EnvGuard;
use crate::{
    HANDSHAKE_ADDR_ENV, HandshakeMessage, LISTENING_MESSAGE, PORT_ENV, notify_listening,
    send_handshake,
};

use googletest::assert_that;
use googletest::prelude::{anything, eq, ok};
use serial_test::serial;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

async fn receive_line(listener: TcpListener) -> String {
    let (stream, _) = listener.accept().await.unwrap();
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).await.unwrap();
    line
}

// =========================================================================
// Message format
// =========================================================================

#[test]
fn given_sentinel_line_when_parsed_then_listening() {
    let message = HandshakeMessage::parse("spust: server listening\n");

    assert_that!(message, eq(&HandshakeMessage::Listening));
}

#[test]
fn given_wrong_port_line_when_parsed_then_ports_extracted() {
    let message = HandshakeMessage::parse("spust: server is listening on port 3001 and not 3000");

    assert_that!(
        message,
        eq(&HandshakeMessage::WrongPort {
            actual: 3001,
            expected: 3000
        })
    );
    assert_that!(message.is_listening(), eq(false));
}

#[test]
fn given_unknown_line_when_parsed_then_other() {
    let message = HandshakeMessage::parse("hello world");

    assert_that!(message, eq(&HandshakeMessage::Other("hello world".into())));
}

#[test]
fn given_mismatched_ports_when_message_built_then_wrong_port_text() {
    let message = HandshakeMessage::for_ports(4001, 4000);

    assert_that!(
        message.to_string(),
        eq("spust: server is listening on port 4001 and not 4000")
    );
}

// =========================================================================
// Transport
// =========================================================================

#[tokio::test]
async fn given_launcher_listening_when_send_handshake_then_single_line_received() {
    // Given
    let launcher = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = launcher.local_addr().unwrap().to_string();
    let receiver = tokio::spawn(receive_line(launcher));

    // When
    let result = send_handshake(&addr, &HandshakeMessage::Listening).await;

    // Then
    let expected = format!("{LISTENING_MESSAGE}\n");
    assert_that!(result, ok(anything()));
    assert_that!(receiver.await.unwrap(), eq(&expected));
}

#[tokio::test]
#[serial]
async fn given_no_handshake_addr_when_notify_listening_then_noop() {
    // Given
    let _addr = EnvGuard::remove(HANDSHAKE_ADDR_ENV);

    // When
    let result = notify_listening(3000).await;

    // Then
    assert_that!(result, ok(eq(&false)));
}

#[tokio::test]
#[serial]
async fn given_bound_on_other_port_when_notify_listening_then_wrong_port_reported() {
    // Given
    let launcher = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = launcher.local_addr().unwrap().to_string();
    let _addr = EnvGuard::set(HANDSHAKE_ADDR_ENV, &addr);
    let _port = EnvGuard::set(PORT_ENV, "4000");
    let receiver = tokio::spawn(receive_line(launcher));

    // When
    let result = notify_listening(4001).await;

    // Then
    assert_that!(result, ok(eq(&true)));
    assert_that!(
        HandshakeMessage::parse(&receiver.await.unwrap()),
        eq(&HandshakeMessage::WrongPort {
            actual: 4001,
            expected: 4000
        })
    );
}
