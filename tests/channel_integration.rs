#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Transport channel integration tests
//!
//! Runs real ISCP and DCP channels against the mock receivers in `mock_servers`.

mod mock_servers;

use mock_servers::{eventually, MockDcpReceiver, MockIscpReceiver};
use onpc_core::channel::{inbound_queue, Channel, ChannelOptions, CodeFilter, InboundReceiver};
use onpc_core::messages::{
    Inbound, InputType, Message, PowerStatus, Query, Request, SetupCommand,
};
use onpc_core::protocol::iscp;
use onpc_core::protocol::ProtocolType;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

/// A local port with nothing listening.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn dcp_options() -> ChannelOptions {
    ChannelOptions {
        heos_port: closed_port(),
        http_ports: vec![closed_port()],
        ..ChannelOptions::default()
    }
}

async fn next(rx: &mut InboundReceiver) -> Inbound {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for inbound message")
        .expect("inbound queue closed")
}

// =============================================================================
// ISCP
// =============================================================================

#[tokio::test]
async fn test_iscp_query_and_answer() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "01").await;

    let (tx, mut rx) = inbound_queue();
    let channel = Channel::connect(
        ProtocolType::Iscp,
        "127.0.0.1",
        mock.port(),
        tx,
        ChannelOptions::default(),
    )
    .await
    .unwrap();
    channel.start().await;
    channel.start().await;
    assert!(channel.is_active());

    channel
        .send(Request::query(Query::PowerStatus, 0))
        .await
        .unwrap();

    let inbound = next(&mut rx).await;
    assert!(inbound.is_from("127.0.0.1", mock.port()));
    assert_eq!(inbound.code, "PWR");
    assert_eq!(
        inbound.message,
        Message::PowerStatus {
            zone: 0,
            status: PowerStatus::On
        }
    );
    assert_eq!(mock.count_received("PWRQSTN").await, 1);

    channel.stop();
    channel.stop();
    assert!(!channel.is_active());
}

#[tokio::test]
async fn test_iscp_frame_split_byte_by_byte() {
    let mock = MockIscpReceiver::start().await;
    let (tx, mut rx) = inbound_queue();
    let channel = Channel::connect(
        ProtocolType::Iscp,
        "127.0.0.1",
        mock.port(),
        tx,
        ChannelOptions::default(),
    )
    .await
    .unwrap();
    channel.start().await;

    let mut wire = b"garbage".to_vec();
    wire.extend_from_slice(&iscp::encode('1', "SLI", "2B").unwrap());
    wire.extend_from_slice(&iscp::encode('1', "AMT", "01").unwrap());
    for b in wire {
        mock.push_raw(&[b]).await;
    }

    assert_eq!(
        next(&mut rx).await.message,
        Message::InputSelector {
            zone: 0,
            input: InputType::Net
        }
    );
    assert_eq!(next(&mut rx).await.code, "AMT");
}

#[tokio::test]
async fn test_iscp_undecodable_frame_skipped() {
    let mock = MockIscpReceiver::start().await;
    let (tx, mut rx) = inbound_queue();
    let channel = Channel::connect(
        ProtocolType::Iscp,
        "127.0.0.1",
        mock.port(),
        tx,
        ChannelOptions::default(),
    )
    .await
    .unwrap();
    channel.start().await;

    mock.push("PWR", "zz").await;
    mock.push("PWR", "00").await;

    assert_eq!(
        next(&mut rx).await.message,
        Message::PowerStatus {
            zone: 0,
            status: PowerStatus::Standby
        }
    );
    assert!(channel.is_active());
}

#[tokio::test]
async fn test_iscp_disconnect_reported() {
    let mock = MockIscpReceiver::start().await;
    let (tx, mut rx) = inbound_queue();
    let channel = Channel::connect(
        ProtocolType::Iscp,
        "127.0.0.1",
        mock.port(),
        tx,
        ChannelOptions::default(),
    )
    .await
    .unwrap();
    channel.start().await;

    // Let the mock pick up the connection before dropping it
    let (ch, m) = (&channel, &mock);
    assert!(
        eventually(WAIT, || async move {
            ch.send(Request::query(Query::PowerStatus, 0)).await.unwrap();
            m.has_received("PWRQSTN").await
        })
        .await
    );
    mock.disconnect();

    let inbound = next(&mut rx).await;
    assert_eq!(inbound.message, Message::Disconnected);
    assert!(eventually(WAIT, || async move { !ch.is_active() }).await);
    assert!(channel.send(Request::query(Query::PowerStatus, 0)).await.is_err());
}

#[tokio::test]
async fn test_iscp_code_filter() {
    let mock = MockIscpReceiver::start().await;
    let (tx, mut rx) = inbound_queue();
    let channel = Channel::connect(
        ProtocolType::Iscp,
        "127.0.0.1",
        mock.port(),
        tx,
        ChannelOptions {
            filter: CodeFilter::only(&["NFN"]),
            ..ChannelOptions::default()
        },
    )
    .await
    .unwrap();
    channel.start().await;

    mock.push("PWR", "01").await;
    mock.push("NFN", "Kitchen").await;

    let inbound = next(&mut rx).await;
    assert_eq!(inbound.message, Message::FriendlyName("Kitchen".to_string()));
}

#[tokio::test]
async fn test_connect_refused() {
    let (tx, _rx) = inbound_queue();
    let result = Channel::connect(
        ProtocolType::Iscp,
        "127.0.0.1",
        closed_port(),
        tx,
        ChannelOptions::default(),
    )
    .await;
    assert!(result.is_err());
}

// =============================================================================
// DCP
// =============================================================================

#[tokio::test]
async fn test_dcp_lines_split_across_reads() {
    let mock = MockDcpReceiver::start().await;
    let (tx, mut rx) = inbound_queue();
    let channel = Channel::connect(ProtocolType::Dcp, "127.0.0.1", mock.port(), tx, dcp_options())
        .await
        .unwrap();
    channel.start().await;

    mock.push_raw(b"PW").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    mock.push_raw(b"ON\rMU").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    mock.push_raw(b"ON\r\n").await;

    assert_eq!(
        next(&mut rx).await.message,
        Message::PowerStatus {
            zone: 0,
            status: PowerStatus::On
        }
    );
    let muting = next(&mut rx).await;
    assert_eq!(muting.code, "AMT");
    assert_eq!(muting.params, "MUON");
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_dcp_request_encoding_and_pacing() {
    let mock = MockDcpReceiver::start().await;
    mock.respond("ZM?", "ZMON").await;

    let (tx, mut rx) = inbound_queue();
    let channel = Channel::connect(ProtocolType::Dcp, "127.0.0.1", mock.port(), tx, dcp_options())
        .await
        .unwrap();
    channel.start().await;

    let started = tokio::time::Instant::now();
    channel
        .send(Request::query(Query::PowerStatus, 0))
        .await
        .unwrap();
    channel
        .send(Request::query(Query::InputSelector, 0))
        .await
        .unwrap();
    channel
        .send(Request::query(Query::MasterVolume, 0))
        .await
        .unwrap();

    assert!(matches!(
        next(&mut rx).await.message,
        Message::PowerStatus {
            status: PowerStatus::On,
            ..
        }
    ));
    let m = &mock;
    assert!(eventually(WAIT, || async move { m.has_received("MV?").await }).await);
    // Three commands need at least two pacing gaps
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(mock.received().await, vec!["ZM?", "SI?", "MV?"]);
}

#[tokio::test]
async fn test_dcp_query_without_equivalent_is_dropped() {
    let mock = MockDcpReceiver::start().await;
    let (tx, _rx) = inbound_queue();
    let channel = Channel::connect(ProtocolType::Dcp, "127.0.0.1", mock.port(), tx, dcp_options())
        .await
        .unwrap();
    channel.start().await;

    channel
        .send(Request::query(Query::ListTitleInfo, 0))
        .await
        .unwrap();
    channel
        .send(Request::query(Query::PowerStatus, 0))
        .await
        .unwrap();

    let m = &mock;
    assert!(eventually(WAIT, || async move { m.has_received("ZM?").await }).await);
    assert_eq!(mock.received().await, vec!["ZM?"]);
}

#[tokio::test]
async fn test_dcp_disconnect_reported() {
    let mock = MockDcpReceiver::start().await;
    let (tx, mut rx) = inbound_queue();
    let channel = Channel::connect(ProtocolType::Dcp, "127.0.0.1", mock.port(), tx, dcp_options())
        .await
        .unwrap();
    channel.start().await;

    let (ch, m) = (&channel, &mock);
    assert!(
        eventually(WAIT, || async move {
            ch.send(Request::query(Query::PowerStatus, 0)).await.unwrap();
            m.has_received("ZM?").await
        })
        .await
    );
    mock.disconnect();

    assert_eq!(next(&mut rx).await.message, Message::Disconnected);
}

#[tokio::test]
async fn test_dcp_slow_http_does_not_block_avr_commands() {
    let mock = MockDcpReceiver::start().await;
    // Accepts connections but never answers
    let stalled = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let (tx, _rx) = inbound_queue();
    let channel = Channel::connect(
        ProtocolType::Dcp,
        "127.0.0.1",
        mock.port(),
        tx,
        ChannelOptions {
            http_ports: vec![stalled.local_addr().unwrap().port()],
            ..dcp_options()
        },
    )
    .await
    .unwrap();
    channel.start().await;

    channel
        .send(Request::Send(Message::SetupOperation(SetupCommand::Up)))
        .await
        .unwrap();
    channel
        .send(Request::query(Query::PowerStatus, 0))
        .await
        .unwrap();

    let m = &mock;
    assert!(eventually(Duration::from_secs(1), || async move { m.has_received("ZM?").await }).await);
}
