#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Session controller integration tests
//!
//! Drives full sessions against the mock receivers and checks the traffic the controller
//! generates together with what it reports to its listener.

mod mock_servers;

use async_trait::async_trait;
use mock_servers::{eventually, MockDcpHttp, MockDcpReceiver, MockIscpReceiver};
use onpc_core::bus::SessionListener;
use onpc_core::channel::ChannelOptions;
use onpc_core::config::ReceiverCache;
use onpc_core::discovery::DeviceDescriptor;
use onpc_core::messages::{Message, PowerStatus, Query, Request, SetupCommand};
use onpc_core::protocol::ProtocolType;
use onpc_core::session::{Session, SessionOptions, SessionStatus};
use onpc_core::state::{ChangeType, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

/// `NLT` for a Music Server folder with five items, two layers deep.
const FOLDER_TITLE: &str = concat!("00", "0", "2", "0000", "0005", "02", "00", "29", "--", "00", "Albums");
/// The same service in the playback view.
const PLAYBACK_TITLE: &str = concat!("00", "2", "2", "0000", "0000", "02", "00", "--", "--", "00", "");

const RECEIVER_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<response status="ok"><device id="TX-NR676E"><model>TX-NR676E</model>
<friendlyname>Den</friendlyname></device></response>"#;

// =============================================================================
// Test listener
// =============================================================================

#[derive(Default)]
struct RecordingListener {
    batches: Mutex<Vec<(Arc<SessionState>, Vec<ChangeType>)>>,
    stopped: AtomicBool,
    disconnected: AtomicBool,
}

impl RecordingListener {
    fn batches(&self) -> Vec<Vec<ChangeType>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn last_state(&self) -> Option<Arc<SessionState>> {
        self.batches.lock().unwrap().last().map(|(s, _)| s.clone())
    }

    fn is_on(&self) -> bool {
        self.last_state().is_some_and(|s| s.is_on())
    }
}

#[async_trait]
impl SessionListener for RecordingListener {
    async fn on_state_changed(&self, state: Arc<SessionState>, changes: Vec<ChangeType>) {
        self.batches.lock().unwrap().push((state, changes));
    }

    async fn on_manager_stopped(&self, _host: &str, _port: u16) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn on_device_disconnected(&self, _host: &str, _port: u16) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

fn options() -> SessionOptions {
    SessionOptions {
        listening_mode_retry: false,
        coalesce_delay: Duration::from_millis(100),
        ..SessionOptions::default()
    }
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn iscp_session(
    mock: &MockIscpReceiver,
    options: SessionOptions,
) -> (Session, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let session = Session::connect(
        ProtocolType::Iscp,
        "127.0.0.1",
        mock.port(),
        options,
        listener.clone(),
    )
    .await
    .unwrap();
    (session, listener)
}

// =============================================================================
// ISCP sessions
// =============================================================================

#[tokio::test]
async fn test_initial_queries_and_power_follow_up() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "01").await;
    let (session, listener) = iscp_session(&mock, options()).await;

    let m = &mock;
    assert!(eventually(WAIT, || async move { m.has_received("NLTQSTN").await }).await);
    let received = mock.received().await;
    for expected in [
        // Connect
        "NJALINK", "PWRQSTN", "UPDQSTN", "NRIQSTN", "NFNQSTN", "SLIQSTN", "AMTQSTN", "PPSQSTN",
        "LMDQSTN", "DIMQSTN", "DGFQSTN", "APDQSTN", "CECQSTN", "NSBQSTN", "PMBQSTN",
        // Power on
        "MVLQSTN", "TFRQSTN", "SPAQSTN", "SPBQSTN", "SWLQSTN", "CTLQSTN", "LTNQSTN", "NSTQSTN",
        "IFAQSTN", "IFVQSTN",
    ] {
        assert!(received.contains(&expected.to_string()), "{} not sent", expected);
    }
    assert_eq!(received[0], "NJALINK");
    // Settings go out once at connect and again after power on
    assert_eq!(mock.count_received("DIMQSTN").await, 2);

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.is_on() }
    })
    .await);
    assert!(session.is_active());
    assert!(session.state().is_on());

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_changes_are_coalesced() {
    let mock = MockIscpReceiver::start().await;
    let (session, listener) = iscp_session(
        &mock,
        SessionOptions {
            coalesce_delay: Duration::from_millis(300),
            ..options()
        },
    )
    .await;

    mock.push("PWR", "01").await;
    mock.push("AMT", "01").await;
    mock.push("MVL", "20").await;

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { !l.batches().is_empty() }
    })
    .await);
    assert_eq!(
        listener.batches()[0],
        vec![ChangeType::Common, ChangeType::AudioControl]
    );
    let state = listener.last_state().unwrap();
    assert_eq!(state.volume, Some(0x20));

    // A repeated identical message changes nothing and is not reported
    mock.push("PWR", "01").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(listener.batches().len(), 1);

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_auto_power_switches_on() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "00").await;
    let (session, _listener) = iscp_session(
        &mock,
        SessionOptions {
            auto_power: true,
            ..options()
        },
    )
    .await;

    let m = &mock;
    assert!(eventually(WAIT, || async move { m.has_received("PWR01").await }).await);
    assert_eq!(mock.count_received("PWR01").await, 1);

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_privacy_policies_accepted() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "01").await;
    mock.respond("PPSQSTN", "PPS", "000").await;
    let (session, _listener) = iscp_session(&mock, options()).await;

    let m = &mock;
    assert!(eventually(WAIT, || async move { m.has_received("PPS011").await }).await);

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_standby_on_exit() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "01").await;
    let (session, listener) = iscp_session(
        &mock,
        SessionOptions {
            standby_on_exit: true,
            ..options()
        },
    )
    .await;

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.is_on() }
    })
    .await);

    session.stop();
    session.stop();
    session.wait().await;

    let m = &mock;
    assert!(eventually(WAIT, || async move { m.has_received("PWRALL").await }).await);
    assert_eq!(session.status(), SessionStatus::Stopped);
    assert!(listener.stopped.load(Ordering::SeqCst));
    assert!(!listener.disconnected.load(Ordering::SeqCst));
    assert!(session.query(Query::PowerStatus).await.is_err());
}

#[tokio::test]
async fn test_disconnect_ends_session() {
    let mock = MockIscpReceiver::start().await;
    let (session, listener) = iscp_session(&mock, options()).await;

    let m = &mock;
    assert!(eventually(WAIT, || async move { m.has_received("PWRQSTN").await }).await);
    mock.disconnect();

    let mut status = session.watch_status();
    tokio::time::timeout(WAIT, status.wait_for(|s| *s == SessionStatus::Stopped))
        .await
        .expect("session did not stop")
        .unwrap();
    session.wait().await;

    assert!(listener.disconnected.load(Ordering::SeqCst));
    assert!(listener.stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_receiver_info_cached_and_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ReceiverCache::new(dir.path());

    let mock = MockIscpReceiver::start().await;
    mock.respond("NRIQSTN", "NRI", RECEIVER_XML).await;
    let (session, _listener) = iscp_session(
        &mock,
        SessionOptions {
            cache: Some(cache.clone()),
            ..options()
        },
    )
    .await;

    let c = &cache;
    assert!(eventually(WAIT, || async move { c.load("127.0.0.1").is_some() }).await);
    assert!(cache.load("127.0.0.1").unwrap().contains("TX-NR676E"));
    session.stop();
    session.wait().await;

    // A new session starts from the cached snapshot before any answer
    let quiet = MockIscpReceiver::start().await;
    let (session, _listener) = iscp_session(
        &quiet,
        SessionOptions {
            cache: Some(cache.clone()),
            ..options()
        },
    )
    .await;
    assert_eq!(session.state().info.model(), Some("TX-NR676E"));
    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_skip_time_messages() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "01").await;
    let (session, listener) = iscp_session(&mock, options()).await;

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.is_on() }
    })
    .await);

    session.skip_time_messages(1).await.unwrap();
    // Commands and inbound messages are separate queues; give the command a head start
    tokio::time::sleep(Duration::from_millis(100)).await;
    mock.push("NTM", "00:10/04:00").await;
    mock.push("NTM", "00:11/04:00").await;

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.last_state().is_some_and(|s| !s.current_time.is_empty()) }
    })
    .await);
    assert_eq!(listener.last_state().unwrap().current_time, "00:11");

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_listening_mode_retry_is_bounded() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("LMDQSTN", "LMD", "FF").await;
    let (session, _listener) = iscp_session(
        &mock,
        SessionOptions {
            listening_mode_retry: true,
            ..options()
        },
    )
    .await;

    let m = &mock;
    assert!(
        eventually(Duration::from_secs(8), || async move {
            m.count_received("LMDQSTN").await >= 6
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(mock.count_received("LMDQSTN").await, 6);

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_connect_failure() {
    let listener = Arc::new(RecordingListener::default());
    let result = Session::connect(
        ProtocolType::Iscp,
        "127.0.0.1",
        closed_port(),
        options(),
        listener,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_list_title_requests_xml_list() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "01").await;
    mock.respond("NLTQSTN", "NLT", PLAYBACK_TITLE).await;
    let (session, listener) = iscp_session(&mock, options()).await;

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.last_state().is_some_and(|s| s.is_playback_mode()) }
    })
    .await);
    // No list exists behind the playback view
    tokio::time::sleep(Duration::from_millis(300)).await;
    let xml_requests = |received: Vec<String>| {
        received
            .into_iter()
            .filter(|r| r.starts_with("NLAL"))
            .collect::<Vec<_>>()
    };
    assert!(xml_requests(mock.received().await).is_empty());

    mock.push("NLT", FOLDER_TITLE).await;
    let m = &mock;
    assert!(
        eventually(WAIT, || async move {
            m.received().await.iter().any(|r| r.starts_with("NLAL"))
        })
        .await
    );
    let requests = xml_requests(mock.received().await);
    assert_eq!(requests.len(), 1);
    // layer 2, items 0 to 5
    assert!(requests[0].ends_with("0200000005"), "{}", requests[0]);

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_playing_requests_track_state_and_cover() {
    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "01").await;
    let (session, listener) = iscp_session(&mock, options()).await;

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.is_on() }
    })
    .await);
    assert!(!mock.has_received("NJAREQ").await);

    mock.push("NST", "P--").await;
    let m = &mock;
    assert!(eventually(WAIT, || async move { m.has_received("NJAREQ").await }).await);
    for expected in ["NATQSTN", "NALQSTN", "NTIQSTN", "NFIQSTN", "NTRQSTN", "NTMQSTN"] {
        assert!(mock.has_received(expected).await, "{} not sent", expected);
    }

    // Still playing: nothing is asked again
    mock.push("NST", "P--").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mock.count_received("NATQSTN").await, 1);
    assert_eq!(mock.count_received("NJAREQ").await, 1);

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_multiroom_companion() {
    const OWN_MDI: &str = r#"<mdi><deviceid>BBB</deviceid><zonelist><zone id="1" groupid="3" ch="ST" role="src"/></zonelist></mdi>"#;
    const COMPANION_MDI: &str = r#"<mdi><deviceid>AAA</deviceid><zonelist><zone id="1" groupid="3" ch="ST" role="dst"/></zonelist></mdi>"#;

    let mock = MockIscpReceiver::start().await;
    mock.respond("PWRQSTN", "PWR", "01").await;
    let companion = MockIscpReceiver::start().await;
    companion.respond("MDIQSTN", "MDI", COMPANION_MDI).await;
    let (session, listener) = iscp_session(&mock, options()).await;

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.is_on() }
    })
    .await);
    mock.push("MDI", OWN_MDI).await;

    // A second name for the loopback host keeps the companion apart from the primary
    session
        .add_companion(DeviceDescriptor::new("localhost", companion.port(), ProtocolType::Iscp))
        .await
        .unwrap();
    let c = &companion;
    assert!(eventually(WAIT, || async move { c.has_received("MDIQSTN").await }).await);

    let s = &session;
    assert!(
        eventually(WAIT, || async move {
            s.state().group_members() == vec!["localhost".to_string()]
        })
        .await
    );

    // Only the multiroom codes pass the companion's filter
    companion.push("PWR", "00").await;
    companion.push("NFN", "Kitchen").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.state().is_on());

    session.send_group(Request::raw("AMT", "01")).await.unwrap();
    let (m, c) = (&mock, &companion);
    assert!(eventually(WAIT, || async move { c.has_received("AMT01").await }).await);
    assert!(eventually(WAIT, || async move { m.has_received("AMT01").await }).await);

    // Losing the companion leaves the session running
    companion.disconnect();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.is_active());
    assert!(!listener.disconnected.load(Ordering::SeqCst));
    session.send(Request::raw("AMT", "00")).await.unwrap();
    assert!(eventually(WAIT, || async move { m.has_received("AMT00").await }).await);
    assert_eq!(companion.count_received("AMT00").await, 0);

    session.stop();
    session.wait().await;
}

// =============================================================================
// DCP sessions
// =============================================================================

#[tokio::test]
async fn test_dcp_session_follow_up() {
    let mock = MockDcpReceiver::start().await;
    mock.respond("ZM?", "ZMON").await;
    let listener = Arc::new(RecordingListener::default());
    let session = Session::connect(
        ProtocolType::Dcp,
        "127.0.0.1",
        mock.port(),
        SessionOptions {
            channel: ChannelOptions {
                heos_port: closed_port(),
                http_ports: vec![closed_port()],
                ..ChannelOptions::default()
            },
            ..options()
        },
        listener.clone(),
    )
    .await
    .unwrap();

    let m = &mock;
    assert!(eventually(Duration::from_secs(5), || async move { m.has_received("SLP?").await }).await);
    let received = mock.received().await;
    for expected in ["ZM?", "SI?", "MV?", "MU?", "MS?"] {
        assert!(received.contains(&expected.to_string()), "{} not sent", expected);
    }

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.is_on() }
    })
    .await);
    assert_eq!(
        listener.last_state().unwrap().power,
        PowerStatus::On
    );

    session.stop();
    session.wait().await;
    assert!(listener.stopped.load(Ordering::SeqCst));
}

async fn dcp_session(
    mock: &MockDcpReceiver,
    channel: ChannelOptions,
) -> (Session, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let session = Session::connect(
        ProtocolType::Dcp,
        "127.0.0.1",
        mock.port(),
        SessionOptions {
            channel,
            ..options()
        },
        listener.clone(),
    )
    .await
    .unwrap();
    (session, listener)
}

#[tokio::test]
async fn test_dcp_http_fallback_port_used_for_commands() {
    let mock = MockDcpReceiver::start().await;
    mock.respond("ZM?", "ZMON").await;
    let http = MockDcpHttp::start().await;
    let (session, _listener) = dcp_session(
        &mock,
        ChannelOptions {
            heos_port: closed_port(),
            http_ports: vec![closed_port(), http.port()],
            ..ChannelOptions::default()
        },
    )
    .await;

    let s = &session;
    assert!(
        eventually(WAIT, || async move {
            s.state().info.model() == Some("AVR-X1600H")
        })
        .await
    );

    session
        .send_message(Message::SetupOperation(SetupCommand::Up))
        .await
        .unwrap();
    let h = &http;
    assert!(
        eventually(WAIT, || async move {
            h.has_request("GET /goform/formiPhoneAppDirect.xml?MNCUP").await
        })
        .await
    );
    assert!(
        eventually(WAIT, || async move { h.has_request("POST /goform/AppCommand.xml").await })
            .await
    );

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_dcp_tuner_mode_requests_tuner_state() {
    let mock = MockDcpReceiver::start().await;
    mock.respond("ZM?", "ZMON").await;
    mock.respond("TMAN?", "TMANFM").await;
    let (session, _listener) = dcp_session(
        &mock,
        ChannelOptions {
            heos_port: closed_port(),
            http_ports: vec![closed_port()],
            ..ChannelOptions::default()
        },
    )
    .await;

    let m = &mock;
    assert!(eventually(Duration::from_secs(5), || async move { m.has_received("TFANNAME?").await }).await);
    assert!(mock.has_received("TPAN?").await);
    assert!(mock.has_received("TFAN?").await);

    session.stop();
    session.wait().await;
}

#[tokio::test]
async fn test_dcp_partial_browse_is_continued() {
    const PARTIAL: &str = r#"{"heos": {"command": "browse/browse", "result": "success", "message": "sid=1024&cid=42&range=0,1&returned=2&count=5"}, "payload": [{"container": "yes", "playable": "no", "type": "album", "cid": "43", "name": "One"}, {"container": "yes", "playable": "no", "type": "album", "cid": "44", "name": "Two"}]}"#;
    const CONTINUATION: &str = "heos://browse/browse?sid=1024&cid=42&range=2,9999";

    let mock = MockDcpReceiver::start().await;
    mock.respond("ZM?", "ZMON").await;
    let heos = MockDcpReceiver::start().await;
    let (session, listener) = dcp_session(
        &mock,
        ChannelOptions {
            heos_port: heos.port(),
            http_ports: vec![closed_port()],
            ..ChannelOptions::default()
        },
    )
    .await;

    let l = listener.clone();
    assert!(eventually(WAIT, || {
        let l = l.clone();
        async move { l.is_on() }
    })
    .await);

    heos.push(PARTIAL).await;
    let h = &heos;
    assert!(eventually(WAIT, || async move { h.has_received(CONTINUATION).await }).await);

    // The same partial answer is not continued twice
    heos.push(PARTIAL).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let continued = heos
        .received()
        .await
        .iter()
        .filter(|r| r.as_str() == CONTINUATION)
        .count();
    assert_eq!(continued, 1);

    session.stop();
    session.wait().await;
}
