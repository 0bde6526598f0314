//! Mock Denon HTTP endpoint for testing
//!
//! Serves `Deviceinfo.xml` and records every `goform` request as `"<METHOD> <path?query>"`.

use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub const DEVICE_INFO_XML: &str = "<Device_Info><ModelName>AVR-X1600H</ModelName>\
    <BrandCode>0</BrandCode><DeviceZones>2</DeviceZones>\
    <MacAddress>0005CD123456</MacAddress></Device_Info>";

#[derive(Default)]
struct MockHttpState {
    requests: Vec<String>,
}

type SharedState = Arc<RwLock<MockHttpState>>;

/// Mock receiver HTTP server
pub struct MockDcpHttp {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl MockDcpHttp {
    /// Start a mock HTTP endpoint on a random port
    pub async fn start() -> Self {
        let state = SharedState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn requests(&self) -> Vec<String> {
        self.state.read().await.requests.clone()
    }

    pub async fn has_request(&self, request: &str) -> bool {
        self.state.read().await.requests.iter().any(|r| r == request)
    }
}

impl Drop for MockDcpHttp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle(State(state): State<SharedState>, method: Method, uri: Uri) -> (StatusCode, String) {
    let target = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    state
        .write()
        .await
        .requests
        .push(format!("{} {}", method, target));

    match uri.path() {
        "/goform/Deviceinfo.xml" => (StatusCode::OK, DEVICE_INFO_XML.to_string()),
        "/goform/AppCommand.xml" => (
            StatusCode::OK,
            "<rx><cmd><zone1>Living</zone1><zone2>Patio</zone2></cmd></rx>".to_string(),
        ),
        p if p.starts_with("/goform/") => (StatusCode::OK, String::new()),
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}
