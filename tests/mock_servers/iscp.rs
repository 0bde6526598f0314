//! Mock ISCP receiver for testing
//!
//! Accepts one TCP connection at a time, records every frame it receives as `CODEPARAMS`
//! (e.g. `PWRQSTN`) and answers registered requests with canned frames.

use bytes::Bytes;
use onpc_core::protocol::iscp::{self, IscpDecoder};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

#[derive(Default)]
struct MockIscpState {
    received: Vec<String>,
    responses: HashMap<String, Vec<(String, String)>>,
}

/// Mock ISCP receiver
pub struct MockIscpReceiver {
    addr: SocketAddr,
    state: Arc<Mutex<MockIscpState>>,
    outgoing: mpsc::Sender<Bytes>,
    drop_connection: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl MockIscpReceiver {
    /// Start a mock receiver on a random port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(MockIscpState::default()));
        let (outgoing, mut outgoing_rx) = mpsc::channel::<Bytes>(256);
        let drop_connection = Arc::new(Notify::new());

        let handle = {
            let state = state.clone();
            let drop_connection = drop_connection.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    serve(stream, &state, &mut outgoing_rx, &drop_connection).await;
                }
            })
        };

        Self {
            addr,
            state,
            outgoing,
            drop_connection,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Answer `request` (code followed by params) with one more frame.
    pub async fn respond(&self, request: &str, code: &str, params: &str) {
        self.state
            .lock()
            .await
            .responses
            .entry(request.to_string())
            .or_default()
            .push((code.to_string(), params.to_string()));
    }

    /// Send an unsolicited frame.
    pub async fn push(&self, code: &str, params: &str) {
        let frame = iscp::encode('1', code, params).unwrap();
        self.outgoing.send(frame).await.unwrap();
    }

    /// Send arbitrary bytes, e.g. half a frame.
    pub async fn push_raw(&self, data: &[u8]) {
        self.outgoing
            .send(Bytes::copy_from_slice(data))
            .await
            .unwrap();
    }

    pub async fn received(&self) -> Vec<String> {
        self.state.lock().await.received.clone()
    }

    pub async fn has_received(&self, request: &str) -> bool {
        self.state.lock().await.received.iter().any(|r| r == request)
    }

    pub async fn count_received(&self, request: &str) -> usize {
        self.state
            .lock()
            .await
            .received
            .iter()
            .filter(|r| *r == request)
            .count()
    }

    /// Close the current connection.
    pub fn disconnect(&self) {
        self.drop_connection.notify_one();
    }
}

impl Drop for MockIscpReceiver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    stream: TcpStream,
    state: &Mutex<MockIscpState>,
    outgoing: &mut mpsc::Receiver<Bytes>,
    drop_connection: &Notify,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = IscpDecoder::new();
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            _ = drop_connection.notified() => return,
            Some(data) = outgoing.recv() => {
                if writer.write_all(&data).await.is_err() {
                    return;
                }
            }
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                decoder.push(&buf[..n]);
                while let Some(frame) = decoder.next_frame() {
                    let Ok(frame) = frame else { continue };
                    let request = format!("{}{}", frame.code, frame.params);
                    let answers = {
                        let mut s = state.lock().await;
                        s.received.push(request.clone());
                        s.responses.get(&request).cloned().unwrap_or_default()
                    };
                    for (code, params) in answers {
                        let frame = iscp::encode('1', &code, &params).unwrap();
                        if writer.write_all(&frame).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
