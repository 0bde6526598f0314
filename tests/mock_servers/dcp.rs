//! Mock DCP receiver for testing
//!
//! Speaks CR-terminated lines on the AVR port. Every received line is recorded and registered
//! lines are answered with canned replies.

use onpc_core::protocol::dcp::DcpDecoder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

#[derive(Default)]
struct MockDcpState {
    received: Vec<String>,
    responses: HashMap<String, Vec<String>>,
}

/// Mock DCP receiver
pub struct MockDcpReceiver {
    addr: SocketAddr,
    state: Arc<Mutex<MockDcpState>>,
    outgoing: mpsc::Sender<Vec<u8>>,
    drop_connection: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl MockDcpReceiver {
    /// Start a mock receiver on a random port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(MockDcpState::default()));
        let (outgoing, mut outgoing_rx) = mpsc::channel::<Vec<u8>>(256);
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

    /// Answer `request` with one more line.
    pub async fn respond(&self, request: &str, reply: &str) {
        self.state
            .lock()
            .await
            .responses
            .entry(request.to_string())
            .or_default()
            .push(reply.to_string());
    }

    /// Send one CR-terminated line.
    pub async fn push(&self, line: &str) {
        self.push_raw(format!("{}\r", line).as_bytes()).await;
    }

    /// Send arbitrary bytes; each call is one socket write.
    pub async fn push_raw(&self, data: &[u8]) {
        self.outgoing.send(data.to_vec()).await.unwrap();
    }

    pub async fn received(&self) -> Vec<String> {
        self.state.lock().await.received.clone()
    }

    pub async fn has_received(&self, line: &str) -> bool {
        self.state.lock().await.received.iter().any(|r| r == line)
    }

    /// Close the current connection.
    pub fn disconnect(&self) {
        self.drop_connection.notify_one();
    }
}

impl Drop for MockDcpReceiver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    stream: TcpStream,
    state: &Mutex<MockDcpState>,
    outgoing: &mut mpsc::Receiver<Vec<u8>>,
    drop_connection: &Notify,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = DcpDecoder::new();
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            _ = drop_connection.notified() => return,
            Some(data) = outgoing.recv() => {
                if writer.write_all(&data).await.is_err() {
                    return;
                }
                let _ = writer.flush().await;
            }
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                decoder.push(&buf[..n]);
                while let Some(line) = decoder.next_line() {
                    let answers = {
                        let mut s = state.lock().await;
                        s.received.push(line.clone());
                        s.responses.get(&line).cloned().unwrap_or_default()
                    };
                    for reply in answers {
                        if writer.write_all(format!("{}\r", reply).as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
