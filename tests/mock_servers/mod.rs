//! Mock receivers for integration testing
//!
//! These mock servers simulate the TCP side of real receivers (ISCP and DCP) and the Denon HTTP
//! endpoint, allowing full channel and session testing without hardware.

#![allow(dead_code)]

pub mod dcp;
pub mod http;
pub mod iscp;

pub use dcp::MockDcpReceiver;
pub use http::MockDcpHttp;
pub use iscp::MockIscpReceiver;

use std::time::Duration;

/// Polls `check` every 20 ms until it holds or `wait` elapses.
pub async fn eventually<F, Fut>(wait: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
