//! ISCP channel: one TCP stream carrying eISCP frames both ways.

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{connect_tcp, read_buffer, read_failed, ChannelContext, Sink};
use crate::messages::{decode_iscp, Request};
use crate::protocol::iscp::IscpDecoder;

pub(crate) struct IscpConnection {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl IscpConnection {
    pub(crate) async fn open(host: &str, port: u16) -> Result<Self> {
        let stream = connect_tcp(host, port).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    pub(crate) fn spawn(self, ctx: ChannelContext) {
        let IscpConnection { reader, writer } = self;
        let ChannelContext {
            sink,
            outbound,
            shutdown,
            ..
        } = ctx;

        let read_shutdown = shutdown.clone();
        tokio::spawn(async move {
            read_loop(reader, &sink, read_shutdown.clone()).await;
            read_shutdown.cancel();
            sink.disconnected().await;
        });
        tokio::spawn(write_loop(writer, outbound, shutdown));
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    sink: &Sink,
    shutdown: CancellationToken,
) {
    let mut decoder = IscpDecoder::new();
    let mut buf = read_buffer();
    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => return,
            r = reader.read(&mut buf) => r,
        };
        if read_failed(&sink.host, sink.port, &result) {
            return;
        }
        let n = result.unwrap_or(0);
        decoder.push(&buf[..n]);

        while let Some(frame) = decoder.next_frame() {
            let frame = match frame {
                Ok(f) => f,
                Err(e) => {
                    warn!("{}:{} dropped frame: {}", sink.host, sink.port, e);
                    continue;
                }
            };
            let message = match decode_iscp(&frame) {
                Ok(m) => m,
                Err(e) => {
                    warn!("{}:{} ignored {}: {}", sink.host, sink.port, frame.code, e);
                    continue;
                }
            };
            debug!("<< {}:{} {}{}", sink.host, sink.port, frame.code, frame.params);
            if !sink.push(message, frame.params).await {
                return;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Request>,
    shutdown: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            r = outbound.recv() => match r {
                Some(r) => r,
                None => break,
            },
        };
        let Some(frame) = request.to_iscp() else {
            debug!("No ISCP form for {}", request.label());
            continue;
        };
        let Some(bytes) = frame.encode() else {
            warn!("Cannot encode {}{}", frame.code, frame.params);
            continue;
        };
        debug!(">> {}{}", frame.code, frame.params);
        if let Err(e) = writer.write_all(&bytes).await {
            warn!("ISCP write failed: {}", e);
            shutdown.cancel();
            break;
        }
    }
    let _ = writer.shutdown().await;
}
