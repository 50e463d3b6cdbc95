//! Response processor - sends verdicts back to the requesting peer.
//!
//! Consumes: OutboundVerdict
//! Writes: UDP socket
//!
//! On cancellation the queue is flushed until the decision stage drops its
//! sender, so every decided verdict still reaches its peer.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::telemetry::counters;

use super::OutboundVerdict;

/// Processor that writes verdicts to the socket. Failed sends are not retried.
pub struct ResponseProcessor {
    socket: Arc<UdpSocket>,
    rx: mpsc::Receiver<OutboundVerdict>,
    cancel: CancellationToken,
}

impl ResponseProcessor {
    pub fn new(
        socket: Arc<UdpSocket>,
        rx: mpsc::Receiver<OutboundVerdict>,
        cancel: CancellationToken,
    ) -> Self {
        Self { socket, rx, cancel }
    }

    /// Run until the decision stage goes away, flushing after cancellation
    pub async fn run(mut self) {
        loop {
            let out = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(out) => out,
                    None => break,
                },
            };
            self.send(out).await;
        }

        let mut flushed = 0usize;
        while let Some(out) = self.rx.recv().await {
            self.send(out).await;
            flushed += 1;
        }

        info!(flushed, "response processor stopped");
    }

    async fn send(&self, out: OutboundVerdict) {
        match self.socket.send_to(out.verdict.as_bytes(), out.peer).await {
            Ok(_) => {
                trace!(peer = %out.peer, verdict = %out.verdict, "verdict sent");
            }
            Err(e) => {
                warn!(peer = %out.peer, verdict = %out.verdict, error = %e, "failed to send verdict");
                counters::send_failed();
            }
        }
    }
}
