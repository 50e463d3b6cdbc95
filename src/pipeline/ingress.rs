//! Ingress processor - reads attach datagrams off the socket.
//!
//! Reads: UDP socket
//! Produces: InboundDatagram

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::telemetry::counters;

use super::{enqueue, InboundDatagram};

/// Processor that receives datagrams and queues them for decision
pub struct IngressProcessor {
    socket: Arc<UdpSocket>,
    tx: mpsc::Sender<InboundDatagram>,
    recv_buffer: usize,
    cancel: CancellationToken,
}

impl IngressProcessor {
    pub fn new(
        socket: Arc<UdpSocket>,
        tx: mpsc::Sender<InboundDatagram>,
        recv_buffer: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            socket,
            tx,
            recv_buffer: recv_buffer.max(1),
            cancel,
        }
    }

    /// Run until cancelled or the decision stage goes away
    pub async fn run(self) {
        let mut buf = vec![0u8; self.recv_buffer];

        loop {
            let (len, peer) = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "UDP receive failed");
                        counters::datagram_discarded("recv_error");
                        continue;
                    }
                },
            };

            counters::datagram_received(len);

            if len == 0 {
                debug!(peer = %peer, "empty datagram discarded");
                counters::datagram_discarded("empty");
                continue;
            }

            trace!(peer = %peer, bytes = len, "datagram received");

            let datagram = InboundDatagram {
                payload: buf[..len].to_vec(),
                peer,
            };

            if !enqueue(&self.tx, datagram, "inbound", &self.cancel).await {
                break;
            }
        }

        info!("ingress processor stopped");
    }
}
