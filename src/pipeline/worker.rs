//! Decision processor - turns each inbound datagram into exactly one verdict.
//!
//! Consumes: InboundDatagram
//! Produces: OutboundVerdict
//!
//! Cancellation is only observed between datagrams. A decided verdict is
//! always delivered, since the registry may already hold its session.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace};

use crate::telemetry::counters;

use super::{deliver, Decider, InboundDatagram, OutboundVerdict};

/// Processor that applies the attach decision
pub struct DecisionProcessor {
    decider: Decider,
    rx: mpsc::Receiver<InboundDatagram>,
    tx: mpsc::Sender<OutboundVerdict>,
    cancel: CancellationToken,
}

impl DecisionProcessor {
    pub fn new(
        decider: Decider,
        rx: mpsc::Receiver<InboundDatagram>,
        tx: mpsc::Sender<OutboundVerdict>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            decider,
            rx,
            tx,
            cancel,
        }
    }

    /// Run until cancelled or the ingress stage goes away
    pub async fn run(mut self) {
        loop {
            let datagram = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(datagram) => datagram,
                    None => break,
                },
            };

            let verdict = self.process(datagram);

            if !deliver(&self.tx, verdict, "outbound").await {
                break;
            }
        }

        info!("decision processor stopped");
    }

    #[instrument(level = "trace", skip_all, fields(peer = %datagram.peer))]
    fn process(&self, datagram: InboundDatagram) -> OutboundVerdict {
        let verdict = self.decider.decide(&datagram.payload);

        trace!(verdict = %verdict, "attach decided");
        counters::verdict(verdict.as_str());

        OutboundVerdict {
            verdict,
            peer: datagram.peer,
        }
    }
}
