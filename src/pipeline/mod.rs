//! UDP attach pipeline.
//!
//! Three processors connected by bounded queues:
//!
//! ```text
//!  UDP socket                                                UDP socket
//!  ──────────                                                ──────────
//!      │ recv_from                                              ▲ send_to
//!      ▼                                                        │
//! ┌──────────┐  InboundDatagram  ┌──────────┐  OutboundVerdict ┌──────────┐
//! │ Ingress  ├──────────────────>│ Decision ├─────────────────>│ Response │
//! │processor │   (bounded mpsc)  │processor │  (bounded mpsc)  │processor │
//! └──────────┘                   └────┬─────┘                  └──────────┘
//!                                     │
//!                          blacklist + session registry
//! ```
//!
//! Producers wait for queue capacity instead of dropping, so a slow stage
//! pushes back all the way to the socket receive buffer. Every processor
//! watches a [`CancellationToken`]. Once a datagram has been decided its
//! verdict is always handed to the response processor, which flushes its
//! queue before exiting, so cancellation never loses a reply for a
//! session that was already created.

mod decision;
mod egress;
mod ingress;
mod worker;

pub use decision::Decider;
pub use egress::ResponseProcessor;
pub use ingress::IngressProcessor;
pub use worker::DecisionProcessor;

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::telemetry::counters;

/// One received attach request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram {
    pub payload: Vec<u8>,
    pub peer: SocketAddr,
}

/// Reply to one attach request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundVerdict {
    pub verdict: Verdict,
    pub peer: SocketAddr,
}

/// Outcome of an attach decision, sent back as ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// New session admitted
    Created,
    /// Session already existed and was refreshed
    Exists,
    /// Subscriber is blacklisted
    Rejected,
    /// Payload did not decode to a 12-15 digit IMSI
    Invalid,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Created => "created",
            Verdict::Exists => "exists",
            Verdict::Rejected => "rejected",
            Verdict::Invalid => "invalid",
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push `item` into a bounded queue, waiting for capacity.
///
/// Returns `false` if the consumer is gone or `cancel` fired while waiting.
pub(crate) async fn enqueue<T>(
    tx: &mpsc::Sender<T>,
    item: T,
    queue: &'static str,
    cancel: &CancellationToken,
) -> bool {
    let item = match tx.try_send(item) {
        Ok(()) => return true,
        Err(TrySendError::Closed(_)) => return false,
        Err(TrySendError::Full(item)) => item,
    };

    counters::queue_backpressure(queue);

    tokio::select! {
        result = tx.send(item) => result.is_ok(),
        _ = cancel.cancelled() => false,
    }
}

/// Push `item` into a bounded queue, waiting for capacity regardless of
/// cancellation.
///
/// Used for results whose side effects already happened. Returns `false`
/// only if the consumer is gone.
pub(crate) async fn deliver<T>(tx: &mpsc::Sender<T>, item: T, queue: &'static str) -> bool {
    let item = match tx.try_send(item) {
        Ok(()) => return true,
        Err(TrySendError::Closed(_)) => return false,
        Err(TrySendError::Full(item)) => item,
    };

    counters::queue_backpressure(queue);
    tx.send(item).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_verdict_wire_text() {
        assert_eq!(Verdict::Created.as_bytes(), b"created");
        assert_eq!(Verdict::Exists.as_bytes(), b"exists");
        assert_eq!(Verdict::Rejected.as_bytes(), b"rejected");
        assert_eq!(Verdict::Invalid.to_string(), "invalid");
    }

    #[tokio::test]
    async fn test_enqueue_waits_for_capacity() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        assert!(enqueue(&tx, 1u32, "test", &cancel).await);

        let producer = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { enqueue(&tx, 2u32, "test", &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(rx.recv().await, Some(1));
        assert!(producer.await.unwrap());
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_enqueue_gives_up_on_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        assert!(enqueue(&tx, 1u32, "test", &cancel).await);

        let waiter = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { enqueue(&tx, 2u32, "test", &cancel).await })
        };

        cancel.cancel();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_closed_queue() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(rx);
        assert!(!enqueue(&tx, 1, "test", &CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_deliver_ignores_cancellation() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        assert!(deliver(&tx, 1u32, "test").await);

        let producer = {
            let tx = tx.clone();
            tokio::spawn(async move { deliver(&tx, 2u32, "test").await })
        };

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(rx.recv().await, Some(1));
        assert!(producer.await.unwrap());
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_deliver_closed_queue() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(rx);
        assert!(!deliver(&tx, 1, "test").await);
    }
}
