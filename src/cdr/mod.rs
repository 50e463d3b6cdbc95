//! Call Detail Records (CDR) module.
//!
//! Billing log for session state transitions. Producers (the session
//! registry and the decision worker) hold a [`CdrHandle`] and never block;
//! a [`CdrProcessor`] task appends records to the configured writers.

mod types;
mod writer;

pub use types::{Cdr, CdrAction};
pub use writer::{CdrError, CdrFormat, CdrWriter, FileCdrWriter, MemoryCdrWriter};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::telemetry::counters;

/// CDR handle for submitting records.
///
/// The channel is unbounded: submitting never blocks and never drops a
/// record while the processor is alive.
#[derive(Debug, Clone)]
pub struct CdrHandle {
    tx: mpsc::UnboundedSender<Cdr>,
}

impl CdrHandle {
    /// Create a handle and the receiving end, without a processor.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Cdr>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Submit a record. Fails only once the processor has gone away.
    pub fn submit(&self, cdr: Cdr) {
        if let Err(mpsc::error::SendError(cdr)) = self.tx.send(cdr) {
            error!(imsi = %cdr.imsi, action = %cdr.action, "CDR processor closed, record dropped");
            counters::cdr_dropped("closed");
        }
    }
}

/// CDR processor that writes records to configured backends.
pub struct CdrProcessor {
    rx: mpsc::UnboundedReceiver<Cdr>,
    writers: Vec<Arc<dyn CdrWriter>>,
}

impl CdrProcessor {
    pub fn new(rx: mpsc::UnboundedReceiver<Cdr>, writers: Vec<Arc<dyn CdrWriter>>) -> Self {
        Self { rx, writers }
    }

    /// Run until every [`CdrHandle`] is dropped, then flush the writers.
    pub async fn run(mut self) {
        info!(writers = self.writers.len(), "CDR processor started");

        while let Some(cdr) = self.rx.recv().await {
            debug!(imsi = %cdr.imsi, action = %cdr.action, "processing CDR");

            for writer in &self.writers {
                match writer.write(&cdr).await {
                    Ok(()) => counters::cdr_written(writer.name()),
                    Err(e) => {
                        error!(
                            writer = writer.name(),
                            imsi = %cdr.imsi,
                            action = %cdr.action,
                            error = %e,
                            "failed to write CDR"
                        );
                        counters::cdr_write_failed(writer.name());
                    }
                }
            }
        }

        for writer in &self.writers {
            if let Err(e) = writer.flush().await {
                error!(writer = writer.name(), error = %e, "failed to flush CDR writer");
            }
        }

        info!("CDR processor stopped");
    }
}

/// Start the CDR subsystem.
pub fn start(writers: Vec<Arc<dyn CdrWriter>>) -> (CdrHandle, JoinHandle<()>) {
    let (handle, rx) = CdrHandle::channel();
    let processor = CdrProcessor::new(rx, writers);

    let task = tokio::spawn(async move {
        processor.run().await;
    });

    (handle, task)
}
