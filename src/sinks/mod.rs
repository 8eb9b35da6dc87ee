//! Sinks drain traps from bounded queues on their own consumer threads.
//! The queue is the only coupling to the dispatcher: a blocking enqueue is
//! the backpressure channel, and closing the queue is the only shutdown
//! signal a consumer ever sees.
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use thiserror::Error;

use crate::log;
use crate::trap::{SnmpVersion, Trap};

pub mod exec;
pub mod file;
pub mod forward;

pub use exec::ExecSink;
pub use file::FileSink;
pub use forward::ForwardSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to open log file {0}: {1}")]
    OpenLogfile(String, #[source] std::io::Error),
    #[error("Forwarding address must be in the format '<HOST>:<PORT>', got `{0}`")]
    ForwardAddress(String),
    #[error("Forwarding traps with SNMP version {0} is not allowed")]
    ForwardVersion(SnmpVersion),
    #[error("Failed to open forwarding socket towards {0}: {1}")]
    ForwardConnect(String, #[source] std::io::Error),
}

/// A bounded trap queue with a consumer thread draining it. Owned by the
/// handler that broadcasts into it.
pub struct Sink {
    tx: Sender<Arc<Trap>>,
    consumer: JoinHandle<()>,
    desc: String,
}

impl Sink {
    /// Create the queue and start its consumer. `consume` must return only
    /// once the receiver is closed and drained.
    fn start<F>(desc: String, depth: usize, consume: F) -> Self
    where
        F: FnOnce(Receiver<Arc<Trap>>) + Send + 'static,
    {
        let (tx, rx) = bounded(depth);
        let consumer = thread::spawn(move || consume(rx));

        Self { tx, consumer, desc }
    }

    /// Blocking enqueue. A full queue stalls the caller (and with it the
    /// dispatcher); `false` means the consumer is gone and the trap was
    /// skipped.
    pub fn send(&self, trap: Arc<Trap>) -> bool {
        self.tx.send(trap).is_ok()
    }

    pub fn describe(&self) -> &str {
        &self.desc
    }

    /// Close the queue and wait for the consumer to drain its remaining
    /// traps and release its I/O resource.
    pub fn close(self) {
        drop(self.tx);
        if self.consumer.join().is_err() {
            log::err(format!("{} consumer panicked during drain", self.desc));
        }
    }
}

/// A sink that records every trap it receives; lets tests observe what a
/// handler delivered and in which order.
#[cfg(test)]
pub fn capture() -> (Sink, Receiver<Arc<Trap>>) {
    let (seen_tx, seen_rx) = crossbeam_channel::unbounded();
    let sink = Sink::start("capture sink".to_string(), 16, move |traps| {
        for trap in traps.iter() {
            seen_tx.send(trap).unwrap();
        }
    });

    (sink, seen_rx)
}
