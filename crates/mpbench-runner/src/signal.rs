//! One-shot completion signals between the activities of a run.
//!
//! A [`DoneSignal`] fires exactly once, when it is consumed or dropped, so an
//! activity that panics still releases whoever waits on it. Any number of
//! [`DoneListener`] clones observe the same firing.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Creates a connected signal/listener pair.
pub fn done_signal() -> (DoneSignal, DoneListener) {
    let (tx, rx) = bounded(0);
    (DoneSignal { _tx: tx }, DoneListener { rx })
}

/// Write side. Nothing is ever sent; disconnecting the channel is the signal.
pub struct DoneSignal {
    _tx: Sender<()>,
}

impl DoneSignal {
    pub fn fire(self) {}
}

#[derive(Clone)]
pub struct DoneListener {
    rx: Receiver<()>,
}

impl DoneListener {
    /// Waits up to `timeout`. Returns `true` if the signal fired first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        matches!(self.rx.try_recv(), Ok(()) | Err(TryRecvError::Disconnected))
    }
}
