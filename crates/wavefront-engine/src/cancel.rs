//! Cancellation controller — a single-slot flag set from outside the engine.

use std::sync::Arc;

use tokio::sync::watch;

/// Write side, held by whoever may cancel the release.
#[derive(Debug, Clone)]
pub struct CancellationController {
    tx: Arc<watch::Sender<bool>>,
}

/// Read side, polled by the engine at its check points.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected controller/token pair.
pub fn cancellation() -> (CancellationController, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancellationController { tx: Arc::new(tx) },
        CancellationToken { rx },
    )
}

impl CancellationController {
    /// Request cancellation. Never blocks.
    ///
    /// Returns `true` only for the signal that actually set the flag;
    /// repeats are no-ops.
    pub fn signal(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_signalled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new read side observing this controller.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
