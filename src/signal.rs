//! Flush-request signal from contexts to the host
//!
//! A one-shot wake-up: the script thread never blocks on it and the host
//! decides on its own when to drain.

use crate::context::ContextId;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::debug;
use std::time::Duration;

/// Request to drain one context's command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRequest {
    pub context_id: ContextId,
    pub dedicated: bool,
}

/// Sending side, held by every context
#[derive(Debug, Clone, Default)]
pub struct FlushSignal {
    tx: Option<Sender<FlushRequest>>,
}

/// Receiving side, held by the host
#[derive(Debug)]
pub struct FlushReceiver {
    rx: Receiver<FlushRequest>,
}

/// Create a connected signal/receiver pair
pub fn flush_channel() -> (FlushSignal, FlushReceiver) {
    let (tx, rx) = channel::unbounded();
    (FlushSignal { tx: Some(tx) }, FlushReceiver { rx })
}

impl FlushSignal {
    /// A signal nobody listens to
    pub fn detached() -> Self {
        FlushSignal { tx: None }
    }

    /// Fire and forget; returns whether a host is still listening
    pub fn request(&self, request: FlushRequest) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(request) {
            Ok(()) => {
                debug!("flush requested for context {}", request.context_id);
                true
            }
            Err(_) => {
                debug!(
                    "flush request for context {} dropped: host gone",
                    request.context_id
                );
                false
            }
        }
    }
}

impl FlushReceiver {
    /// Block until a request arrives; `None` once every signal is dropped
    pub fn recv(&self) -> Option<FlushRequest> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<FlushRequest> {
        match self.rx.recv_timeout(timeout) {
            Ok(request) => Some(request),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<FlushRequest> {
        match self.rx.try_recv() {
            Ok(request) => Some(request),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Every request queued right now
    pub fn pending(&self) -> Vec<FlushRequest> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_delivered() {
        let (signal, receiver) = flush_channel();
        let request = FlushRequest {
            context_id: ContextId(1),
            dedicated: false,
        };
        assert!(signal.request(request));
        assert_eq!(receiver.try_recv(), Some(request));
        assert_eq!(receiver.try_recv(), None);
    }

    #[test]
    fn test_detached_and_disconnected() {
        let request = FlushRequest {
            context_id: ContextId(2),
            dedicated: true,
        };
        assert!(!FlushSignal::detached().request(request));

        let (signal, receiver) = flush_channel();
        drop(receiver);
        assert!(!signal.request(request));
    }

    #[test]
    fn test_recv_ends_when_senders_dropped() {
        let (signal, receiver) = flush_channel();
        drop(signal);
        assert_eq!(receiver.recv(), None);
        assert_eq!(receiver.recv_timeout(Duration::from_millis(1)), None);
    }
}
