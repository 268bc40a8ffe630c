//! Bounded hand-off of captured photos to the inference worker

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use flume::{RecvTimeoutError, SendTimeoutError};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::capture::frame::{copy_owned, Frame};
use crate::{Error, Result};

/// Photo queued for analysis. `data` is a private copy, never the cache's buffer.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Correlates the request with the result the worker publishes
    pub id: u64,
    pub data: Bytes,
    pub captured_at: Duration,
}

/// A request that was not queued, handed back so the caller can retry it
/// with the same id and bytes.
#[derive(Debug, ThisError)]
#[error("{error}")]
pub struct SendFailure {
    pub error: Error,
    pub request: CaptureRequest,
}

impl From<SendFailure> for Error {
    fn from(failure: SendFailure) -> Self {
        failure.error
    }
}

/// Create a queue holding at most `capacity` pending requests.
pub fn channel(capacity: usize) -> (DispatchSender, DispatchReceiver) {
    let (tx, rx) = flume::bounded(capacity);
    (
        DispatchSender {
            tx,
            capacity,
            next_id: Arc::new(AtomicU64::new(1)),
        },
        DispatchReceiver { rx },
    )
}

#[derive(Clone)]
pub struct DispatchSender {
    tx: flume::Sender<CaptureRequest>,
    capacity: usize,
    next_id: Arc<AtomicU64>,
}

impl DispatchSender {
    /// Copy `frame` into a new request with a fresh id.
    pub fn request_for(&self, frame: &Frame) -> Result<CaptureRequest> {
        Ok(CaptureRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            data: copy_owned(&frame.data)?,
            captured_at: frame.meta.captured_at,
        })
    }

    /// Enqueue, waiting up to `timeout` for room. On failure nothing has
    /// reached the worker and the request comes back in the error.
    pub async fn send(
        &self,
        request: CaptureRequest,
        timeout: Duration,
    ) -> std::result::Result<(), SendFailure> {
        let id = request.id;
        // Bytes clone is a refcount bump; the pending send owns one handle
        let retained = request.clone();
        match tokio::time::timeout(timeout, self.tx.send_async(request)).await {
            Ok(Ok(())) => {
                debug!(id, pending = self.tx.len(), "request queued");
                Ok(())
            }
            Ok(Err(flume::SendError(request))) => Err(SendFailure {
                error: Error::QueueClosed,
                request,
            }),
            Err(_) => {
                warn!(id, ?timeout, "dispatch queue full");
                Err(SendFailure {
                    error: Error::QueueTimeout(timeout),
                    request: retained,
                })
            }
        }
    }

    /// Blocking variant of [`send`](Self::send) for non-async callers.
    pub fn send_blocking(
        &self,
        request: CaptureRequest,
        timeout: Duration,
    ) -> std::result::Result<(), SendFailure> {
        let id = request.id;
        self.tx.send_timeout(request, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(request) => {
                warn!(id, ?timeout, "dispatch queue full");
                SendFailure {
                    error: Error::QueueTimeout(timeout),
                    request,
                }
            }
            SendTimeoutError::Disconnected(request) => SendFailure {
                error: Error::QueueClosed,
                request,
            },
        })
    }

    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub struct DispatchReceiver {
    rx: flume::Receiver<CaptureRequest>,
}

impl DispatchReceiver {
    /// Wait up to `timeout` for the next request.
    pub fn receive(&self, timeout: Duration) -> Result<CaptureRequest> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::QueueTimeout(timeout),
            RecvTimeoutError::Disconnected => Error::QueueClosed,
        })
    }
}
