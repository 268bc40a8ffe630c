//! Dedicated inference thread draining the dispatch queue

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::pipeline::dispatch::DispatchReceiver;
use crate::pipeline::engine::{InferenceEngine, InferenceResult};
use crate::Error;

pub type SharedEngine = Arc<Mutex<InferenceEngine>>;

/// Most recent result the worker produced, tagged with its request
#[derive(Debug, Clone, Serialize)]
pub struct CompletedInference {
    pub request_id: u64,
    pub captured_at: Duration,
    pub result: InferenceResult,
}

pub(crate) fn lock_engine(engine: &SharedEngine) -> MutexGuard<'_, InferenceEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawn a named thread that inherits the caller's tracing dispatcher.
fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

pub struct InferenceWorker {
    handle: thread::JoinHandle<()>,
}

impl InferenceWorker {
    /// Run until every sender of `rx` is dropped.
    pub fn spawn(
        rx: DispatchReceiver,
        engine: SharedEngine,
        latest: Arc<ArcSwapOption<CompletedInference>>,
        poll: Duration,
    ) -> io::Result<Self> {
        let handle = spawn_thread("inference-worker", move || serve(rx, engine, latest, poll))?;
        Ok(Self { handle })
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("inference worker panicked");
        }
    }
}

fn serve(
    rx: DispatchReceiver,
    engine: SharedEngine,
    latest: Arc<ArcSwapOption<CompletedInference>>,
    poll: Duration,
) {
    info!("Inference worker started");
    loop {
        let request = match rx.receive(poll) {
            Ok(request) => request,
            Err(Error::QueueTimeout(_)) => continue,
            Err(_) => break,
        };
        debug!(id = request.id, bytes = request.data.len(), "analyzing photo");

        let outcome = lock_engine(&engine).run(&request.data);
        match outcome {
            Ok(result) => latest.store(Some(Arc::new(CompletedInference {
                request_id: request.id,
                captured_at: request.captured_at,
                result,
            }))),
            Err(e) => warn!(id = request.id, error = %e, "inference failed"),
        }
    }
    info!("Inference worker stopped");
}
