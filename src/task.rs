// Remote call tasks.
//
// Each remote call runs on its own worker thread and reports back over a
// channel. Results are only rendered on the console thread, when it drains
// the pool. A cancelled task may still finish its HTTP request, but its
// completion is dropped and never reaches the transcript.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::api::{Backend, RemoteError};
use crate::router::RemoteCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Completion {
    pub id: TaskId,
    pub label: String,
    pub outcome: Result<String, RemoteError>,
}

struct InFlight {
    label: String,
    token: CancelToken,
}

pub struct TaskPool<B: Backend> {
    backend: Arc<B>,
    next_id: u64,
    in_flight: BTreeMap<TaskId, InFlight>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl<B: Backend> TaskPool<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (tx, rx) = mpsc::channel();
        TaskPool {
            backend,
            next_id: 0,
            in_flight: BTreeMap::new(),
            tx,
            rx,
        }
    }

    /// Starts `call` on a worker thread. `label` travels with the result.
    pub fn spawn(&mut self, label: &str, call: RemoteCall) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        let token = CancelToken::default();
        self.in_flight.insert(
            id,
            InFlight {
                label: label.to_string(),
                token: token.clone(),
            },
        );

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let label = label.to_string();
        thread::spawn(move || {
            if token.is_cancelled() {
                return;
            }
            let outcome = backend.fetch(&call);
            if token.is_cancelled() {
                debug!(?id, "dropping result of cancelled task");
                return;
            }
            // the receiver is gone only when the console has shut down
            let _ = tx.send(Completion { id, label, outcome });
        });
        debug!(?id, "spawned remote task");
        id
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Cancels every in-flight task and returns their labels, oldest first.
    pub fn cancel_all(&mut self) -> Vec<String> {
        let cancelled: Vec<String> = std::mem::take(&mut self.in_flight)
            .into_values()
            .map(|task| {
                task.token.cancel();
                task.label
            })
            .collect();
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "cancelled remote tasks");
        }
        cancelled
    }

    /// Completions that arrived since the last drain, in arrival order.
    pub fn drain(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            self.accept(completion, &mut done);
        }
        done
    }

    /// Blocks until every in-flight task has reported or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<Completion> {
        let deadline = Instant::now() + timeout;
        let mut done = Vec::new();
        while !self.in_flight.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(completion) => self.accept(completion, &mut done),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(pending = self.in_flight.len(), "tasks still running");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        done
    }

    fn accept(&mut self, completion: Completion, done: &mut Vec<Completion>) {
        // cancelled tasks are no longer tracked
        if self.in_flight.remove(&completion.id).is_some() {
            done.push(completion);
        }
    }
}
