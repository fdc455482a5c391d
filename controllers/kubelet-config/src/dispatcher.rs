//! Keyed work dispatcher.
//!
//! Pool names are hash-partitioned over a fixed set of workers. A key always
//! lands on the same worker and each worker handles one key at a time, so two
//! reconciliations of the same pool never overlap while different pools run
//! in parallel. A key already waiting on its worker is not queued twice.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct Lane {
    sender: mpsc::UnboundedSender<String>,
    // keys sent but not yet picked up by the worker
    queued: Mutex<HashSet<String>>,
}

/// Cloneable handle for submitting keys
#[derive(Clone)]
pub struct DispatchHandle {
    lanes: Arc<Vec<Lane>>,
    shutdown: watch::Receiver<bool>,
}

impl DispatchHandle {
    /// Queues `key` on its worker.
    ///
    /// Returns `false` once shutdown has begun.
    pub fn enqueue(&self, key: impl Into<String>) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }
        let key = key.into();
        let lane = &self.lanes[worker_index(&key, self.lanes.len())];

        let mut queued = lane.queued.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if queued.contains(&key) {
            debug!("{} already queued", key);
            return true;
        }
        if lane.sender.send(key.clone()).is_err() {
            return false;
        }
        queued.insert(key);
        true
    }
}

/// Worker pool running a handler per key
pub struct Dispatcher {
    handle: DispatchHandle,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Starts `worker_count` workers.
    ///
    /// `make_handler` receives a handle so the handler can requeue keys.
    pub fn start<M, H, Fut>(worker_count: usize, make_handler: M) -> Self
    where
        M: FnOnce(DispatchHandle) -> H,
        H: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let worker_count = worker_count.max(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut receivers = Vec::with_capacity(worker_count);
        let mut lanes = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (sender, receiver) = mpsc::unbounded_channel();
            lanes.push(Lane {
                sender,
                queued: Mutex::new(HashSet::new()),
            });
            receivers.push(receiver);
        }

        let handle = DispatchHandle {
            lanes: Arc::new(lanes),
            shutdown: shutdown_rx.clone(),
        };
        let handler = Arc::new(make_handler(handle.clone()));

        let workers = receivers.into_iter()
            .enumerate()
            .map(|(index, receiver)| {
                tokio::spawn(run_worker(
                    index,
                    receiver,
                    handle.lanes.clone(),
                    handler.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!("Started {} reconciliation workers", worker_count);
        Self {
            handle,
            shutdown: shutdown_tx,
            workers,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Stops accepting keys, lets every worker finish its current key and
    /// waits for them. Keys still queued are dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("Reconciliation workers stopped");
    }
}

async fn run_worker<H, Fut>(
    index: usize,
    mut receiver: mpsc::UnboundedReceiver<String>,
    lanes: Arc<Vec<Lane>>,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) where
    H: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        if *shutdown.borrow() {
            break;
        }
        let key = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            key = receiver.recv() => match key {
                Some(key) => key,
                None => break,
            },
        };

        // Events arriving while this key runs queue it again
        lanes[index].queued.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&key);

        debug!("Worker {} handling {}", index, key);
        handler(key).await;
    }
    debug!("Worker {} exiting", index);
}

/// Worker a key is pinned to
pub fn worker_index(key: &str, worker_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % worker_count as u64) as usize
}
