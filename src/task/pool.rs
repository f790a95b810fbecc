//! Bounded, self-feeding worker pool.
//!
//! Units are queued on an unbounded channel, so submitting never blocks even
//! from inside a running unit. A [`PoolRunner`] keeps at most `concurrency`
//! units in a [`JoinSet`]. Every submitted unit carries a guard on the shared
//! outstanding counter; the guard is released when the unit finishes, panics
//! or is discarded unstarted, so the counter reaching zero means the pool has
//! truly drained.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::PoolError;

type BoxedUnit = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct OutstandingGuard(Arc<AtomicUsize>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Unit {
    work: BoxedUnit,
    guard: OutstandingGuard,
}

pub struct WorkerPool {
    sender: Mutex<Option<UnboundedSender<Unit>>>,
    outstanding: Arc<AtomicUsize>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> (Arc<Self>, PoolRunner) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            concurrency: concurrency.max(1),
        });
        let runner = PoolRunner {
            rx,
            pool: pool.clone(),
        };
        (pool, runner)
    }

    /// Queues a unit. On failure the outstanding count is already released.
    pub fn submit<F>(&self, work: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let unit = Unit {
            work: Box::pin(work),
            guard: OutstandingGuard(self.outstanding.clone()),
        };

        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match sender {
            Some(tx) => tx.send(unit).map_err(|_| PoolError::Closed),
            None => Err(PoolError::Closed),
        }
    }

    /// Stops accepting work. Already queued units stay queued.
    pub fn close(&self) {
        let mut sender = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if sender.take().is_some() {
            debug!("worker pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Units submitted and not yet finished or discarded.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

pub struct PoolRunner {
    rx: UnboundedReceiver<Unit>,
    pool: Arc<WorkerPool>,
}

impl PoolRunner {
    /// Runs queued units until the outstanding count drops to zero.
    ///
    /// When `cancel` fires the pool is closed, queued units are discarded and
    /// in-flight units are awaited before returning.
    pub async fn run(mut self, cancel: &CancellationToken) {
        let concurrency = self.pool.concurrency;
        let mut set = JoinSet::new();

        loop {
            if cancel.is_cancelled() {
                self.shutdown(&mut set).await;
                return;
            }

            while set.len() < concurrency {
                let Ok(unit) = self.rx.try_recv() else {
                    break;
                };
                spawn_unit(&mut set, unit);
            }

            if set.is_empty() && self.pool.outstanding() == 0 {
                return;
            }

            tokio::select! {
                joined = set.join_next(), if !set.is_empty() => {
                    if let Some(Err(err)) = joined {
                        error!(error = %err, "crawl unit failed");
                    }
                }
                next = self.rx.recv(), if set.len() < concurrency => {
                    match next {
                        Some(unit) => spawn_unit(&mut set, unit),
                        None if set.is_empty() => return,
                        None => {}
                    }
                }
                _ = cancel.cancelled() => {}
            }
        }
    }

    async fn shutdown(&mut self, set: &mut JoinSet<()>) {
        self.pool.close();
        let mut discarded = 0usize;
        while let Ok(unit) = self.rx.try_recv() {
            drop(unit);
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "queued units dropped on cancel");
        }
        while let Some(joined) = set.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "crawl unit failed");
            }
        }
    }
}

fn spawn_unit(set: &mut JoinSet<()>, unit: Unit) {
    let Unit { work, guard } = unit;
    set.spawn(async move {
        let _guard = guard;
        work.await;
    });
}
