// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parallel dispatch: run a batch of work items concurrently, one freshly
//! spawned execution unit per item, each bound as current for its worker
//! task and flushed through the multiplexer exactly once on completion.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use weft_core::{ExecutionId, IdGen, UnitOutcome, UuidIdGen};

use crate::context;
use crate::error::PoolError;
use crate::mux::OutputMux;
use crate::sink::Sink;
use crate::unit_log::UnitLogStore;

/// How many workers may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// At most this many items run concurrently.
    Limited(usize),
    /// One worker per item, all at once.
    #[default]
    Unlimited,
}

/// Recognized options for one parallel batch.
#[derive(Debug, Clone, Default)]
pub struct ParallelOptions {
    pub concurrency: Concurrency,
    /// When set, every spawned unit logs into this one bucket instead of
    /// getting a fresh one.
    pub execution_id: Option<ExecutionId>,
}

/// Spawns and joins batches of parallel work under the output multiplexer.
pub struct Dispatcher<W: Sink, G: IdGen = UuidIdGen> {
    mux: Arc<OutputMux<W>>,
    store: Option<Arc<UnitLogStore>>,
    ids: G,
}

impl<W: Sink> Dispatcher<W, UuidIdGen> {
    pub fn new(mux: Arc<OutputMux<W>>) -> Self {
        Self {
            mux,
            store: None,
            ids: UuidIdGen,
        }
    }
}

impl<W: Sink, G: IdGen + 'static> Dispatcher<W, G> {
    /// Attach a durable per-unit log store; outcomes and log buckets are
    /// recorded there for every spawned unit.
    pub fn with_store(mut self, store: Arc<UnitLogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the execution-id generator (deterministic ids in tests).
    pub fn with_id_gen<H: IdGen>(self, ids: H) -> Dispatcher<W, H> {
        Dispatcher {
            mux: self.mux,
            store: self.store,
            ids,
        }
    }

    /// Run `work` once per item and collect the results in input order.
    ///
    /// The parent of every spawned unit is the unit active at call time.
    /// The first work error is returned once every worker has been joined
    /// and all buffered output has been drained; sibling workers are never
    /// abandoned because one failed.
    pub async fn map<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        options: ParallelOptions,
        work: F,
    ) -> Result<Vec<R>, PoolError<E>>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        // Drop anything stranded by a previous, already-failed batch.
        self.mux.release();

        let limiter = match options.concurrency {
            Concurrency::Limited(n) => Some(Arc::new(Semaphore::new(n.max(1)))),
            Concurrency::Unlimited => None,
        };
        let parent = context::current_unit().unwrap_or_else(|| Arc::clone(self.mux.root()));

        let mut workers = Vec::with_capacity(items.len());
        for item in items {
            let unit = parent.spawn();
            let bucket = options
                .execution_id
                .clone()
                .unwrap_or_else(|| ExecutionId::new(self.ids.next()));
            unit.set_execution_id(bucket);

            let mux = Arc::clone(&self.mux);
            let store = self.store.clone();
            let work = work.clone();
            let limiter = limiter.clone();
            let task_unit = Arc::clone(&unit);

            let handle = tokio::spawn(context::scope(Arc::clone(&unit), async move {
                let _permit = match &limiter {
                    // The semaphore lives for the whole batch; acquisition
                    // cannot observe a closed semaphore.
                    Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
                    None => None,
                };
                if let Some(store) = &store {
                    store.prepare(&task_unit);
                }
                let result = work(item).await;
                if let Some(store) = &store {
                    let outcome = if result.is_ok() {
                        UnitOutcome::Success
                    } else {
                        UnitOutcome::Failure
                    };
                    store.record_outcome(&task_unit, outcome);
                }
                // Unconditional post-step: buffered output is never
                // stranded behind a failed unit.
                mux.flush();
                result
            }));
            workers.push((unit, handle));
        }

        let mut results = Vec::with_capacity(workers.len());
        let mut first_error: Option<PoolError<E>> = None;
        let mut panic_payload: Option<Box<dyn Any + Send>> = None;

        for (unit, handle) in workers {
            match handle.await {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(PoolError::Work(e));
                    }
                }
                Err(join_error) => {
                    // The worker died before its flush could run; the
                    // release below reclaims whatever it had buffered.
                    if let Some(store) = &self.store {
                        store.record_outcome(&unit, UnitOutcome::Failure);
                    }
                    if join_error.is_panic() {
                        if panic_payload.is_none() {
                            panic_payload = Some(join_error.into_panic());
                        }
                    } else if first_error.is_none() {
                        first_error = Some(PoolError::Cancelled(unit.id().clone()));
                    }
                }
            }
        }

        if panic_payload.is_some() || first_error.is_some() {
            // Failure path: surface every buffered block rather than lose
            // diagnostic output. Ordering is best-effort from here.
            self.mux.release();
        }
        self.mux.finalize();

        if let Some(payload) = panic_payload {
            std::panic::resume_unwind(payload);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Run `work` once per item for its side effects.
    pub async fn each<T, E, F, Fut>(
        &self,
        items: Vec<T>,
        options: ParallelOptions,
        work: F,
    ) -> Result<(), PoolError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.map(items, options, work).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
