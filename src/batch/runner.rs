// batch/runner.rs

//! Bounded parallel fan-out over independent work items.
//!
//! At most `concurrency` operations are polled at any time. Each operation
//! runs to completion (retries included) before its slot takes the next
//! item. Outcomes are reported as they resolve, in completion order, each
//! paired with the item that produced it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::*;

use crate::webex::{ApiFailure, RequestOutcome};

/// Cooperative cancellation shared between the caller and a running batch.
///
/// Once cancelled, no new item is started; items already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the runner needs to know about a per-item result.
pub trait ItemOutcome {
    /// The failure that makes every remaining item pointless, if any.
    fn batch_fatal(&self) -> Option<&ApiFailure>;

    /// The outcome recorded for an item that was never started.
    fn not_started(reason: ApiFailure) -> Self;
}

impl<T> ItemOutcome for RequestOutcome<T> {
    fn batch_fatal(&self) -> Option<&ApiFailure> {
        self.as_ref().err().filter(|f| f.kind.is_batch_fatal())
    }

    fn not_started(reason: ApiFailure) -> Self {
        Err(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// An item with its terminal outcome. `index` is the submission position.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed<W, O> {
    pub index: usize,
    pub item: W,
    pub outcome: O,
}

/// Every submitted item's outcome, in completion order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<W, O> {
    pub completed: Vec<Completed<W, O>>,
    /// Set when the batch stopped scheduling early.
    pub aborted: Option<ApiFailure>,
}

impl<W, O> BatchOutcome<W, O> {
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Reorders the outcomes by submission index.
    pub fn into_submission_order(mut self) -> Vec<Completed<W, O>> {
        self.completed.sort_by_key(|c| c.index);
        self.completed
    }
}

impl<W, T> BatchOutcome<W, RequestOutcome<T>> {
    pub fn successes(&self) -> impl Iterator<Item = (&W, &T)> {
        self.completed
            .iter()
            .filter_map(|c| c.outcome.as_ref().ok().map(|v| (&c.item, v)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&W, &ApiFailure)> {
        self.completed
            .iter()
            .filter_map(|c| c.outcome.as_ref().err().map(|f| (&c.item, f)))
    }
}

/// Runs a per-item operation over a batch with a hard concurrency ceiling.
#[derive(Debug, Clone)]
pub struct FanOutRunner {
    concurrency: usize,
    cancel: CancelToken,
}

impl FanOutRunner {
    pub const DEFAULT_CONCURRENCY: usize = 5;

    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs `operation` on every item and returns exactly one outcome per item.
    ///
    /// `on_progress` sees each outcome as soon as it resolves. A batch-fatal
    /// outcome (authentication) stops scheduling: the remaining items are
    /// recorded as not started, and the failure is kept in
    /// [`BatchOutcome::aborted`].
    pub async fn run_all<W, O, F, Fut, P>(
        &self,
        items: Vec<W>,
        operation: F,
        mut on_progress: P,
    ) -> BatchOutcome<W, O>
    where
        W: Clone,
        O: ItemOutcome,
        F: Fn(W) -> Fut,
        Fut: Future<Output = O>,
        P: FnMut(&Completed<W, O>, Progress),
    {
        let total = items.len();
        let halted = AtomicBool::new(false);
        let halted = &halted;
        let cancel = &self.cancel;
        let operation = &operation;

        let mut in_flight = stream::iter(items.into_iter().enumerate())
            .map(move |(index, item)| async move {
                let outcome = if cancel.is_cancelled() || halted.load(Ordering::SeqCst) {
                    O::not_started(ApiFailure::cancelled())
                } else {
                    operation(item.clone()).await
                };
                Completed {
                    index,
                    item,
                    outcome,
                }
            })
            .buffer_unordered(self.concurrency);

        let mut completed = Vec::with_capacity(total);
        let mut aborted: Option<ApiFailure> = None;
        while let Some(done) = in_flight.next().await {
            if aborted.is_none() {
                if let Some(failure) = done.outcome.batch_fatal() {
                    error!("Stopping batch: {failure}");
                    halted.store(true, Ordering::SeqCst);
                    aborted = Some(failure.clone());
                }
            }
            let progress = Progress {
                completed: completed.len() + 1,
                total,
            };
            on_progress(&done, progress);
            completed.push(done);
        }

        if aborted.is_none() && self.cancel.is_cancelled() {
            warn!("Batch cancelled before all items were started");
            aborted = Some(ApiFailure::cancelled());
        }
        BatchOutcome { completed, aborted }
    }
}

impl Default for FanOutRunner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONCURRENCY)
    }
}
