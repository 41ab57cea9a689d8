// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-key serialized job execution.
//!
//! Jobs enqueued under the same key run strictly one at a time, in enqueue order.  Jobs under
//! different keys run concurrently, bounded by a worker permit pool.  A job which fails
//! transiently is re-run as a whole, up to a caller-supplied retry budget; there is no
//! mid-flight cancellation.
//!
//! This is the execution model the chain maintainer needs: all binds and unbinds against one
//! chain are naturally serialized, which eliminates races on neighbor resolution without any
//! locking inside the planning code itself.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use dashmap::DashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, warn};

/// Classifies an error as worth retrying or not.
pub trait Retryable {
    /// True if re-running the failed job may succeed.
    fn is_transient(&self) -> bool;
}

/// The terminal outcome of a serialized job.
#[derive(Debug, thiserror::Error)]
pub enum RunError<E: std::error::Error> {
    /// The job failed with a non-transient error; it was not retried.
    #[error(transparent)]
    Job(E),
    /// The job kept failing transiently until the retry budget ran out.
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// How many times the job ran.
        attempts: usize,
        /// The error of the final attempt.
        last: E,
    },
    /// The executor lane disappeared before reporting an outcome.
    #[error("job abandoned: executor lane closed")]
    Abandoned,
}

/// The boxed future one job attempt evaluates to.
pub type JobFuture<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send>>;

/// A repeatable job: each call produces a fresh attempt.
pub type Job<E> = Box<dyn FnMut() -> JobFuture<E> + Send>;

struct LaneJob<E: std::error::Error> {
    job: Job<E>,
    max_retries: usize,
    done: oneshot::Sender<Result<(), RunError<E>>>,
}

/// Serialized per-key job lanes over a bounded worker pool.
///
/// Lanes are created on first use and live for the serializer's lifetime; dropping the
/// serializer closes every lane.
pub struct WorkSerializer<K, E>
where
    K: Eq + Hash,
    E: std::error::Error,
{
    lanes: DashMap<K, mpsc::UnboundedSender<LaneJob<E>>>,
    permits: Arc<Semaphore>,
}

impl<K, E> WorkSerializer<K, E>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    E: std::error::Error + Retryable + Send + 'static,
{
    /// A serializer allowing up to `workers` jobs (across all keys) to run at once.
    #[must_use]
    pub fn new(workers: usize) -> WorkSerializer<K, E> {
        WorkSerializer {
            lanes: DashMap::new(),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run `job` under `key`, retrying transient failures up to `max_retries` times.
    ///
    /// Resolves once the job (including any retries) has reached a terminal outcome.  Jobs
    /// submitted under the same key before this one complete first.
    ///
    /// # Errors
    ///
    /// Returns the job's own error for non-transient failures, or
    /// [`RunError::RetriesExhausted`] once the retry budget is spent.
    pub async fn run(&self, key: K, job: Job<E>, max_retries: usize) -> Result<(), RunError<E>> {
        let (done, outcome) = oneshot::channel();
        let mut lane_job = LaneJob {
            job,
            max_retries,
            done,
        };
        // A lane only vanishes if its task died; replace it and resubmit once.
        for _ in 0..2 {
            let sender = self.lane(&key);
            match sender.send(lane_job) {
                Ok(()) => return outcome.await.unwrap_or(Err(RunError::Abandoned)),
                Err(mpsc::error::SendError(rejected)) => {
                    warn!("lane for {key} is gone; recreating");
                    self.lanes.remove(&key);
                    lane_job = rejected;
                }
            }
        }
        Err(RunError::Abandoned)
    }

    fn lane(&self, key: &K) -> mpsc::UnboundedSender<LaneJob<E>> {
        self.lanes
            .entry(key.clone())
            .or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                tokio::spawn(lane_loop(key.clone(), receiver, self.permits.clone()));
                sender
            })
            .clone()
    }
}

async fn lane_loop<K, E>(
    key: K,
    mut jobs: mpsc::UnboundedReceiver<LaneJob<E>>,
    permits: Arc<Semaphore>,
) where
    K: Display,
    E: std::error::Error + Retryable,
{
    while let Some(mut lane_job) = jobs.recv().await {
        let Ok(_permit) = permits.acquire().await else {
            // Pool torn down; nothing further can run.
            break;
        };
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match (lane_job.job)().await {
                Ok(()) => break Ok(()),
                Err(error) if error.is_transient() && attempts <= lane_job.max_retries => {
                    debug!("job on {key} failed transiently (attempt {attempts}): {error}; retrying");
                }
                Err(error) if error.is_transient() => {
                    break Err(RunError::RetriesExhausted {
                        attempts,
                        last: error,
                    });
                }
                Err(error) => break Err(RunError::Job(error)),
            }
        };
        // The submitter may have gone away; the job still ran to completion.
        let _ = lane_job.done.send(outcome);
    }
}
