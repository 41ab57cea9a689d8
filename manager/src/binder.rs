// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The bind/unbind entry point.

use crate::PortRegistry;
use chain::{Chain, ChainError, EditPlan, Service};
use pipeline::{EntryEdit, PipelineProgrammer, ProgramError};
use std::sync::Arc;
use store::{BoundService, ChainStore, StoreError};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use types::{BindScope, ChainKey, PortId, ServiceName, ServicePriority};
use workqueue::{Job, Retryable, RunError, WorkSerializer};

/// One port which failed its share of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFailure {
    /// The failed port.
    pub port: PortId,
    /// Why its transaction failed.
    pub error: ProgramError,
}

/// Errors surfaced by bind and unbind operations.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// A precondition violation detected by the chain editor; nothing was programmed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// A precondition violation detected by the membership store; nothing was programmed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The scoped port is not known to the registry, so its medium cannot be resolved.
    #[error("port {port} is not registered")]
    UnknownPort {
        /// The unknown port.
        port: PortId,
    },
    /// The pipeline transaction failed.
    #[error(transparent)]
    Programming(#[from] ProgramError),
    /// A port-type fan-out failed on some ports while others committed.
    #[error("{} of {attempted} ports failed on {chain}", .failures.len())]
    PartialFailure {
        /// The chain the fan-out served.
        chain: ChainKey,
        /// How many ports were attempted.
        attempted: usize,
        /// How many ports committed.
        succeeded: usize,
        /// The ports which failed, with their errors.
        failures: Vec<PortFailure>,
    },
    /// The operation kept failing transiently until the retry budget ran out; the chain is left
    /// in its last successfully committed state.
    #[error("retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted {
        /// How many times the operation ran.
        attempts: usize,
        /// The error of the final attempt.
        #[source]
        source: Box<BindError>,
    },
    /// The serialized executor went away before reporting an outcome.
    #[error("operation abandoned before completion")]
    Abandoned,
}

impl Retryable for BindError {
    fn is_transient(&self) -> bool {
        matches!(self, BindError::Programming(error) if error.is_transient())
    }
}

/// The chain maintainer: serialized bind/unbind against the store, the editor, and the
/// southbound programmer.
pub struct BindingManager<P> {
    store: Arc<RwLock<ChainStore>>,
    registry: Arc<RwLock<PortRegistry>>,
    programmer: Arc<P>,
    serializer: WorkSerializer<ChainKey, BindError>,
    max_retries: usize,
}

impl<P> BindingManager<P>
where
    P: PipelineProgrammer + Send + Sync + 'static,
{
    /// A manager over `programmer` with an empty store and registry.
    ///
    /// `workers` bounds how many chain keys are serviced at once; `max_retries` is the per-job
    /// budget for transient pipeline failures.
    #[must_use]
    pub fn new(programmer: P, workers: usize, max_retries: usize) -> BindingManager<P> {
        BindingManager {
            store: Arc::new(RwLock::new(ChainStore::new())),
            registry: Arc::new(RwLock::new(PortRegistry::new())),
            programmer: Arc::new(programmer),
            serializer: WorkSerializer::new(workers),
            max_retries,
        }
    }

    /// A handle on the membership store.
    #[must_use]
    pub fn store(&self) -> Arc<RwLock<ChainStore>> {
        self.store.clone()
    }

    /// A handle on the port registry, for the external port-discovery feed.
    #[must_use]
    pub fn registry(&self) -> Arc<RwLock<PortRegistry>> {
        self.registry.clone()
    }

    /// A handle on the southbound programmer.
    #[must_use]
    pub fn programmer(&self) -> Arc<P> {
        self.programmer.clone()
    }

    /// The members currently bound on `key`, in priority order.
    pub async fn members(&self, key: &ChainKey) -> Vec<BoundService> {
        self.store.read().await.list(key)
    }

    /// Bind `name` at `priority` on the chain `key`.
    ///
    /// Queued behind any other operation on the same key; the underlying job re-reads the
    /// latest membership on every retry.
    ///
    /// # Errors
    ///
    /// Precondition violations surface immediately with nothing programmed.  Transient
    /// pipeline failures are retried up to the configured budget before surfacing.
    pub async fn bind(
        &self,
        key: ChainKey,
        name: ServiceName,
        priority: ServicePriority,
    ) -> Result<(), BindError> {
        debug!("processing bind of {name} at priority {priority} on {key}");
        let store = self.store.clone();
        let registry = self.registry.clone();
        let programmer = self.programmer.clone();
        let job: Job<BindError> = Box::new(move || {
            let store = store.clone();
            let registry = registry.clone();
            let programmer = programmer.clone();
            let name = name.clone();
            Box::pin(async move {
                attempt_bind(&store, &registry, &*programmer, key, name, priority).await
            })
        });
        self.finish(key, job).await
    }

    /// Unbind the service named `name` from the chain `key`.
    ///
    /// # Errors
    ///
    /// Unbinding a service which is not bound surfaces immediately with nothing programmed.
    /// Transient pipeline failures are retried up to the configured budget before surfacing.
    pub async fn unbind(&self, key: ChainKey, name: ServiceName) -> Result<(), BindError> {
        debug!("processing unbind of {name} on {key}");
        let store = self.store.clone();
        let registry = self.registry.clone();
        let programmer = self.programmer.clone();
        let job: Job<BindError> = Box::new(move || {
            let store = store.clone();
            let registry = registry.clone();
            let programmer = programmer.clone();
            let name = name.clone();
            Box::pin(async move {
                attempt_unbind(&store, &registry, &*programmer, key, &name).await
            })
        });
        self.finish(key, job).await
    }

    async fn finish(&self, key: ChainKey, job: Job<BindError>) -> Result<(), BindError> {
        match self.serializer.run(key, job, self.max_retries).await {
            Ok(()) => Ok(()),
            Err(RunError::Job(error)) => Err(error),
            Err(RunError::RetriesExhausted { attempts, last }) => {
                error!("giving up on {key} after {attempts} attempts: {last}");
                Err(BindError::RetryBudgetExhausted {
                    attempts,
                    source: Box::new(last),
                })
            }
            Err(RunError::Abandoned) => Err(BindError::Abandoned),
        }
    }
}

/// Build the working chain image for `key` from the store's current membership.
async fn chain_image(
    store: &RwLock<ChainStore>,
    registry: &RwLock<PortRegistry>,
    key: ChainKey,
) -> Result<Chain, BindError> {
    let medium = match key.scope {
        BindScope::Port(port) => registry
            .read()
            .await
            .medium_of(port)
            .ok_or(BindError::UnknownPort { port })?,
        BindScope::PortType(medium) => medium,
    };
    let members = store.read().await.list(&key);
    let chain = Chain::with_members(
        key,
        medium,
        members
            .into_iter()
            .map(|record| Service::new(record.name().clone(), record.priority)),
    )?;
    Ok(chain)
}

/// The ports a plan for `key` must be stamped onto.
async fn target_ports(registry: &RwLock<PortRegistry>, key: ChainKey) -> Vec<PortId> {
    match key.scope {
        BindScope::Port(port) => vec![port],
        BindScope::PortType(medium) => registry.read().await.ports_of(medium),
    }
}

async fn attempt_bind<P: PipelineProgrammer>(
    store: &RwLock<ChainStore>,
    registry: &RwLock<PortRegistry>,
    programmer: &P,
    key: ChainKey,
    name: ServiceName,
    priority: ServicePriority,
) -> Result<(), BindError> {
    let before = chain_image(store, registry, key).await?;
    let plan = chain::bind(&before, Service::new(name.clone(), priority))?;
    let commit = apply_plan(programmer, registry, key, &plan).await;
    if commit.should_commit() {
        store
            .write()
            .await
            .put(BoundService::new(key, name.clone(), priority))?;
    }
    commit.into_result()?;
    info!("bound {name} at priority {priority} on {key}");
    Ok(())
}

async fn attempt_unbind<P: PipelineProgrammer>(
    store: &RwLock<ChainStore>,
    registry: &RwLock<PortRegistry>,
    programmer: &P,
    key: ChainKey,
    name: &ServiceName,
) -> Result<(), BindError> {
    let before = chain_image(store, registry, key).await?;
    let plan = chain::unbind(&before, name)?;
    let commit = apply_plan(programmer, registry, key, &plan).await;
    if commit.should_commit() {
        store.write().await.remove(&key, name)?;
    }
    commit.into_result()?;
    info!("unbound {name} from {key}");
    Ok(())
}

/// What came of stamping a plan onto its ports.
enum FanoutOutcome {
    /// Every port committed (or there was no port to program).
    Committed,
    /// Some ports committed, some failed without hope of retry fixing them.
    Partial(BindError),
    /// Nothing durable happened; the error decides whether the job retries.
    Failed(BindError),
}

impl FanoutOutcome {
    /// True if the membership store should reflect the operation: every port committed, or at
    /// least one did and the rest were reported.  A membership the pipeline partially carries
    /// must win over one it carries nowhere, or subsequent plans will diverge further.
    fn should_commit(&self) -> bool {
        matches!(self, FanoutOutcome::Committed | FanoutOutcome::Partial(_))
    }

    fn into_result(self) -> Result<(), BindError> {
        match self {
            FanoutOutcome::Committed => Ok(()),
            FanoutOutcome::Partial(error) | FanoutOutcome::Failed(error) => Err(error),
        }
    }
}

/// Stamp `plan` onto every affected port, one atomic transaction per port.
async fn apply_plan<P: PipelineProgrammer>(
    programmer: &P,
    registry: &RwLock<PortRegistry>,
    key: ChainKey,
    plan: &EditPlan,
) -> FanoutOutcome {
    let ports = target_ports(registry, key).await;
    if ports.is_empty() {
        debug!("no port currently carries {key}; membership recorded without programming");
        return FanoutOutcome::Committed;
    }
    let mut failures = Vec::new();
    let mut succeeded = 0usize;
    for &port in &ports {
        let edits: Vec<EntryEdit> = plan.edits.iter().map(|edit| edit.bind_to(port)).collect();
        match programmer.apply(&edits).await {
            Ok(()) => succeeded += 1,
            Err(error) => {
                warn!("programming {key} on port {port} failed: {error}");
                failures.push(PortFailure { port, error });
            }
        }
    }
    if failures.is_empty() {
        return FanoutOutcome::Committed;
    }
    if ports.len() == 1 {
        // Single-port scope: the one transaction is the whole operation.
        let Some(failure) = failures.pop() else {
            return FanoutOutcome::Committed;
        };
        return FanoutOutcome::Failed(BindError::Programming(failure.error));
    }
    if failures.iter().all(|failure| failure.error.is_transient()) {
        // Retry the whole fan-out: ports which already committed re-apply idempotently.
        let summary = format!(
            "{count} of {attempted} ports failed transiently on {key}",
            count = failures.len(),
            attempted = ports.len(),
        );
        return FanoutOutcome::Failed(BindError::Programming(ProgramError::Transient(summary)));
    }
    let error = BindError::PartialFailure {
        chain: key,
        attempted: ports.len(),
        succeeded,
        failures,
    };
    if succeeded > 0 {
        FanoutOutcome::Partial(error)
    } else {
        FanoutOutcome::Failed(error)
    }
}
