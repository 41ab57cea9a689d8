// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The at-rest record store of chain membership.
//!
//! Between edits, the durable truth about which services are bound where lives here as one
//! record per binding, indexed by chain key.  An operation in flight builds its working chain
//! image from a listing and writes the outcome back once the pipeline transaction has
//! committed.

// multi-index-map generated code is not documented and it angers clippy
#![allow(missing_docs)]
// multi-index-map can't be convinced to attach this to the derived types
#![allow(clippy::unsafe_derive_deserialize)]
#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use multi_index_map::MultiIndexMap;
use serde::{Deserialize, Serialize};
use types::{ChainKey, ServiceName, ServicePriority};

/// The addressing key of one binding record: which chain, which service.
#[derive(Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct BindingRef {
    /// The chain the service is bound into.
    pub chain: ChainKey,
    /// The bound service's name.
    pub name: ServiceName,
}

/// One persisted service binding.
#[derive(
    Clone, Debug, Hash, MultiIndexMap, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize,
)]
#[multi_index_derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundService {
    /// The record's addressing key.
    #[multi_index(hashed_unique)]
    pub binding: BindingRef,
    /// The chain the service is bound into (scope descriptor plus direction).
    #[multi_index(hashed_non_unique)]
    pub chain: ChainKey,
    /// The service's execution priority within its chain.
    pub priority: ServicePriority,
}

impl BoundService {
    /// A record binding `name` at `priority` into `chain`.
    #[must_use]
    pub fn new(chain: ChainKey, name: ServiceName, priority: ServicePriority) -> BoundService {
        BoundService {
            binding: BindingRef {
                chain,
                name: name.clone(),
            },
            chain,
            priority,
        }
    }

    /// The bound service's name.
    #[must_use]
    pub fn name(&self) -> &ServiceName {
        &self.binding.name
    }
}

/// Errors surfaced by [`ChainStore`] mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A service of this name is already bound on the chain.
    #[error("{name} is already bound on {chain}")]
    DuplicateName {
        /// The chain the record was destined for.
        chain: ChainKey,
        /// The contested name.
        name: ServiceName,
    },
    /// Another service on the chain already holds this priority.
    #[error("priority {priority} on {chain} is already held by {occupant}")]
    DuplicatePriority {
        /// The chain the record was destined for.
        chain: ChainKey,
        /// The contested priority.
        priority: ServicePriority,
        /// The member holding the priority.
        occupant: ServiceName,
    },
    /// No such service is bound on the chain.
    #[error("{name} is not bound on {chain}")]
    UnknownService {
        /// The chain which was searched.
        chain: ChainKey,
        /// The name which was not found.
        name: ServiceName,
    },
}

/// The durable membership store, one record per (chain, service) binding.
#[derive(Debug, Default, Clone)]
pub struct ChainStore {
    records: MultiIndexBoundServiceMap,
}

impl ChainStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> ChainStore {
        ChainStore::default()
    }

    /// The number of binding records across all chains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no binding is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The members of the given chain, ordered by priority.
    #[must_use]
    pub fn list(&self, chain: &ChainKey) -> Vec<BoundService> {
        let mut members: Vec<BoundService> = self
            .records
            .get_by_chain(chain)
            .into_iter()
            .cloned()
            .collect();
        members.sort_by_key(|record| record.priority);
        members
    }

    /// The record binding `name` on `chain`, if any.
    #[must_use]
    pub fn get(&self, chain: &ChainKey, name: &ServiceName) -> Option<&BoundService> {
        self.records.get_by_binding(&BindingRef {
            chain: *chain,
            name: name.clone(),
        })
    }

    /// Record a new binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain already binds the name or the priority; the store is
    /// unchanged in that case.
    pub fn put(&mut self, record: BoundService) -> Result<(), StoreError> {
        for occupant in self.records.get_by_chain(&record.chain) {
            if occupant.name() == record.name() {
                return Err(StoreError::DuplicateName {
                    chain: record.chain,
                    name: record.binding.name,
                });
            }
            if occupant.priority == record.priority {
                return Err(StoreError::DuplicatePriority {
                    chain: record.chain,
                    priority: record.priority,
                    occupant: occupant.name().clone(),
                });
            }
        }
        self.records
            .try_insert(record.clone())
            .map_err(|_| StoreError::DuplicateName {
                chain: record.chain,
                name: record.binding.name,
            })?;
        Ok(())
    }

    /// Remove the binding of `name` on `chain`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownService`] if no such binding is recorded.
    pub fn remove(
        &mut self,
        chain: &ChainKey,
        name: &ServiceName,
    ) -> Result<BoundService, StoreError> {
        self.records
            .remove_by_binding(&BindingRef {
                chain: *chain,
                name: name.clone(),
            })
            .ok_or_else(|| StoreError::UnknownService {
                chain: *chain,
                name: name.clone(),
            })
    }

    /// The distinct chain keys with at least one binding, in sorted order.
    #[must_use]
    pub fn chains(&self) -> Vec<ChainKey> {
        let mut chains: Vec<ChainKey> = self.records.iter_by_chain().map(|r| r.chain).collect();
        chains.sort_unstable();
        chains.dedup();
        chains
    }
}
