// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Neighbor resolution within a chain.

use crate::{Chain, Service};
use types::ServicePriority;

/// Where a subject priority sits relative to a chain's members.
///
/// The subject itself is never part of the answer: resolving a priority which is currently a
/// member yields that member's neighbors, and resolving a priority about to be inserted yields
/// the neighbors it would get.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainPosition {
    /// The member with the greatest priority strictly less than the subject, if any.
    pub predecessor: Option<Service>,
    /// The member with the smallest priority strictly greater than the subject, if any.
    pub successor: Option<Service>,
    /// True if the subject has no predecessor, i.e. it is (or would become) the chain head.
    pub is_head: bool,
}

impl ChainPosition {
    /// The successor's priority, if a successor exists.
    #[must_use]
    pub fn successor_priority(&self) -> Option<ServicePriority> {
        self.successor.as_ref().map(|service| service.priority)
    }
}

impl Chain {
    /// Resolve the position of `subject` relative to this chain's members.
    ///
    /// Pure: repeated calls with the same chain and subject give the same answer, and the chain
    /// is never mutated.
    #[must_use]
    pub fn resolve(&self, subject: ServicePriority) -> ChainPosition {
        let predecessor = self.nearest_below(subject).cloned();
        let successor = self.nearest_above(subject).cloned();
        ChainPosition {
            is_head: predecessor.is_none(),
            predecessor,
            successor,
        }
    }
}
