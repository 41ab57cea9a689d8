// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The in-flight image of one chain's membership.

use crate::ChainError;
use pipeline::TableId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::ops::Bound;
use types::{ChainKey, Direction, MediumKind, ServiceName, ServicePriority};

/// One service bound into a chain.
#[derive(Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// The service's name, unique within its chain.
    pub name: ServiceName,
    /// The service's execution priority, unique within its chain.
    pub priority: ServicePriority,
}

impl Service {
    /// A service with the given name and priority.
    #[must_use]
    pub const fn new(name: ServiceName, priority: ServicePriority) -> Service {
        Service { name, priority }
    }
}

impl Display for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{name}:{priority}", name = self.name, priority = self.priority)
    }
}

/// The membership of one chain, ordered by priority.
///
/// This is the owned, in-flight image a bind or unbind operation works on.  It is built from the
/// store's at-rest records when the operation starts and written back when the pipeline edits
/// have committed.  While an edit is in flight the image is exclusively owned by that
/// operation's serialized execution slot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    key: ChainKey,
    medium: MediumKind,
    members: BTreeMap<ServicePriority, Service>,
}

impl Chain {
    /// An empty chain for the given key on the given medium.
    #[must_use]
    pub const fn new(key: ChainKey, medium: MediumKind) -> Chain {
        Chain {
            key,
            medium,
            members: BTreeMap::new(),
        }
    }

    /// A chain holding the given members.
    ///
    /// # Errors
    ///
    /// Returns an error if two members share a priority: priority is the addressing key of the
    /// pipeline, so a collision can never be silently resolved.
    pub fn with_members(
        key: ChainKey,
        medium: MediumKind,
        members: impl IntoIterator<Item = Service>,
    ) -> Result<Chain, ChainError> {
        let mut chain = Chain::new(key, medium);
        for service in members {
            if let Some(occupant) = chain.members.get(&service.priority) {
                return Err(ChainError::DuplicatePriority {
                    chain: key,
                    name: service.name,
                    priority: service.priority,
                    occupant: occupant.name.clone(),
                });
            }
            if chain.member_by_name(&service.name).is_some() {
                return Err(ChainError::DuplicateName {
                    chain: key,
                    name: service.name,
                });
            }
            chain.members.insert(service.priority, service);
        }
        Ok(chain)
    }

    /// The key this chain is maintained under.
    #[must_use]
    pub const fn key(&self) -> ChainKey {
        self.key
    }

    /// The medium class of the port (or port class) this chain serves.
    #[must_use]
    pub const fn medium(&self) -> MediumKind {
        self.medium
    }

    /// The direction this chain processes.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.key.direction
    }

    /// The number of bound services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if no service is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The chain head: the member with the smallest priority.
    #[must_use]
    pub fn head(&self) -> Option<&Service> {
        self.members.values().next()
    }

    /// The members in execution (priority) order.
    pub fn members(&self) -> impl Iterator<Item = &Service> {
        self.members.values()
    }

    /// The member keyed at the given priority.
    #[must_use]
    pub fn member_at(&self, priority: ServicePriority) -> Option<&Service> {
        self.members.get(&priority)
    }

    /// The member with the given name.
    #[must_use]
    pub fn member_by_name(&self, name: &ServiceName) -> Option<&Service> {
        self.members.values().find(|service| &service.name == name)
    }

    /// True if this chain is eligible for the single-service fast path: traffic on a
    /// tunnel-class port arrives pre-classified, so an ingress chain of exactly one member can
    /// dispatch straight from the physical table.
    #[must_use]
    pub const fn fast_path_eligible(&self) -> bool {
        matches!(self.medium, MediumKind::Tunnel) && matches!(self.key.direction, Direction::Ingress)
    }

    /// The table the head entry of this chain lives in.
    #[must_use]
    pub fn head_table(&self) -> TableId {
        if self.fast_path_eligible() && self.len() == 1 {
            TableId::PhysicalIngress
        } else {
            TableId::dispatch(self.direction())
        }
    }

    /// The member with the greatest priority strictly below `subject`.
    pub(crate) fn nearest_below(&self, subject: ServicePriority) -> Option<&Service> {
        self.members.range(..subject).next_back().map(|(_, s)| s)
    }

    /// The member with the smallest priority strictly above `subject`.
    pub(crate) fn nearest_above(&self, subject: ServicePriority) -> Option<&Service> {
        self.members
            .range((Bound::Excluded(subject), Bound::Unbounded))
            .next()
            .map(|(_, s)| s)
    }

    /// This chain with `service` added.  The caller has already checked for collisions.
    #[must_use]
    pub(crate) fn with_member(&self, service: Service) -> Chain {
        let mut members = self.members.clone();
        members.insert(service.priority, service);
        Chain {
            key: self.key,
            medium: self.medium,
            members,
        }
    }

    /// This chain with the member at `priority` removed.
    #[must_use]
    pub(crate) fn without_member(&self, priority: ServicePriority) -> Chain {
        let mut members = self.members.clone();
        members.remove(&priority);
        Chain {
            key: self.key,
            medium: self.medium,
            members,
        }
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{key} [", key = self.key)?;
        let mut first = true;
        for service in self.members() {
            if !first {
                write!(f, " -> ")?;
            }
            write!(f, "{service}")?;
            first = false;
        }
        write!(f, "]")
    }
}
