// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Structural validation of a materialized chain.
//!
//! A correct chain is a singly-linked list: starting from the default index and following
//! next-index pointers visits every entry exactly once and ends at the terminal sentinel.
//! Getting this wrong in the pipeline means silently black-holed packets or a forwarding loop,
//! so the walk here is the executable form of that invariant for tests and fixtures.

use pipeline::{DispatchKey, NextIndex, PlannedEdit, TableId};
use std::collections::BTreeMap;
use types::{Direction, ServiceName, ServicePriority};

use crate::Chain;

/// One materialized entry in a [`TableImage`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageEntry {
    /// The service the entry invokes.
    pub service: ServiceName,
    /// The next-index the entry writes.
    pub next: NextIndex,
}

/// A simulated view of one chain's dispatch entries, keyed the way the pipeline keys them.
///
/// Planned edits applied here behave exactly as the programmer contract requires: installs
/// replace, deletes of absent keys are no-ops.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TableImage {
    entries: BTreeMap<(TableId, DispatchKey), ImageEntry>,
}

/// Ways a materialized chain can be structurally broken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    /// More than one entry is keyed at the default index.
    #[error("more than one entry keyed at the default index")]
    MultipleDefaultEntries,
    /// Entries exist but none is keyed at the default index, so none is reachable.
    #[error("{stranded} entries present but none keyed at the default index")]
    NoDefaultEntry {
        /// How many entries are stranded.
        stranded: usize,
    },
    /// An entry names a next index no entry is keyed at.
    #[error("next index {index} does not resolve to any entry")]
    DanglingNextIndex {
        /// The unresolvable index.
        index: ServicePriority,
    },
    /// Following next pointers revisits an entry.
    #[error("walk revisited an entry after {after} hops: the chain loops")]
    CycleDetected {
        /// The hop count at which the revisit was detected.
        after: usize,
    },
    /// Some entries are never reached from the default index.
    #[error("{stranded} entries unreachable from the default index")]
    UnreachableEntries {
        /// How many entries the walk never reached.
        stranded: usize,
    },
    /// The walk succeeded but visited different services than the chain claims as members.
    #[error("walk order {found:?} does not match membership {expected:?}")]
    MembershipMismatch {
        /// The members the chain image claims, in priority order.
        expected: Vec<ServiceName>,
        /// The services the walk actually visited, in walk order.
        found: Vec<ServiceName>,
    },
    /// A non-head member has no entry keyed at its own priority.
    #[error("member {name} has no entry keyed at its priority {priority}")]
    MisKeyedMember {
        /// The member's name.
        name: ServiceName,
        /// The priority the member should be keyed at.
        priority: ServicePriority,
    },
}

impl TableImage {
    /// An empty image.
    #[must_use]
    pub fn new() -> TableImage {
        TableImage::default()
    }

    /// The number of materialized entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entry is materialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry at the given location, if any.
    #[must_use]
    pub fn entry(&self, table: TableId, key: DispatchKey) -> Option<&ImageEntry> {
        self.entries.get(&(table, key))
    }

    /// Install an entry directly, bypassing the edit path.  Test corruption helper.
    pub fn install_raw(
        &mut self,
        table: TableId,
        key: DispatchKey,
        service: ServiceName,
        next: NextIndex,
    ) {
        self.entries.insert((table, key), ImageEntry { service, next });
    }

    /// Apply a batch of planned edits.
    pub fn apply(&mut self, edits: &[PlannedEdit]) {
        for edit in edits {
            match edit {
                PlannedEdit::Install {
                    table,
                    key,
                    service,
                    next,
                } => {
                    self.entries.insert(
                        (*table, *key),
                        ImageEntry {
                            service: service.clone(),
                            next: *next,
                        },
                    );
                }
                PlannedEdit::Delete { table, key } => {
                    self.entries.remove(&(*table, *key));
                }
            }
        }
    }

    /// Walk the chain from the default index, returning the services visited in order.
    ///
    /// # Errors
    ///
    /// Returns a [`WalkError`] if the entries do not form a single well-linked chain.
    pub fn walk(&self, direction: Direction) -> Result<Vec<ServiceName>, WalkError> {
        let dispatch = TableId::dispatch(direction);
        let physical = self
            .entries
            .get(&(TableId::PhysicalIngress, DispatchKey::Default));
        let dispatched = self.entries.get(&(dispatch, DispatchKey::Default));
        let head = match (physical, dispatched) {
            (Some(_), Some(_)) => return Err(WalkError::MultipleDefaultEntries),
            (Some(entry), None) | (None, Some(entry)) => Some(entry),
            (None, None) => None,
        };
        let Some(mut current) = head else {
            return if self.entries.is_empty() {
                Ok(Vec::new())
            } else {
                Err(WalkError::NoDefaultEntry {
                    stranded: self.entries.len(),
                })
            };
        };
        let mut visited = Vec::new();
        loop {
            visited.push(current.service.clone());
            if visited.len() > self.entries.len() {
                return Err(WalkError::CycleDetected {
                    after: visited.len(),
                });
            }
            match current.next {
                NextIndex::Terminal => break,
                NextIndex::Index(index) => {
                    current = self
                        .entries
                        .get(&(dispatch, DispatchKey::Index(index)))
                        .ok_or(WalkError::DanglingNextIndex { index })?;
                }
            }
        }
        if visited.len() != self.entries.len() {
            return Err(WalkError::UnreachableEntries {
                stranded: self.entries.len() - visited.len(),
            });
        }
        Ok(visited)
    }

    /// Check this image against the chain it is supposed to materialize.
    ///
    /// # Errors
    ///
    /// Returns a [`WalkError`] if the walk fails, visits services in anything but membership
    /// priority order, or any non-head member is missing the entry keyed at its own priority.
    pub fn verify(&self, chain: &Chain) -> Result<(), WalkError> {
        let found = self.walk(chain.direction())?;
        let expected: Vec<ServiceName> =
            chain.members().map(|service| service.name.clone()).collect();
        if found != expected {
            return Err(WalkError::MembershipMismatch { expected, found });
        }
        let dispatch = TableId::dispatch(chain.direction());
        for member in chain.members().skip(1) {
            let keyed = self
                .entries
                .get(&(dispatch, DispatchKey::Index(member.priority)))
                .is_some_and(|entry| entry.service == member.name);
            if !keyed {
                return Err(WalkError::MisKeyedMember {
                    name: member.name.clone(),
                    priority: member.priority,
                });
            }
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use crate::{Chain, Service, TableImage, WalkError, bind, unbind};
    use pipeline::{DispatchKey, NextIndex, TableId};
    use types::{ChainKey, Direction, MediumKind, PortId, ServiceName, ServicePriority};

    fn service(name: &str, priority: u16) -> Service {
        Service::new(
            ServiceName::try_from(name).unwrap(),
            ServicePriority::try_new(priority).unwrap(),
        )
    }

    fn name(name: &str) -> ServiceName {
        ServiceName::try_from(name).unwrap()
    }

    fn priority(p: u16) -> ServicePriority {
        ServicePriority::try_new(p).unwrap()
    }

    fn empty_chain(medium: MediumKind) -> Chain {
        Chain::new(
            ChainKey::port(PortId::try_new(1).unwrap(), Direction::Ingress),
            medium,
        )
    }

    #[test]
    fn image_of_successive_binds_verifies() {
        let mut chain = empty_chain(MediumKind::Vlan);
        let mut image = TableImage::new();
        for (n, p) in [("nat", 20), ("acl", 5), ("routing", 10)] {
            let plan = bind(&chain, service(n, p)).unwrap();
            image.apply(&plan.edits);
            chain = plan.chain;
            image.verify(&chain).unwrap();
        }
        assert_eq!(
            image.walk(Direction::Ingress).unwrap(),
            vec![name("acl"), name("routing"), name("nat")]
        );
    }

    #[test]
    fn image_of_fast_path_transitions_verifies() {
        let mut chain = empty_chain(MediumKind::Tunnel);
        let mut image = TableImage::new();
        for (n, p) in [("dispatch", 10), ("acl", 5), ("nat", 20)] {
            let plan = bind(&chain, service(n, p)).unwrap();
            image.apply(&plan.edits);
            chain = plan.chain;
            image.verify(&chain).unwrap();
        }
        for n in ["acl", "nat", "dispatch"] {
            let plan = unbind(&chain, &name(n)).unwrap();
            image.apply(&plan.edits);
            chain = plan.chain;
            image.verify(&chain).unwrap();
        }
        assert!(image.is_empty());
    }

    #[test]
    fn dangling_next_index_is_detected() {
        let mut image = TableImage::new();
        image.install_raw(
            TableId::IngressDispatch,
            DispatchKey::Default,
            name("acl"),
            NextIndex::Index(priority(7)),
        );
        assert_eq!(
            image.walk(Direction::Ingress),
            Err(WalkError::DanglingNextIndex {
                index: priority(7)
            })
        );
    }

    #[test]
    fn cycle_is_detected() {
        let mut image = TableImage::new();
        image.install_raw(
            TableId::IngressDispatch,
            DispatchKey::Default,
            name("acl"),
            NextIndex::Index(priority(7)),
        );
        image.install_raw(
            TableId::IngressDispatch,
            DispatchKey::Index(priority(7)),
            name("nat"),
            NextIndex::Index(priority(7)),
        );
        assert!(matches!(
            image.walk(Direction::Ingress),
            Err(WalkError::CycleDetected { .. })
        ));
    }

    #[test]
    fn unreachable_entries_are_detected() {
        let mut image = TableImage::new();
        image.install_raw(
            TableId::IngressDispatch,
            DispatchKey::Default,
            name("acl"),
            NextIndex::Terminal,
        );
        image.install_raw(
            TableId::IngressDispatch,
            DispatchKey::Index(priority(9)),
            name("nat"),
            NextIndex::Terminal,
        );
        assert_eq!(
            image.walk(Direction::Ingress),
            Err(WalkError::UnreachableEntries { stranded: 1 })
        );
    }

    #[test]
    fn competing_default_entries_are_detected() {
        let mut image = TableImage::new();
        image.install_raw(
            TableId::IngressDispatch,
            DispatchKey::Default,
            name("acl"),
            NextIndex::Terminal,
        );
        image.install_raw(
            TableId::PhysicalIngress,
            DispatchKey::Default,
            name("nat"),
            NextIndex::Terminal,
        );
        assert_eq!(
            image.walk(Direction::Ingress),
            Err(WalkError::MultipleDefaultEntries)
        );
    }

    #[test]
    fn headless_entries_are_detected() {
        let mut image = TableImage::new();
        image.install_raw(
            TableId::IngressDispatch,
            DispatchKey::Index(priority(9)),
            name("nat"),
            NextIndex::Terminal,
        );
        assert_eq!(
            image.walk(Direction::Ingress),
            Err(WalkError::NoDefaultEntry { stranded: 1 })
        );
    }
}
