// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bind and unbind planning: the state-transition engine of the dispatch chain.
//!
//! Both operations consume the current chain image and emit an [`EditPlan`]: the minimal ordered
//! batch of dispatch-entry edits plus the membership image the chain holds once those edits have
//! committed.  A plan touches at most the subject's own entry and its immediate predecessor,
//! except when a chain enters or leaves the single-service tunnel fast path, which additionally
//! retires the entry left behind in the other table.
//!
//! Plans are port-agnostic; the caller stamps them onto each affected port and commits each
//! port's batch as one pipeline transaction.

use crate::{Chain, Service};
use pipeline::{DispatchKey, NextIndex, PlannedEdit, TableId};
use types::{ChainKey, ServiceName, ServicePriority};

/// Precondition violations detected before any edit is emitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Two services may never share a priority: the priority is the pipeline addressing key.
    #[error("cannot bind {name} at priority {priority} on {chain}: priority held by {occupant}")]
    DuplicatePriority {
        /// The chain the bind was attempted on.
        chain: ChainKey,
        /// The service which failed to bind.
        name: ServiceName,
        /// The contested priority.
        priority: ServicePriority,
        /// The member currently holding the priority.
        occupant: ServiceName,
    },
    /// Service names are unique within a chain.
    #[error("cannot bind {name} on {chain}: a service of that name is already bound")]
    DuplicateName {
        /// The chain the bind was attempted on.
        chain: ChainKey,
        /// The already-bound name.
        name: ServiceName,
    },
    /// The service asked to be unbound is not bound.
    #[error("cannot unbind {name} from {chain}: not a member")]
    NotAMember {
        /// The chain the unbind was attempted on.
        chain: ChainKey,
        /// The unknown service name.
        name: ServiceName,
    },
}

/// The outcome of planning one bind or unbind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EditPlan {
    /// The ordered entry edits.  The subject's own entry always precedes its predecessor's
    /// rekey so that the batch never references a key it has not produced; the whole batch
    /// commits as one transaction regardless.
    pub edits: Vec<PlannedEdit>,
    /// The membership image after the edits commit.
    pub chain: Chain,
}

/// Plan the addition of `service` to `chain`.
///
/// Emits at most two edits — the new member's entry and its predecessor's rekey — plus one
/// retirement edit when the chain leaves the physical-table fast path.
///
/// # Errors
///
/// Returns a precondition error (no edits emitted) if the priority or name is already bound.
pub fn bind(chain: &Chain, service: Service) -> Result<EditPlan, ChainError> {
    if let Some(occupant) = chain.member_at(service.priority) {
        return Err(ChainError::DuplicatePriority {
            chain: chain.key(),
            name: service.name,
            priority: service.priority,
            occupant: occupant.name.clone(),
        });
    }
    if chain.member_by_name(&service.name).is_some() {
        return Err(ChainError::DuplicateName {
            chain: chain.key(),
            name: service.name,
        });
    }

    let dispatch = TableId::dispatch(chain.direction());
    let after = chain.with_member(service.clone());
    let mut edits = Vec::with_capacity(3);

    let Some(old_head) = chain.head().cloned() else {
        // First service on the chain.  On a fast-path chain the sole entry dispatches straight
        // from the physical table.
        edits.push(PlannedEdit::Install {
            table: after.head_table(),
            key: DispatchKey::Default,
            service: service.name,
            next: NextIndex::Terminal,
        });
        return Ok(EditPlan { edits, chain: after });
    };

    let position = chain.resolve(service.priority);
    let position_successor: NextIndex = position.successor_priority().into();
    match position.predecessor {
        None => {
            // The new service becomes the head: it takes over the default index, and the former
            // head is demoted to an entry keyed at its own priority.  The demoted entry keeps
            // pointing at the former head's unchanged successor.
            edits.push(PlannedEdit::Install {
                table: dispatch,
                key: DispatchKey::Default,
                service: service.name,
                next: NextIndex::Index(old_head.priority),
            });
            let old_head_next: NextIndex =
                chain.resolve(old_head.priority).successor_priority().into();
            edits.push(PlannedEdit::Install {
                table: dispatch,
                key: DispatchKey::Index(old_head.priority),
                service: old_head.name,
                next: old_head_next,
            });
            if chain.head_table() != dispatch {
                // Leaving the fast path: the former head's physical-table entry is not
                // superseded by the new default entry and must be retired explicitly.
                edits.push(PlannedEdit::Delete {
                    table: chain.head_table(),
                    key: DispatchKey::Default,
                });
            }
        }
        Some(predecessor) => {
            edits.push(PlannedEdit::Install {
                table: dispatch,
                key: DispatchKey::Index(service.priority),
                service: service.name,
                next: position_successor,
            });
            let predecessor_is_head = predecessor.priority == old_head.priority;
            if predecessor_is_head && chain.head_table() != dispatch {
                // Leaving the fast path with the head unchanged: the head entry moves from the
                // physical table to the dispatch table, now pointing at the new member.
                edits.push(PlannedEdit::Install {
                    table: dispatch,
                    key: DispatchKey::Default,
                    service: predecessor.name,
                    next: NextIndex::Index(service.priority),
                });
                edits.push(PlannedEdit::Delete {
                    table: chain.head_table(),
                    key: DispatchKey::Default,
                });
            } else {
                let key = if predecessor_is_head {
                    DispatchKey::Default
                } else {
                    DispatchKey::Index(predecessor.priority)
                };
                edits.push(PlannedEdit::Install {
                    table: dispatch,
                    key,
                    service: predecessor.name,
                    next: NextIndex::Index(service.priority),
                });
            }
        }
    }
    Ok(EditPlan { edits, chain: after })
}

/// Plan the removal of the service named `name` from `chain`.
///
/// Emits at most two edits — the removed member's entry deletion and its predecessor's rekey
/// (or the successor's promotion to the default index) — plus one retirement edit when the
/// chain shrinks back onto the physical-table fast path.
///
/// # Errors
///
/// Returns [`ChainError::NotAMember`] (no edits emitted) if no such service is bound.
pub fn unbind(chain: &Chain, name: &ServiceName) -> Result<EditPlan, ChainError> {
    let Some(removed) = chain.member_by_name(name).cloned() else {
        return Err(ChainError::NotAMember {
            chain: chain.key(),
            name: name.clone(),
        });
    };

    let dispatch = TableId::dispatch(chain.direction());
    let after = chain.without_member(removed.priority);
    let mut edits = Vec::with_capacity(3);

    // Neighbors are resolved against the remaining members.
    let position = after.resolve(removed.priority);
    let position_successor: NextIndex = position.successor_priority().into();
    match position.predecessor {
        None => match position.successor {
            None => {
                // The sole member goes away; the chain is empty.
                edits.push(PlannedEdit::Delete {
                    table: chain.head_table(),
                    key: DispatchKey::Default,
                });
            }
            Some(successor) => {
                // The head goes away; its successor is promoted.  The promoted member's old
                // non-head entry is retired and the default index is rewritten to invoke it.
                // The default-index entry has a fixed key, so a head change is always a
                // re-create, never an edit in place.
                edits.push(PlannedEdit::Delete {
                    table: dispatch,
                    key: DispatchKey::Index(successor.priority),
                });
                let successor_next: NextIndex =
                    after.resolve(successor.priority).successor_priority().into();
                edits.push(PlannedEdit::Install {
                    table: after.head_table(),
                    key: DispatchKey::Default,
                    service: successor.name,
                    next: successor_next,
                });
                if after.head_table() != dispatch {
                    // Shrinking back onto the fast path: the stale default entry in the
                    // dispatch table must be retired alongside.
                    edits.push(PlannedEdit::Delete {
                        table: dispatch,
                        key: DispatchKey::Default,
                    });
                }
            }
        },
        Some(predecessor) => {
            edits.push(PlannedEdit::Delete {
                table: dispatch,
                key: DispatchKey::Index(removed.priority),
            });
            let predecessor_is_head = after
                .head()
                .is_some_and(|head| head.priority == predecessor.priority);
            let next: NextIndex = position_successor;
            if predecessor_is_head && after.head_table() != dispatch {
                // Shrinking back onto the fast path: the lone surviving member moves from the
                // dispatch table to the physical table.
                edits.push(PlannedEdit::Install {
                    table: after.head_table(),
                    key: DispatchKey::Default,
                    service: predecessor.name,
                    next,
                });
                edits.push(PlannedEdit::Delete {
                    table: dispatch,
                    key: DispatchKey::Default,
                });
            } else {
                let key = if predecessor_is_head {
                    DispatchKey::Default
                } else {
                    DispatchKey::Index(predecessor.priority)
                };
                edits.push(PlannedEdit::Install {
                    table: dispatch,
                    key,
                    service: predecessor.name,
                    next,
                });
            }
        }
    }
    Ok(EditPlan { edits, chain: after })
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use crate::{Chain, ChainError, Service, bind, unbind};
    use pipeline::{DispatchKey, NextIndex, PlannedEdit, TableId};
    use pretty_assertions::assert_eq;
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

    fn vlan_ingress(members: &[(&str, u16)]) -> Chain {
        Chain::with_members(
            ChainKey::port(PortId::try_new(1).unwrap(), Direction::Ingress),
            MediumKind::Vlan,
            members.iter().map(|&(n, p)| service(n, p)),
        )
        .unwrap()
    }

    fn tunnel_ingress(members: &[(&str, u16)]) -> Chain {
        Chain::with_members(
            ChainKey::port(PortId::try_new(1).unwrap(), Direction::Ingress),
            MediumKind::Tunnel,
            members.iter().map(|&(n, p)| service(n, p)),
        )
        .unwrap()
    }

    fn install(table: TableId, key: DispatchKey, svc: &str, next: NextIndex) -> PlannedEdit {
        PlannedEdit::Install {
            table,
            key,
            service: name(svc),
            next,
        }
    }

    fn delete(table: TableId, key: DispatchKey) -> PlannedEdit {
        PlannedEdit::Delete { table, key }
    }

    #[test]
    fn bind_to_empty_chain_installs_sole_default_entry() {
        let chain = vlan_ingress(&[]);
        let plan = bind(&chain, service("acl", 10)).unwrap();
        assert_eq!(
            plan.edits,
            vec![install(
                TableId::IngressDispatch,
                DispatchKey::Default,
                "acl",
                NextIndex::Terminal,
            )]
        );
        assert_eq!(plan.chain.len(), 1);
    }

    #[test]
    fn bind_new_head_demotes_former_head() {
        // chain {A:10 (head)}; bind B:5
        let chain = vlan_ingress(&[("svc-a", 10)]);
        let plan = bind(&chain, service("svc-b", 5)).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Default,
                    "svc-b",
                    NextIndex::Index(priority(10)),
                ),
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Index(priority(10)),
                    "svc-a",
                    NextIndex::Terminal,
                ),
            ]
        );
        assert_eq!(plan.chain.head().unwrap().name, name("svc-b"));
    }

    #[test]
    fn bind_interior_rekeys_predecessor_only() {
        // chain {B:5 (head), A:10}; bind C:7
        let chain = vlan_ingress(&[("svc-b", 5), ("svc-a", 10)]);
        let plan = bind(&chain, service("svc-c", 7)).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Index(priority(7)),
                    "svc-c",
                    NextIndex::Index(priority(10)),
                ),
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Default,
                    "svc-b",
                    NextIndex::Index(priority(7)),
                ),
            ]
        );
        assert_eq!(plan.chain.head().unwrap().name, name("svc-b"));
    }

    #[test]
    fn bind_tail_rekeys_interior_predecessor_at_its_priority() {
        let chain = vlan_ingress(&[("svc-b", 5), ("svc-c", 7)]);
        let plan = bind(&chain, service("svc-a", 10)).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Index(priority(10)),
                    "svc-a",
                    NextIndex::Terminal,
                ),
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Index(priority(7)),
                    "svc-c",
                    NextIndex::Index(priority(10)),
                ),
            ]
        );
    }

    #[test]
    fn unbind_head_promotes_successor_into_default_index() {
        // chain {B:5 (head), C:7, A:10}; unbind B
        let chain = vlan_ingress(&[("svc-b", 5), ("svc-c", 7), ("svc-a", 10)]);
        let plan = unbind(&chain, &name("svc-b")).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                delete(TableId::IngressDispatch, DispatchKey::Index(priority(7))),
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Default,
                    "svc-c",
                    NextIndex::Index(priority(10)),
                ),
            ]
        );
        assert_eq!(plan.chain.head().unwrap().name, name("svc-c"));
    }

    #[test]
    fn unbind_interior_rekeys_head_predecessor_at_default() {
        // chain {B:5 (head), C:7, A:10}; unbind C
        let chain = vlan_ingress(&[("svc-b", 5), ("svc-c", 7), ("svc-a", 10)]);
        let plan = unbind(&chain, &name("svc-c")).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                delete(TableId::IngressDispatch, DispatchKey::Index(priority(7))),
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Default,
                    "svc-b",
                    NextIndex::Index(priority(10)),
                ),
            ]
        );
    }

    #[test]
    fn unbind_sole_member_deletes_default_entry() {
        let chain = vlan_ingress(&[("svc-a", 10)]);
        let plan = unbind(&chain, &name("svc-a")).unwrap();
        assert_eq!(
            plan.edits,
            vec![delete(TableId::IngressDispatch, DispatchKey::Default)]
        );
        assert!(plan.chain.is_empty());
    }

    #[test]
    fn unbind_tail_points_predecessor_at_terminal() {
        let chain = vlan_ingress(&[("svc-b", 5), ("svc-c", 7), ("svc-a", 10)]);
        let plan = unbind(&chain, &name("svc-a")).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                delete(TableId::IngressDispatch, DispatchKey::Index(priority(10))),
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Index(priority(7)),
                    "svc-c",
                    NextIndex::Terminal,
                ),
            ]
        );
    }

    #[test]
    fn egress_chains_use_the_egress_dispatch_table() {
        let chain = Chain::with_members(
            ChainKey::port(PortId::try_new(1).unwrap(), Direction::Egress),
            MediumKind::Vlan,
            [service("svc-a", 10)],
        )
        .unwrap();
        let plan = bind(&chain, service("svc-b", 5)).unwrap();
        for edit in &plan.edits {
            match edit {
                PlannedEdit::Install { table, .. } | PlannedEdit::Delete { table, .. } => {
                    assert_eq!(*table, TableId::EgressDispatch);
                }
            }
        }
    }

    #[test]
    fn duplicate_priority_aborts_before_any_edit() {
        let chain = vlan_ingress(&[("svc-a", 10)]);
        let result = bind(&chain, service("svc-b", 10));
        assert_eq!(
            result,
            Err(ChainError::DuplicatePriority {
                chain: chain.key(),
                name: name("svc-b"),
                priority: priority(10),
                occupant: name("svc-a"),
            })
        );
    }

    #[test]
    fn unbind_of_non_member_aborts_before_any_edit() {
        let chain = vlan_ingress(&[("svc-a", 10)]);
        let result = unbind(&chain, &name("svc-x"));
        assert_eq!(
            result,
            Err(ChainError::NotAMember {
                chain: chain.key(),
                name: name("svc-x"),
            })
        );
    }

    #[test]
    fn first_tunnel_ingress_service_lands_in_the_physical_table() {
        let chain = tunnel_ingress(&[]);
        let plan = bind(&chain, service("dispatch", 10)).unwrap();
        assert_eq!(
            plan.edits,
            vec![install(
                TableId::PhysicalIngress,
                DispatchKey::Default,
                "dispatch",
                NextIndex::Terminal,
            )]
        );
    }

    #[test]
    fn growing_past_one_member_migrates_off_the_fast_path() {
        let chain = tunnel_ingress(&[("dispatch", 10)]);
        let plan = bind(&chain, service("acl", 20)).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Index(priority(20)),
                    "acl",
                    NextIndex::Terminal,
                ),
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Default,
                    "dispatch",
                    NextIndex::Index(priority(20)),
                ),
                delete(TableId::PhysicalIngress, DispatchKey::Default),
            ]
        );
    }

    #[test]
    fn new_head_on_fast_path_chain_retires_the_physical_entry() {
        let chain = tunnel_ingress(&[("dispatch", 10)]);
        let plan = bind(&chain, service("acl", 5)).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Default,
                    "acl",
                    NextIndex::Index(priority(10)),
                ),
                install(
                    TableId::IngressDispatch,
                    DispatchKey::Index(priority(10)),
                    "dispatch",
                    NextIndex::Terminal,
                ),
                delete(TableId::PhysicalIngress, DispatchKey::Default),
            ]
        );
    }

    #[test]
    fn shrinking_to_one_member_migrates_back_onto_the_fast_path() {
        let chain = tunnel_ingress(&[("dispatch", 10), ("acl", 20)]);
        let plan = unbind(&chain, &name("acl")).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                delete(TableId::IngressDispatch, DispatchKey::Index(priority(20))),
                install(
                    TableId::PhysicalIngress,
                    DispatchKey::Default,
                    "dispatch",
                    NextIndex::Terminal,
                ),
                delete(TableId::IngressDispatch, DispatchKey::Default),
            ]
        );
    }

    #[test]
    fn unbinding_fast_path_head_promotes_into_the_physical_table() {
        let chain = tunnel_ingress(&[("dispatch", 10), ("acl", 20)]);
        let plan = unbind(&chain, &name("dispatch")).unwrap();
        assert_eq!(
            plan.edits,
            vec![
                delete(TableId::IngressDispatch, DispatchKey::Index(priority(20))),
                install(
                    TableId::PhysicalIngress,
                    DispatchKey::Default,
                    "acl",
                    NextIndex::Terminal,
                ),
                delete(TableId::IngressDispatch, DispatchKey::Default),
            ]
        );
    }

    #[test]
    fn unbind_sole_fast_path_member_deletes_from_the_physical_table() {
        let chain = tunnel_ingress(&[("dispatch", 10)]);
        let plan = unbind(&chain, &name("dispatch")).unwrap();
        assert_eq!(
            plan.edits,
            vec![delete(TableId::PhysicalIngress, DispatchKey::Default)]
        );
    }
}
