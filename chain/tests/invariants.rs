// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Structural invariants of the chain editor under arbitrary operation sequences.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use flowbind_chain::{Chain, ChainError, Service, TableImage, bind, unbind};
use types::{ChainKey, Direction, MediumKind, PortId, ServiceName, ServicePriority};

fn service(priority: ServicePriority) -> Service {
    Service::new(
        ServiceName::try_from(format!("svc-{priority}")).unwrap(),
        priority,
    )
}

fn chain_key(direction: Direction) -> ChainKey {
    ChainKey::port(PortId::try_new(1).unwrap(), direction)
}

/// Every prefix of every operation sequence must leave the materialized chain well-linked:
/// starting from the default index and following next pointers visits every member exactly once,
/// in priority order, and terminates at the sentinel.
#[test]
fn walk_invariant_holds_under_arbitrary_operation_sequences() {
    bolero::check!().with_type().for_each(
        |(medium, direction, ops): &(MediumKind, Direction, Vec<(bool, ServicePriority)>)| {
            let mut chain = Chain::new(chain_key(*direction), *medium);
            let mut image = TableImage::new();
            for (is_bind, priority) in ops {
                if *is_bind {
                    match bind(&chain, service(*priority)) {
                        Ok(plan) => {
                            image.apply(&plan.edits);
                            chain = plan.chain;
                        }
                        Err(ChainError::DuplicatePriority { .. }) => {
                            assert!(chain.member_at(*priority).is_some());
                        }
                        Err(error) => panic!("unexpected bind error: {error}"),
                    }
                } else {
                    let name = service(*priority).name;
                    match unbind(&chain, &name) {
                        Ok(plan) => {
                            image.apply(&plan.edits);
                            chain = plan.chain;
                        }
                        Err(ChainError::NotAMember { .. }) => {
                            assert!(chain.member_by_name(&name).is_none());
                        }
                        Err(error) => panic!("unexpected unbind error: {error}"),
                    }
                }
                image.verify(&chain).unwrap();
            }
        },
    );
}

/// Bind(s) then Unbind(s) must restore the exact entry layout, keys and next pointers included.
#[test]
fn bind_then_unbind_round_trips_the_entry_layout() {
    bolero::check!().with_type().for_each(
        |(medium, direction, base, subject): &(
            MediumKind,
            Direction,
            Vec<ServicePriority>,
            ServicePriority,
        )| {
            let mut chain = Chain::new(chain_key(*direction), *medium);
            let mut image = TableImage::new();
            for priority in base {
                if let Ok(plan) = bind(&chain, service(*priority)) {
                    image.apply(&plan.edits);
                    chain = plan.chain;
                }
            }
            if chain.member_at(*subject).is_some() {
                return;
            }
            let before = image.clone();

            let bound = bind(&chain, service(*subject)).unwrap();
            image.apply(&bound.edits);
            image.verify(&bound.chain).unwrap();

            let unbound = unbind(&bound.chain, &service(*subject).name).unwrap();
            image.apply(&unbound.edits);

            assert_eq!(before, image);
            assert_eq!(chain, unbound.chain);
        },
    );
}

/// The editor never emits more than two edits, except when a chain crosses the fast-path
/// boundary, which retires one extra entry.
#[test]
fn plans_stay_within_the_edit_budget() {
    bolero::check!().with_type().for_each(
        |(medium, direction, ops): &(MediumKind, Direction, Vec<(bool, ServicePriority)>)| {
            let mut chain = Chain::new(chain_key(*direction), *medium);
            for (is_bind, priority) in ops {
                let result = if *is_bind {
                    bind(&chain, service(*priority))
                } else {
                    unbind(&chain, &service(*priority).name)
                };
                let Ok(plan) = result else { continue };
                let budget =
                    if chain.fast_path_eligible() && (chain.len() <= 2 || plan.chain.len() <= 2) {
                        3
                    } else {
                        2
                    };
                assert!(
                    plan.edits.len() <= budget,
                    "{count} edits exceed budget {budget}",
                    count = plan.edits.len(),
                );
                chain = plan.chain;
            }
        },
    );
}
