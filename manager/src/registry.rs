// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The set of ports the manager currently knows about.
//!
//! Port discovery and lifecycle live outside this system; whatever watches the switch feeds
//! additions and removals in here so that port-type-scoped operations know which ports to fan
//! out over.

use std::collections::BTreeMap;
use types::{MediumKind, PortId};

/// The known ports and their medium classes.
#[derive(Debug, Default, Clone)]
pub struct PortRegistry {
    ports: BTreeMap<PortId, MediumKind>,
}

impl PortRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> PortRegistry {
        PortRegistry::default()
    }

    /// Record `port` as carrying `medium`, returning the medium it previously carried, if any.
    pub fn add(&mut self, port: PortId, medium: MediumKind) -> Option<MediumKind> {
        self.ports.insert(port, medium)
    }

    /// Forget `port`, returning the medium it carried, if it was known.
    pub fn remove(&mut self, port: PortId) -> Option<MediumKind> {
        self.ports.remove(&port)
    }

    /// The medium `port` carries, if the port is known.
    #[must_use]
    pub fn medium_of(&self, port: PortId) -> Option<MediumKind> {
        self.ports.get(&port).copied()
    }

    /// Every known port currently carrying `medium`, in port-id order.
    #[must_use]
    pub fn ports_of(&self, medium: MediumKind) -> Vec<PortId> {
        self.ports
            .iter()
            .filter(|(_, m)| **m == medium)
            .map(|(port, _)| *port)
            .collect()
    }

    /// The number of known ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// True if no port is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use crate::PortRegistry;
    use types::{MediumKind, PortId};

    fn port(id: u32) -> PortId {
        PortId::try_new(id).unwrap()
    }

    #[test]
    fn ports_of_filters_by_medium_in_id_order() {
        let mut registry = PortRegistry::new();
        registry.add(port(3), MediumKind::Tunnel);
        registry.add(port(1), MediumKind::Tunnel);
        registry.add(port(2), MediumKind::Vlan);
        assert_eq!(registry.ports_of(MediumKind::Tunnel), vec![port(1), port(3)]);
        assert_eq!(registry.ports_of(MediumKind::Vlan), vec![port(2)]);
    }

    #[test]
    fn re_adding_a_port_reports_the_previous_medium() {
        let mut registry = PortRegistry::new();
        assert_eq!(registry.add(port(1), MediumKind::Vlan), None);
        assert_eq!(
            registry.add(port(1), MediumKind::Tunnel),
            Some(MediumKind::Vlan)
        );
        assert_eq!(registry.medium_of(port(1)), Some(MediumKind::Tunnel));
    }
}
