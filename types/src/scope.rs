// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Binding scopes: ports, port classes, directions, and chain keys.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::num::NonZero;

#[cfg(any(test, feature = "bolero"))]
pub use contract::*;

/// A switch-facing port id.
///
/// These are assigned by the switch at port discovery time.
/// They don't mean anything between switches or across switch restarts, so never persist one as
/// configuration.
#[repr(transparent)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(NonZero<u32>);

impl Debug for PortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Debug>::fmt(&self.0, f)
    }
}

impl Display for PortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

/// Errors which may occur when mapping an integer into a [`PortId`].
#[derive(Debug, thiserror::Error)]
pub enum PortIdError {
    /// The provided value was zero.
    #[error("port id must not be zero")]
    Zero,
}

impl PortId {
    /// Treat the provided `NonZero<u32>` as a [`PortId`].
    #[must_use]
    pub const fn new(raw: NonZero<u32>) -> PortId {
        PortId(raw)
    }

    /// Treat the provided `u32` as a [`PortId`].
    ///
    /// # Errors
    ///
    /// Returns an error if the provided value is zero.
    pub fn try_new(raw: u32) -> Result<Self, PortIdError> {
        raw.try_into()
    }

    /// Treat this [`PortId`] as a `u32`.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for PortId {
    type Error = PortIdError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match NonZero::new(value) {
            Some(raw) => Ok(PortId::new(raw)),
            None => Err(PortIdError::Zero),
        }
    }
}

impl From<PortId> for u32 {
    fn from(value: PortId) -> Self {
        value.to_u32()
    }
}

/// The direction in which a chain processes traffic on its port.
#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum Direction {
    /// Packets entering the pipeline from the port.
    Ingress,
    /// Packets leaving the pipeline toward the port.
    Egress,
}

/// The medium class of a port.
///
/// Tunnel-class ports receive traffic which arrives pre-classified at the tunnel endpoint, which
/// is what makes the single-service ingress fast path possible for them.
#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum MediumKind {
    /// A vlan-tagged switch port.
    Vlan,
    /// A tunnel endpoint (vxlan or similar).
    Tunnel,
}

/// What a service is bound to: one port, or every port of a medium class.
#[derive(
    Copy, Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize,
)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum BindScope {
    /// A single port.
    Port(PortId),
    /// All ports currently carrying the given medium.
    PortType(MediumKind),
}

impl Display for BindScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BindScope::Port(port) => write!(f, "port {port}"),
            BindScope::PortType(medium) => write!(f, "port-type {medium}"),
        }
    }
}

/// The key identifying one chain: a binding scope plus a direction.
///
/// All work on one chain is serialized under this key.
#[derive(
    Copy, Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize,
)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub struct ChainKey {
    /// The scope the chain's services are bound to.
    pub scope: BindScope,
    /// The direction the chain processes.
    pub direction: Direction,
}

impl ChainKey {
    /// The chain key for a single port in the given direction.
    #[must_use]
    pub const fn port(port: PortId, direction: Direction) -> ChainKey {
        ChainKey {
            scope: BindScope::Port(port),
            direction,
        }
    }

    /// The chain key for every port of the given medium in the given direction.
    #[must_use]
    pub const fn port_type(medium: MediumKind, direction: Direction) -> ChainKey {
        ChainKey {
            scope: BindScope::PortType(medium),
            direction,
        }
    }
}

impl Display for ChainKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{direction} on {scope}", direction = self.direction, scope = self.scope)
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::PortId;
    use bolero::{Driver, TypeGenerator};
    use std::num::NonZero;

    impl TypeGenerator for PortId {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let raw = driver.produce::<u32>()?;
            Some(PortId::new(NonZero::new(raw).unwrap_or(NonZero::<u32>::MIN)))
        }
    }
}
