// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Service naming and priority types.

use std::fmt::{Debug, Display, Formatter};
use std::num::NonZero;

#[cfg(any(test, feature = "bolero"))]
pub use contract::*;

const MAX_SERVICE_NAME_LEN: usize = 48;

/// A string which has been checked to be a legal service name.
///
/// Legal service names are composed only of alphanumeric ASCII characters, `.`, `-`, and `_`.
///
/// The maximum legal length of a `ServiceName` is 48 bytes.
/// A service name must be unique within the chain it is bound to.
#[repr(transparent)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct ServiceName(String);

impl Display for ServiceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ServiceName {
    /// The maximum legal length of a service name.
    pub const MAX_LEN: usize = MAX_SERVICE_NAME_LEN;
}

/// Errors which may occur when mapping a general `String` into a [`ServiceName`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum IllegalServiceName {
    /// The empty string is not a legal service name.
    #[error("service name must be at least one character")]
    Empty,
    /// A string which is longer than 48 bytes was submitted.
    #[error("service name {0} is too long")]
    TooLong(String),
    /// The supplied string is not legal ASCII.
    #[error("service name {0} is not ascii")]
    NotAscii(String),
    /// The supplied string contains an illegal character.
    #[error(
        "service name {0} contains illegal characters (only alphanumeric ASCII and .-_ are permitted)"
    )]
    IllegalCharacters(String),
}

impl TryFrom<String> for ServiceName {
    type Error = IllegalServiceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        const LEGAL_PUNCT: [char; 3] = ['.', '-', '_'];
        if value.is_empty() {
            return Err(IllegalServiceName::Empty);
        }
        if !value.is_ascii() {
            return Err(IllegalServiceName::NotAscii(value));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || LEGAL_PUNCT.contains(&c))
        {
            return Err(IllegalServiceName::IllegalCharacters(value));
        }
        if value.len() > ServiceName::MAX_LEN {
            return Err(IllegalServiceName::TooLong(value));
        }
        Ok(ServiceName(value))
    }
}

impl TryFrom<&str> for ServiceName {
    type Error = IllegalServiceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl From<ServiceName> for String {
    fn from(value: ServiceName) -> Self {
        value.0
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// The execution priority of a bound service.
///
/// Smaller values execute earlier.
/// The priority doubles as the pipeline index at which the service's non-head dispatch entry is
/// keyed, which is why zero is illegal: index zero is reserved as the default index through which
/// the chain head is reached.
#[repr(transparent)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u16", into = "u16")]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServicePriority(NonZero<u16>);

impl Debug for ServicePriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Debug>::fmt(&self.0, f)
    }
}

impl Display for ServicePriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

/// Errors which may occur when mapping an integer into a [`ServicePriority`].
#[derive(Debug, thiserror::Error)]
pub enum ServicePriorityError {
    /// Zero is reserved as the default index.
    #[error("service priority must not be zero (zero is the reserved default index)")]
    Zero,
}

impl ServicePriority {
    /// Treat the provided `NonZero<u16>` as a [`ServicePriority`].
    #[must_use]
    pub const fn new(raw: NonZero<u16>) -> ServicePriority {
        ServicePriority(raw)
    }

    /// Treat the provided `u16` as a [`ServicePriority`].
    ///
    /// # Errors
    ///
    /// Returns an error if the provided value is zero.
    pub fn try_new(raw: u16) -> Result<Self, ServicePriorityError> {
        raw.try_into()
    }

    /// Treat this [`ServicePriority`] as a `u16`.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self.0.get()
    }
}

impl TryFrom<u16> for ServicePriority {
    type Error = ServicePriorityError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match NonZero::new(value) {
            Some(raw) => Ok(ServicePriority::new(raw)),
            None => Err(ServicePriorityError::Zero),
        }
    }
}

impl From<ServicePriority> for u16 {
    fn from(value: ServicePriority) -> Self {
        value.to_u16()
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::{ServiceName, ServicePriority};
    use bolero::{Driver, TypeGenerator};
    use std::num::NonZero;
    use std::ops::Bound;

    const NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789.-_";

    impl TypeGenerator for ServiceName {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let len = driver.gen_usize(Bound::Included(&1), Bound::Included(&15))?;
            let mut name = String::with_capacity(len);
            for _ in 0..len {
                let idx =
                    driver.gen_usize(Bound::Included(&0), Bound::Excluded(&NAME_CHARSET.len()))?;
                name.push(char::from(NAME_CHARSET[idx]));
            }
            ServiceName::try_from(name).ok()
        }
    }

    impl TypeGenerator for ServicePriority {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let raw = driver.produce::<u16>()?;
            Some(ServicePriority::new(
                NonZero::new(raw).unwrap_or(NonZero::<u16>::MIN),
            ))
        }
    }
}
