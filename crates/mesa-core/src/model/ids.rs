use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// A store operating on the platform.
    TenantId
);
uuid_id!(
    /// An account that acts inside one or more tenants.
    UserId
);
uuid_id!(RoleId);
uuid_id!(AccessGroupId);
uuid_id!(PlanId);
uuid_id!(ModuleId);
uuid_id!(SubscriptionId);

/// Catalog key of a feature area, e.g. `coupons` or `dashboard`.
///
/// Keys are lowercase ASCII letters, digits, `_` and `-`, at most 64 bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleKey(String);

pub const MAX_MODULE_KEY_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidModuleKey {
    #[error("module key must not be empty")]
    Empty,

    #[error("module key is {0} bytes, limit is {max}", max = MAX_MODULE_KEY_LEN)]
    TooLong(usize),

    #[error("module key contains invalid character {0:?}")]
    InvalidChar(char),
}

impl ModuleKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidModuleKey> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidModuleKey::Empty);
        }
        if raw.len() > MAX_MODULE_KEY_LEN {
            return Err(InvalidModuleKey::TooLong(raw.len()));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
        {
            return Err(InvalidModuleKey::InvalidChar(c));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModuleKey {
    type Error = InvalidModuleKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for ModuleKey {
    type Error = InvalidModuleKey;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ModuleKey> for String {
    fn from(key: ModuleKey) -> Self {
        key.0
    }
}

impl std::str::FromStr for ModuleKey {
    type Err = InvalidModuleKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::borrow::Borrow<str> for ModuleKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
