use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Requester,
    Bum,
    Wcm,
    MfgFm,
    IePlant,
}

impl Role {
    pub const ALL: [Role; 6] =
        [Role::Admin, Role::Requester, Role::Bum, Role::Wcm, Role::MfgFm, Role::IePlant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Requester => "requester",
            Self::Bum => "bum",
            Self::Wcm => "wcm",
            Self::MfgFm => "mfg_fm",
            Self::IePlant => "ie_plant",
        }
    }

    /// Label used in user-facing text, e.g. `MFG FM`.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Requester => "Requester",
            Self::Bum => "BUM",
            Self::Wcm => "WCM",
            Self::MfgFm => "MFG FM",
            Self::IePlant => "IE Plant",
        }
    }

    /// Roles that only administer or originate requests and can never sit in a chain.
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Admin | Self::Requester)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}` (expected admin|requester|bum|wcm|mfg_fm|ie_plant)")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '_' | '-'))
            .map(|ch| ch.to_ascii_lowercase())
            .collect();

        match key.as_str() {
            "admin" => Ok(Self::Admin),
            "requester" => Ok(Self::Requester),
            "bum" => Ok(Self::Bum),
            "wcm" => Ok(Self::Wcm),
            "mfgfm" => Ok(Self::MfgFm),
            "ieplant" => Ok(Self::IePlant),
            _ => Err(UnknownRole(value.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller identity already resolved by the user directory. The lifecycle trusts it as given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self { id: UserId(id.into()), name: name.into(), role }
    }
}

/// Directory record for a user. Contact fields are carried for display only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub work_id: Option<String>,
    pub phone: Option<String>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor { id: self.id.clone(), name: self.name.clone(), role: self.role }
    }
}
