use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::chain::ApprovalChain;
use crate::domain::role::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Submit,
    Renew,
    Vacate,
    Approve,
    Reject,
    Inspect,
    ManageUsers,
    ManageRates,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Renew => "renew",
            Self::Vacate => "vacate",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Inspect => "inspect",
            Self::ManageUsers => "manage_users",
            Self::ManageRates => "manage_rates",
        }
    }
}

/// Role → allowed operations, derived once from the configured chain and inspection role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionTable {
    grants: BTreeMap<Role, BTreeSet<Capability>>,
}

impl PermissionTable {
    pub fn new(chain: &ApprovalChain, inspection_role: Role) -> Self {
        let mut grants: BTreeMap<Role, BTreeSet<Capability>> =
            Role::ALL.iter().map(|role| (*role, BTreeSet::new())).collect();

        let mut grant = |role: Role, capabilities: &[Capability]| {
            grants.entry(role).or_default().extend(capabilities.iter().copied());
        };

        grant(Role::Requester, &[Capability::Submit, Capability::Renew, Capability::Vacate]);
        grant(Role::Admin, &[Capability::ManageUsers, Capability::ManageRates]);
        for role in chain.roles() {
            grant(*role, &[Capability::Approve, Capability::Reject]);
        }
        grant(inspection_role, &[Capability::Inspect]);

        Self { grants }
    }

    pub fn allows(&self, role: Role, capability: Capability) -> bool {
        self.grants.get(&role).is_some_and(|capabilities| capabilities.contains(&capability))
    }
}
