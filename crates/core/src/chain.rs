//! Ordered approval chain. The chain decides who acts next; the request only stores the pointer.

use serde::Serialize;
use thiserror::Error;

use crate::domain::role::Role;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("approval chain must contain at least one role")]
    Empty,
    #[error("role {0} appears more than once in the approval chain")]
    Duplicate(Role),
    #[error("role {0} cannot take part in the approval chain")]
    NonOperational(Role),
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("role {0} is not part of the approval chain")]
pub struct RoleNotInChain(pub Role);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalChain {
    roles: Vec<Role>,
}

impl ApprovalChain {
    pub fn new(roles: Vec<Role>) -> Result<Self, ChainError> {
        if roles.is_empty() {
            return Err(ChainError::Empty);
        }

        for (index, role) in roles.iter().enumerate() {
            if !role.is_operational() {
                return Err(ChainError::NonOperational(*role));
            }
            if roles[..index].contains(role) {
                return Err(ChainError::Duplicate(*role));
            }
        }

        Ok(Self { roles })
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn first(&self) -> Role {
        self.roles[0]
    }

    pub fn position(&self, role: Role) -> Result<usize, RoleNotInChain> {
        self.roles.iter().position(|candidate| *candidate == role).ok_or(RoleNotInChain(role))
    }

    /// `None` both for the last role and for roles outside the chain; use `position` to tell them apart.
    pub fn successor(&self, role: Role) -> Option<Role> {
        let index = self.position(role).ok()?;
        self.roles.get(index + 1).copied()
    }

    pub fn is_last(&self, role: Role) -> bool {
        self.roles.last() == Some(&role)
    }
}

impl Default for ApprovalChain {
    fn default() -> Self {
        Self { roles: vec![Role::Bum, Role::Wcm, Role::MfgFm, Role::IePlant] }
    }
}
