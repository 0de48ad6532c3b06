//! Caller identity used to scope store operations.

use serde::{Deserialize, Serialize};

use super::errors::LifecycleError;
use super::ids::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// Who is asking. Point operations are keyed by `owner_id`; bulk operations
/// need `Role::Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub owner_id: OwnerId,
    pub role: Role,
}

impl Caller {
    pub fn user(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            role: Role::User,
        }
    }

    pub fn admin(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            role: Role::Admin,
        }
    }

    pub fn require_admin(&self, operation: &str) -> Result<(), LifecycleError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::User => Err(LifecycleError::Forbidden(format!(
                "{operation} requires admin, caller is {}",
                self.owner_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn only_admins_pass_the_admin_check() {
        let owner = OwnerId::from_ulid(Ulid::new());
        assert!(Caller::admin(owner).require_admin("cleanup").is_ok());

        let err = Caller::user(owner).require_admin("cleanup").unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(msg) if msg.contains("cleanup")));
    }
}
