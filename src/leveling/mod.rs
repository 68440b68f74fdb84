//! Experience and levels.
//!
//! Every qualifying message grants a bit of experience, rate limited per user.  Crossing a level
//! threshold swaps the user's level role and announces the level up.

mod cooldown;
mod coordinator;
pub mod curve;
pub(crate) mod roles;

pub use cooldown::CooldownTracker;
pub use coordinator::{
    ExperienceSummary, LevelNotifier, LevelUpCoordinator, LevelUpNotice, LevelUpOutcome,
    MessageReceived,
};
pub use roles::{LevelRoles, RoleMembership, RoleSync, RoleSyncPolicy};

use crate::store::StoreError;
use serenity::all::{RoleId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum LevelingError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    #[error("{0}")]
    InvalidAdministrativeInput(String),

    #[error("role sync for user {user} partially failed: {}", .failures.join("; "))]
    RoleSyncPartialFailure {
        user: UserId,
        /// Level role the user ended up with, if the addition went through
        assigned: Option<RoleId>,
        failures: Vec<String>,
    },
}

/// Reject administrative requests that have no target or a non-positive amount.
pub fn validate_admin_input(users: &[UserId], amount: i64) -> Result<u64, LevelingError> {
    if users.is_empty() {
        return Err(LevelingError::InvalidAdministrativeInput(
            "You need to mention at least one member.".to_owned(),
        ));
    }

    match u64::try_from(amount) {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(LevelingError::InvalidAdministrativeInput(
            "The amount of experience must be greater than zero.".to_owned(),
        )),
    }
}
