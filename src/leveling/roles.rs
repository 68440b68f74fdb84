use super::LevelingError;
use crate::config::LevelRole;
use anyhow::Result;
use serenity::all::{RoleId, UserId};
use std::collections::BTreeMap;

/// Roles handed out when a user reaches a level.  A user holds at most one of them.
#[derive(Clone, Debug, Default)]
pub struct LevelRoles(BTreeMap<u32, RoleId>);

impl LevelRoles {
    pub fn new(roles: &[LevelRole]) -> Self {
        Self(roles.iter().map(|r| (r.level, r.role_id)).collect())
    }

    pub fn role_for(&self, level: u32) -> Option<RoleId> {
        self.0.get(&level).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, RoleId)> + '_ {
        self.0.iter().map(|(level, role)| (*level, *role))
    }
}

/// Role membership operations of the chat platform.
#[serenity::async_trait]
pub trait RoleMembership: Send + Sync {
    async fn member_roles(&self, user: UserId) -> Result<Vec<RoleId>>;
    async fn add_role(&self, user: UserId, role: RoleId) -> Result<()>;
    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<()>;
    /// Every member holding `role`.
    async fn role_members(&self, role: RoleId) -> Result<Vec<UserId>>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum RoleSync {
    /// The new level has no role; nothing was touched.
    Unmapped,
    Synced {
        assigned: RoleId,
        removed: Vec<RoleId>,
    },
}

/// Keeps a user's level role in line with their level.
pub struct RoleSyncPolicy {
    roles: LevelRoles,
}

impl RoleSyncPolicy {
    pub fn new(roles: LevelRoles) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> &LevelRoles {
        &self.roles
    }

    /// On a level change into a mapped level, strip every other level role the user holds and
    /// give them the new one.  Removals are issued first.  If the user's current roles can't be
    /// read, every level role is removed.
    pub async fn sync(
        &self,
        membership: &dyn RoleMembership,
        user: UserId,
        old_level: u32,
        new_level: u32,
    ) -> Result<RoleSync, LevelingError> {
        let Some(target) = self.roles.role_for(new_level) else {
            return Ok(RoleSync::Unmapped);
        };
        if old_level == new_level {
            return Ok(RoleSync::Unmapped);
        }

        let mut failures = Vec::new();
        let held = match membership.member_roles(user).await {
            Ok(held) => Some(held),
            Err(err) => {
                failures.push(format!("could not read roles: {err}"));
                None
            }
        };
        let holds = |role: RoleId| held.as_ref().map_or(true, |held| held.contains(&role));

        let mut removed = Vec::new();
        for (_, role) in self.roles.iter() {
            if role == target || !holds(role) {
                continue;
            }
            match membership.remove_role(user, role).await {
                Ok(()) => removed.push(role),
                Err(err) => failures.push(format!("could not remove role {role}: {err}")),
            }
        }

        let assigned = if held.as_ref().is_some_and(|held| held.contains(&target)) {
            true
        } else {
            match membership.add_role(user, target).await {
                Ok(()) => true,
                Err(err) => {
                    failures.push(format!("could not add role {target}: {err}"));
                    false
                }
            }
        };

        if failures.is_empty() {
            Ok(RoleSync::Synced {
                assigned: target,
                removed,
            })
        } else {
            Err(LevelingError::RoleSyncPartialFailure {
                user,
                assigned: assigned.then_some(target),
                failures,
            })
        }
    }
}
