use super::{
    curve::{level_from_experience, Progress},
    CooldownTracker, LevelingError, RoleMembership, RoleSync, RoleSyncPolicy,
};
use crate::store::{BulkOutcome, CounterStore};
use anyhow::Result;
use rand::Rng;
use serenity::all::{ChannelId, MessageId, RoleId, UserId};
use std::{ops::RangeInclusive, sync::Arc};
use tokio::time::Instant;

/// A message arrived from the gateway.
#[derive(Clone, Debug)]
pub struct MessageReceived {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub timestamp: Instant,
    /// Sent by a bot or webhook
    pub is_automated: bool,
}

/// Sent to the chat when a user reaches a new level.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelUpNotice {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    /// The message that triggered the level up.  The notice is sent as a reply to it.
    pub message_id: MessageId,
    pub new_level: u32,
    pub assigned_role: Option<RoleId>,
}

#[serenity::async_trait]
pub trait LevelNotifier: Send + Sync {
    async fn notify_level_up(&self, notice: &LevelUpNotice) -> Result<()>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum LevelUpOutcome {
    /// The sender doesn't earn experience.
    Ignored,
    OnCooldown,
    NoChange {
        experience: u64,
    },
    LeveledUp {
        old_level: u32,
        new_level: u32,
        experience: u64,
        assigned_role: Option<RoleId>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExperienceSummary {
    pub experience: u64,
    pub progress: Progress,
}

impl ExperienceSummary {
    pub fn level(&self) -> u32 {
        self.progress.level
    }
}

/// Grants experience for messages and reacts to level changes.
pub struct LevelUpCoordinator {
    store: CounterStore,
    cooldown: CooldownTracker<UserId>,
    roles: RoleSyncPolicy,
    grant: RangeInclusive<u64>,
    membership: Arc<dyn RoleMembership>,
    notifier: Arc<dyn LevelNotifier>,
}

impl LevelUpCoordinator {
    pub fn new(
        store: CounterStore,
        cooldown: CooldownTracker<UserId>,
        roles: RoleSyncPolicy,
        grant: RangeInclusive<u64>,
        membership: Arc<dyn RoleMembership>,
        notifier: Arc<dyn LevelNotifier>,
    ) -> Self {
        Self {
            store,
            cooldown,
            roles,
            grant,
            membership,
            notifier,
        }
    }

    pub fn roles(&self) -> &RoleSyncPolicy {
        &self.roles
    }

    /// Handle a message, logging rather than returning any failure.
    pub async fn on_message_received(&self, event: MessageReceived) {
        let user_id = event.user_id;
        match self.process(event).await {
            Ok(LevelUpOutcome::LeveledUp { new_level, .. }) => {
                tracing::info!(%user_id, new_level, "user leveled up");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(%user_id, "could not grant experience: {err}");
            }
        }
    }

    /// Run a message through cooldown, experience grant and level comparison.  Storage errors
    /// abort the event.  Role sync and notification failures are logged and don't.
    pub async fn process(&self, event: MessageReceived) -> Result<LevelUpOutcome, LevelingError> {
        if event.is_automated {
            return Ok(LevelUpOutcome::Ignored);
        }

        if !self.cooldown.try_consume(event.user_id, event.timestamp) {
            return Ok(LevelUpOutcome::OnCooldown);
        }

        let old_experience = self.store.get_or_insert(event.user_id).await?;
        let old_level = level_from_experience(old_experience);

        let amount = rand::rng().random_range(self.grant.clone());
        let experience = self.store.add(event.user_id, to_delta(amount)).await?;
        let new_level = level_from_experience(experience);

        if new_level == old_level {
            return Ok(LevelUpOutcome::NoChange { experience });
        }

        let assigned_role = match self
            .roles
            .sync(self.membership.as_ref(), event.user_id, old_level, new_level)
            .await
        {
            Ok(RoleSync::Synced { assigned, .. }) => Some(assigned),
            Ok(RoleSync::Unmapped) => None,
            Err(LevelingError::RoleSyncPartialFailure {
                user,
                assigned,
                failures,
            }) => {
                tracing::warn!(
                    user_id = %user,
                    "level role sync partially failed: {}",
                    failures.join("; ")
                );
                assigned
            }
            Err(err) => {
                tracing::warn!(user_id = %event.user_id, "level role sync failed: {err}");
                None
            }
        };

        let notice = LevelUpNotice {
            user_id: event.user_id,
            channel_id: event.channel_id,
            message_id: event.message_id,
            new_level,
            assigned_role,
        };
        if let Err(err) = self.notifier.notify_level_up(&notice).await {
            tracing::warn!(user_id = %event.user_id, "could not announce level up: {err}");
        }

        Ok(LevelUpOutcome::LeveledUp {
            old_level,
            new_level,
            experience,
            assigned_role,
        })
    }

    /// The member left; forget everything about them.
    pub async fn on_member_removed(&self, user_id: UserId) -> Result<(), LevelingError> {
        self.cooldown.forget(&user_id);
        self.store.delete(user_id).await?;
        Ok(())
    }

    pub async fn get_experience_summary(
        &self,
        user_id: UserId,
    ) -> Result<ExperienceSummary, LevelingError> {
        let experience = self.store.get(user_id).await?;
        Ok(ExperienceSummary {
            experience,
            progress: Progress::of(experience),
        })
    }

    pub async fn grant_experience(&self, user_id: UserId, amount: u64) -> Result<u64, LevelingError> {
        Ok(self.store.add(user_id, to_delta(amount)).await?)
    }

    pub async fn remove_experience(
        &self,
        user_id: UserId,
        amount: u64,
    ) -> Result<u64, LevelingError> {
        Ok(self.store.add(user_id, -to_delta(amount)).await?)
    }

    pub async fn set_experience(&self, user_id: UserId, value: u64) -> Result<u64, LevelingError> {
        Ok(self.store.set(user_id, value).await?)
    }

    /// Grant `amount` to each user.  Users are updated one at a time; a failure for one user
    /// leaves the others' updates in place.
    pub async fn bulk_grant_experience(
        &self,
        user_ids: &[UserId],
        amount: u64,
    ) -> Result<Vec<BulkOutcome>, LevelingError> {
        Ok(self.store.bulk_add(user_ids, to_delta(amount)).await?)
    }

    pub async fn bulk_remove_experience(
        &self,
        user_ids: &[UserId],
        amount: u64,
    ) -> Result<Vec<BulkOutcome>, LevelingError> {
        Ok(self.store.bulk_add(user_ids, -to_delta(amount)).await?)
    }

    pub async fn bulk_set_experience(
        &self,
        user_ids: &[UserId],
        value: u64,
    ) -> Result<Vec<BulkOutcome>, LevelingError> {
        Ok(self.store.bulk_set(user_ids, value).await?)
    }
}

fn to_delta(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        leveling::{
            curve::threshold,
            roles::tests::{mapping, FakeMembership},
        },
        store::{tests::temp_db, Database, LEVELS},
    };
    use std::{collections::HashSet, sync::Mutex, time::Duration};

    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<LevelUpNotice>>,
        fail: bool,
    }

    #[serenity::async_trait]
    impl LevelNotifier for FakeNotifier {
        async fn notify_level_up(&self, notice: &LevelUpNotice) -> Result<()> {
            if self.fail {
                anyhow::bail!("channel deleted");
            }
            self.sent.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        db: Database,
        store: CounterStore,
        membership: Arc<FakeMembership>,
        notifier: Arc<FakeNotifier>,
        coordinator: LevelUpCoordinator,
    }

    async fn harness(grant: RangeInclusive<u64>, membership: FakeMembership) -> Harness {
        harness_with_notifier(grant, membership, FakeNotifier::default()).await
    }

    async fn harness_with_notifier(
        grant: RangeInclusive<u64>,
        membership: FakeMembership,
        notifier: FakeNotifier,
    ) -> Harness {
        let (dir, db) = temp_db().await;
        let store = CounterStore::new(db.clone(), LEVELS);
        let membership = Arc::new(membership);
        let notifier = Arc::new(notifier);
        let coordinator = LevelUpCoordinator::new(
            store.clone(),
            CooldownTracker::new(Duration::from_secs(60), 1),
            RoleSyncPolicy::new(mapping()),
            grant,
            membership.clone(),
            notifier.clone(),
        );
        Harness {
            _dir: dir,
            db,
            store,
            membership,
            notifier,
            coordinator,
        }
    }

    const USER: UserId = UserId::new(42);

    fn message(timestamp: Instant) -> MessageReceived {
        MessageReceived {
            user_id: USER,
            channel_id: ChannelId::new(7),
            message_id: MessageId::new(1000),
            timestamp,
            is_automated: false,
        }
    }

    #[tokio::test]
    async fn new_user_gets_a_grant_in_range() {
        let h = harness(15..=25, FakeMembership::default()).await;

        let outcome = h.coordinator.process(message(Instant::now())).await.unwrap();

        let LevelUpOutcome::NoChange { experience } = outcome else {
            panic!("a single grant can't reach level 1");
        };
        assert!((15..=25).contains(&experience));
        assert_eq!(h.store.get(USER).await.unwrap(), experience);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn automated_senders_are_ignored() {
        let h = harness(15..=25, FakeMembership::default()).await;
        let event = MessageReceived {
            is_automated: true,
            ..message(Instant::now())
        };

        assert_eq!(
            h.coordinator.process(event).await.unwrap(),
            LevelUpOutcome::Ignored
        );
        assert!(!h.store.exists(USER).await.unwrap());
    }

    #[tokio::test]
    async fn second_message_within_window_grants_nothing() {
        let h = harness(20..=20, FakeMembership::default()).await;
        let start = Instant::now();

        h.coordinator.process(message(start)).await.unwrap();
        let outcome = h
            .coordinator
            .process(message(start + Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(outcome, LevelUpOutcome::OnCooldown);
        assert_eq!(h.store.get(USER).await.unwrap(), 20);

        let outcome = h
            .coordinator
            .process(message(start + Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(outcome, LevelUpOutcome::NoChange { experience: 40 });
    }

    #[tokio::test]
    async fn crossing_threshold_levels_up_assigns_role_and_notifies() {
        let h = harness(15..=15, FakeMembership::default()).await;
        h.store.set(USER, threshold(1) - 1).await.unwrap();

        let outcome = h.coordinator.process(message(Instant::now())).await.unwrap();

        assert_eq!(
            outcome,
            LevelUpOutcome::LeveledUp {
                old_level: 0,
                new_level: 1,
                experience: threshold(1) + 14,
                assigned_role: Some(RoleId::new(101)),
            }
        );
        assert_eq!(h.membership.held(USER), HashSet::from([RoleId::new(101)]));
        // No earlier level role existed, so nothing was removed.
        assert_eq!(*h.membership.calls.lock().unwrap(), vec!["add 101"]);
        assert_eq!(
            *h.notifier.sent.lock().unwrap(),
            vec![LevelUpNotice {
                user_id: USER,
                channel_id: ChannelId::new(7),
                message_id: MessageId::new(1000),
                new_level: 1,
                assigned_role: Some(RoleId::new(101)),
            }]
        );
    }

    #[tokio::test]
    async fn big_grant_for_new_user_reaches_level_one() {
        let h = harness(120..=120, FakeMembership::default()).await;

        let outcome = h.coordinator.process(message(Instant::now())).await.unwrap();

        assert!(matches!(
            outcome,
            LevelUpOutcome::LeveledUp {
                old_level: 0,
                new_level: 1,
                experience: 120,
                ..
            }
        ));
        assert_eq!(*h.membership.calls.lock().unwrap(), vec!["add 101"]);
    }

    #[tokio::test]
    async fn leveling_into_mapped_level_replaces_old_role() {
        let membership =
            FakeMembership::with_roles(USER, &[RoleId::new(101), RoleId::new(120)]);
        let h = harness(25..=25, membership).await;
        h.store.set(USER, threshold(10) - 1).await.unwrap();

        h.coordinator.process(message(Instant::now())).await.unwrap();

        assert_eq!(h.membership.held(USER), HashSet::from([RoleId::new(110)]));
    }

    #[tokio::test]
    async fn leveling_into_unmapped_level_still_notifies() {
        let h = harness(25..=25, FakeMembership::with_roles(USER, &[RoleId::new(101)])).await;
        h.store.set(USER, threshold(2) - 1).await.unwrap();

        let outcome = h.coordinator.process(message(Instant::now())).await.unwrap();

        assert!(matches!(
            outcome,
            LevelUpOutcome::LeveledUp {
                new_level: 2,
                assigned_role: None,
                ..
            }
        ));
        assert!(h.membership.calls.lock().unwrap().is_empty());
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn role_failure_does_not_stop_notification() {
        let membership = FakeMembership {
            fail_add: true,
            ..FakeMembership::default()
        };
        let h = harness(15..=15, membership).await;
        h.store.set(USER, threshold(1) - 1).await.unwrap();

        let outcome = h.coordinator.process(message(Instant::now())).await.unwrap();

        assert!(matches!(
            outcome,
            LevelUpOutcome::LeveledUp {
                new_level: 1,
                assigned_role: None,
                ..
            }
        ));
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].assigned_role, None);
    }

    #[tokio::test]
    async fn notification_failure_keeps_experience() {
        let notifier = FakeNotifier {
            fail: true,
            ..FakeNotifier::default()
        };
        let h = harness_with_notifier(15..=15, FakeMembership::default(), notifier).await;
        h.store.set(USER, threshold(1) - 1).await.unwrap();

        let outcome = h.coordinator.process(message(Instant::now())).await.unwrap();

        assert!(matches!(outcome, LevelUpOutcome::LeveledUp { .. }));
        assert_eq!(h.store.get(USER).await.unwrap(), threshold(1) + 14);
    }

    #[tokio::test]
    async fn storage_failure_aborts_the_event() {
        let h = harness(120..=120, FakeMembership::default()).await;
        h.db
            .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE levels")?))
            .await
            .unwrap();
        let start = Instant::now();

        let result = h.coordinator.process(message(start)).await;
        assert!(matches!(result, Err(LevelingError::StorageUnavailable(_))));

        // Logged, not propagated.
        h.coordinator
            .on_message_received(message(start + Duration::from_secs(60)))
            .await;

        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert!(h.membership.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn member_removal_purges_record() {
        let h = harness(15..=15, FakeMembership::default()).await;
        let start = Instant::now();
        h.coordinator.process(message(start)).await.unwrap();

        h.coordinator.on_member_removed(USER).await.unwrap();

        assert_eq!(h.store.get(USER).await.unwrap(), 0);
        assert!(!h.store.exists(USER).await.unwrap());
        // Removal also clears the cooldown, so a returning member starts fresh.
        assert_eq!(
            h.coordinator.process(message(start)).await.unwrap(),
            LevelUpOutcome::NoChange { experience: 15 }
        );
    }

    #[tokio::test]
    async fn summary_reports_level_and_progress() {
        let h = harness(15..=15, FakeMembership::default()).await;
        h.coordinator.set_experience(USER, 130).await.unwrap();

        let summary = h.coordinator.get_experience_summary(USER).await.unwrap();

        assert_eq!(summary.experience, 130);
        assert_eq!(summary.level(), 1);
        assert_eq!(summary.progress.into_level, 30);
        assert_eq!(summary.progress.needed, 155);
    }

    #[tokio::test]
    async fn administrative_operations() {
        let h = harness(15..=15, FakeMembership::default()).await;
        let other = UserId::new(43);

        assert_eq!(h.coordinator.grant_experience(USER, 50).await.unwrap(), 50);
        assert_eq!(h.coordinator.remove_experience(USER, 80).await.unwrap(), 0);

        let granted = h
            .coordinator
            .bulk_grant_experience(&[USER, other], 30)
            .await
            .unwrap();
        assert!(granted.iter().all(|(_, r)| matches!(r, Ok(30))));

        let removed = h
            .coordinator
            .bulk_remove_experience(&[USER, other], 10)
            .await
            .unwrap();
        assert!(removed.iter().all(|(_, r)| matches!(r, Ok(20))));

        h.coordinator
            .bulk_set_experience(&[USER, other], 999)
            .await
            .unwrap();
        assert_eq!(h.store.get(other).await.unwrap(), 999);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_messages_grant_once() {
        let h = Arc::new(harness(20..=20, FakeMembership::default()).await);
        let now = Instant::now();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move { h.coordinator.process(message(now)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.store.get(USER).await.unwrap(), 20);
    }
}
