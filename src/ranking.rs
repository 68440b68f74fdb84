//! Weekly "chatty" ranking.
//!
//! Every Monday at 15:00 UTC the ten members with the most messages over the past week are
//! posted to a channel, and the chatty role moves to whoever came first.

use crate::{
    helper::group_thousands,
    leveling::RoleMembership,
    log_internal,
    store::MessageLog,
};
use anyhow::Result;
use chrono::{DateTime, Datelike, Days, TimeDelta, Utc};
use serenity::all::{ChannelId, Mentionable, RoleId, UserId};
use std::sync::Arc;

const RANKING_SIZE: u32 = 10;
const RUN_HOUR: u32 = 15;
const LOOKBACK_DAYS: i64 = 7;

/// Posts a ranking to a channel.
#[serenity::async_trait]
pub trait RankingAnnouncer: Send + Sync {
    async fn announce_ranking(&self, channel: ChannelId, title: &str, text: &str) -> Result<()>;
}

#[derive(Debug, PartialEq, Eq)]
pub struct RankingOutcome {
    pub winner: UserId,
    pub messages: u64,
    /// Previous holders the role was taken from
    pub removed: Vec<UserId>,
}

pub struct ChattyRanking {
    messages: MessageLog,
    channel: ChannelId,
    role: RoleId,
}

impl ChattyRanking {
    pub fn new(messages: MessageLog, channel: ChannelId, role: RoleId) -> Self {
        Self {
            messages,
            channel,
            role,
        }
    }

    /// Rank the week ending at `now`, hand the role to the winner and post the ranking.
    /// Returns `None` when nobody wrote anything.
    ///
    /// Failing to take the role from a previous holder is logged and doesn't stop the run.
    pub async fn run(
        &self,
        membership: &dyn RoleMembership,
        announcer: &dyn RankingAnnouncer,
        now: DateTime<Utc>,
    ) -> Result<Option<RankingOutcome>> {
        let since = (now - TimeDelta::days(LOOKBACK_DAYS)).timestamp();
        let top = self.messages.top_authors_since(since, RANKING_SIZE).await?;
        let Some(&(winner, messages)) = top.first() else {
            log_internal!("Nobody wrote anything this week, skipping the chatty ranking");
            return Ok(None);
        };

        let holders = membership.role_members(self.role).await?;
        let mut removed = Vec::new();
        for holder in holders.iter().copied().filter(|holder| *holder != winner) {
            match membership.remove_role(holder, self.role).await {
                Ok(()) => removed.push(holder),
                Err(err) => {
                    tracing::warn!(user_id = %holder, "could not take the chatty role: {err}");
                }
            }
        }
        if !holders.contains(&winner) {
            membership.add_role(winner, self.role).await?;
        }

        announcer
            .announce_ranking(
                self.channel,
                "\u{1f4e2} Weekly message ranking",
                &ranking_text(self.role, &top),
            )
            .await?;

        Ok(Some(RankingOutcome {
            winner,
            messages,
            removed,
        }))
    }

    /// Run forever, once a week.
    pub async fn run_weekly(
        self,
        membership: Arc<dyn RoleMembership>,
        announcer: Arc<dyn RankingAnnouncer>,
    ) {
        loop {
            let now = Utc::now();
            let Some(next) = next_run(now) else {
                tracing::error!("could not schedule the chatty ranking after {now}");
                return;
            };
            log_internal!("Next chatty ranking at {}", next);
            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

            match self.run(membership.as_ref(), announcer.as_ref(), Utc::now()).await {
                Ok(Some(outcome)) => {
                    tracing::info!(user_id = %outcome.winner, outcome.messages, "chatty ranking posted");
                }
                Ok(None) => {}
                Err(err) => tracing::error!("chatty ranking failed: {err:#}"),
            }
        }
    }
}

/// The first Monday 15:00 UTC strictly after `now`.
pub fn next_run(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let days_to_monday = (7 - now.weekday().num_days_from_monday()) % 7;
    let candidate = now
        .date_naive()
        .checked_add_days(Days::new(u64::from(days_to_monday)))?
        .and_hms_opt(RUN_HOUR, 0, 0)?
        .and_utc();

    if candidate > now {
        Some(candidate)
    } else {
        candidate.checked_add_days(Days::new(7))
    }
}

fn ranking_text(role: RoleId, top: &[(UserId, u64)]) -> String {
    let mut text = String::new();
    if let Some((winner, total)) = top.first() {
        text.push_str(&format!(
            "{} was the chattiest member this week with **{} messages**, congratulations! \
             You get the {} role for a week.\n\n",
            winner.mention(),
            group_thousands(*total),
            role.mention()
        ));
    }

    let lines: Vec<String> = top
        .iter()
        .enumerate()
        .map(|(i, (user, total))| {
            format!(
                "**{}.** {} ({} messages)",
                i + 1,
                user.mention(),
                group_thousands(*total)
            )
        })
        .collect();
    text.push_str(&lines.join("\n"));
    text
}
