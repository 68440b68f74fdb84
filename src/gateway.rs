//! Discord-backed implementations of the collaborators the leveling system needs.

use crate::{
    helper::group_thousands,
    leveling::{LevelNotifier, LevelUpNotice, RoleMembership},
    ranking::RankingAnnouncer,
};
use anyhow::Result;
use serenity::all::{
    ChannelId, CreateAllowedMentions, CreateEmbed, CreateMessage, GuildId, Http, Mentionable,
    RoleId, UserId,
};
use std::sync::Arc;

pub const EMBED_COLOR: u32 = 0x2B2D31;

const AUDIT_LOG_REASON: &str = "Level role update";

/// Largest page Discord hands out when listing guild members
const MEMBER_PAGE_SIZE: u64 = 1000;

/// Talks to one guild over Discord's HTTP API.
pub struct DiscordGateway {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Self {
        Self { http, guild_id }
    }
}

#[serenity::async_trait]
impl RoleMembership for DiscordGateway {
    async fn member_roles(&self, user: UserId) -> Result<Vec<RoleId>> {
        let member = self.http.get_member(self.guild_id, user).await?;
        Ok(member.roles)
    }

    async fn add_role(&self, user: UserId, role: RoleId) -> Result<()> {
        self.http
            .add_member_role(self.guild_id, user, role, Some(AUDIT_LOG_REASON))
            .await?;
        Ok(())
    }

    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<()> {
        self.http
            .remove_member_role(self.guild_id, user, role, Some(AUDIT_LOG_REASON))
            .await?;
        Ok(())
    }

    async fn role_members(&self, role: RoleId) -> Result<Vec<UserId>> {
        let mut holders = Vec::new();
        let mut after = None;
        loop {
            let page = self
                .http
                .get_guild_members(self.guild_id, Some(MEMBER_PAGE_SIZE), after)
                .await?;
            holders.extend(
                page.iter()
                    .filter(|member| member.roles.contains(&role))
                    .map(|member| member.user.id),
            );

            match page.last() {
                Some(last) if page.len() as u64 == MEMBER_PAGE_SIZE => after = Some(last.user.id.get()),
                _ => break,
            }
        }
        Ok(holders)
    }
}

#[serenity::async_trait]
impl LevelNotifier for DiscordGateway {
    async fn notify_level_up(&self, notice: &LevelUpNotice) -> Result<()> {
        let embed = CreateEmbed::new()
            .description(level_up_text(notice))
            .color(EMBED_COLOR);
        let reply = CreateMessage::new()
            .embed(embed)
            .reference_message((notice.channel_id, notice.message_id))
            .allowed_mentions(CreateAllowedMentions::new().replied_user(false));

        notice.channel_id.send_message(&self.http, reply).await?;
        Ok(())
    }
}

#[serenity::async_trait]
impl RankingAnnouncer for DiscordGateway {
    async fn announce_ranking(&self, channel: ChannelId, title: &str, text: &str) -> Result<()> {
        let embed = CreateEmbed::new()
            .title(title)
            .description(text)
            .color(EMBED_COLOR);

        channel
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }
}

fn level_up_text(notice: &LevelUpNotice) -> String {
    let mut text = format!(
        "Congratulations, {}! You reached **level {}**!",
        notice.user_id.mention(),
        group_thousands(u64::from(notice.new_level))
    );
    if let Some(role) = notice.assigned_role {
        text.push_str(&format!(
            "\nYou received the {} role for reaching this level.",
            role.mention()
        ));
    }
    text
}
