use crate::{
    event::*, helper::MessageHelper, leveling::MessageReceived, log_internal, logging::*,
    plugin::*,
};
use anyhow::Result;
use std::collections::HashSet;
use tokio::time::Instant;

/// Grants experience for chatting and forgets members who leave.
pub struct Experience;

#[serenity::async_trait]
impl Plugin for Experience {
    fn name(&self) -> &'static str {
        "experience"
    }

    fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let guild_id = ctx.cfg.general.guild_id;

        match event {
            Event::Ready(_) => check_level_roles(ctx).await?,
            Event::Message(msg) => {
                if msg.guild_id != Some(guild_id) {
                    return Ok(EventHandled::No);
                }
                if let Some(only_channel) = ctx.cfg.levels.only_channel {
                    if msg.channel_id != only_channel {
                        return Ok(EventHandled::No);
                    }
                }

                let event = MessageReceived {
                    user_id: msg.author.id,
                    channel_id: msg.channel_id,
                    message_id: msg.id,
                    timestamp: Instant::now(),
                    is_automated: msg.is_automated(),
                };
                ctx.state.levels.on_message_received(event).await;
            }
            Event::MemberRemoved {
                guild_id: left,
                user,
            } if *left == guild_id => {
                ctx.state.levels.on_member_removed(user.id).await?;
                log_internal!("Removed experience record of {}", user.color());
            }
            Event::MemberRemoved { .. } => {}
        }

        // Allow other plugins to consume this event
        Ok(EventHandled::No)
    }
}

/// Warn about level roles that don't exist in the guild.
async fn check_level_roles(ctx: &Context<'_>) -> Result<()> {
    let guild_id = ctx.cfg.general.guild_id;
    let existing: HashSet<_> = ctx
        .http
        .get_guild_roles(guild_id)
        .await?
        .into_iter()
        .map(|role| role.id)
        .collect();

    for (level, role) in ctx.state.levels.roles().roles().iter() {
        if !existing.contains(&role) {
            tracing::warn!(level, role = %role, "level role does not exist in the guild");
        } else {
            log_internal!("Level {} grants role {}", level, role.color());
        }
    }

    Ok(())
}
