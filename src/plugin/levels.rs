use crate::{
    event::*,
    gateway::EMBED_COLOR,
    helper::{group_thousands, human_join, progress_bar, MessageHelper, UserHelper},
    leveling::{validate_admin_input, ExperienceSummary, LevelingError},
    plugin::*,
    store::BulkOutcome,
};
use anyhow::Result;
use serenity::all::{
    CreateEmbed, CreateMessage, Mentionable, Message, User, UserId,
};

const PROGRESS_BAR_WIDTH: usize = 20;

/// Experience commands
pub struct Levels;

#[derive(Clone, Copy)]
enum AdminCmd {
    Add,
    Remove,
    Set,
}

#[serenity::async_trait]
impl Plugin for Levels {
    fn name(&self) -> &'static str {
        "exp"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.general.command_prefix;
        Some(format!(
            "{p}exp [@member] - show level and experience\n\
             {p}exp add <@members...> <amount> - give experience (bot owner only)\n\
             {p}exp remove <@members...> <amount> - take experience (bot owner only)\n\
             {p}exp set <@members...> <amount> - set experience (bot owner only)",
            p = prefix
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let admin_cmd = match args.first().copied() {
            Some("add") => Some(AdminCmd::Add),
            Some("remove") => Some(AdminCmd::Remove),
            Some("set") => Some(AdminCmd::Set),
            _ => None,
        };

        match admin_cmd {
            Some(cmd) => handle_admin(ctx, msg, cmd, &args[1..]).await?,
            None => handle_info(ctx, msg).await?,
        }

        Ok(EventHandled::Yes)
    }
}

async fn handle_info(ctx: &Context<'_>, msg: &Message) -> Result<()> {
    let member = msg.mentions.first().unwrap_or(&msg.author);

    let summary = match ctx.state.levels.get_experience_summary(member.id).await {
        Ok(summary) => summary,
        Err(err) => {
            tracing::error!(user_id = %member.id, "could not fetch experience: {err}");
            msg.reply(ctx.cache_http, "Unable to fetch experience right now, try again later.")
                .await?;
            return Ok(());
        }
    };

    let mut description = summary_text(&summary);
    match ctx.state.messages.count_by_author(member.id).await {
        Ok(count) => description.push_str(&format!("\n**Messages:** {}", group_thousands(count))),
        Err(err) => tracing::warn!(user_id = %member.id, "could not count messages: {err}"),
    }

    let name = member.nick_in_guild(ctx, msg.guild_id).await;
    let embed = CreateEmbed::new()
        .title(format!("Experience of {}", name))
        .description(description)
        .thumbnail(member.face())
        .color(EMBED_COLOR);

    msg.channel_id
        .send_message(ctx.cache_http, CreateMessage::new().embed(embed).reference_message(msg))
        .await?;
    Ok(())
}

fn summary_text(summary: &ExperienceSummary) -> String {
    format!(
        "**Level:** {}\n**Experience:** {}\n{}",
        group_thousands(u64::from(summary.level())),
        group_thousands(summary.experience),
        progress_bar(summary.progress.ratio(), PROGRESS_BAR_WIDTH),
    )
}

async fn handle_admin(ctx: &Context<'_>, msg: &Message, cmd: AdminCmd, args: &[&str]) -> Result<()> {
    if !msg.is_from_owner(ctx) {
        msg.reply(ctx.cache_http, "Only bot owners can change experience.")
            .await?;
        return Ok(());
    }

    let targets: Vec<&User> = msg.mentions.iter().filter(|user| !user.bot).collect();
    let user_ids: Vec<UserId> = targets.iter().map(|user| user.id).collect();

    let Some(amount) = args.last().and_then(|arg| arg.parse::<i64>().ok()) else {
        msg.reply(
            ctx.cache_http,
            format!(
                "Usage: {}exp {} <@members...> <amount>",
                ctx.cfg.general.command_prefix,
                cmd.verb()
            ),
        )
        .await?;
        return Ok(());
    };

    // Bad input never reaches the leveling system
    let amount = match validate_admin_input(&user_ids, amount) {
        Ok(amount) => amount,
        Err(err) => {
            msg.reply(ctx.cache_http, err.to_string()).await?;
            return Ok(());
        }
    };

    let levels = &ctx.state.levels;
    let outcomes = match (cmd, user_ids.as_slice()) {
        (AdminCmd::Add, [user]) => single(*user, levels.grant_experience(*user, amount).await),
        (AdminCmd::Remove, [user]) => single(*user, levels.remove_experience(*user, amount).await),
        (AdminCmd::Set, [user]) => single(*user, levels.set_experience(*user, amount).await),
        (AdminCmd::Add, users) => levels.bulk_grant_experience(users, amount).await,
        (AdminCmd::Remove, users) => levels.bulk_remove_experience(users, amount).await,
        (AdminCmd::Set, users) => levels.bulk_set_experience(users, amount).await,
    };
    let outcomes = match outcomes {
        Ok(outcomes) => outcomes,
        Err(err @ LevelingError::StorageUnavailable(_)) => {
            tracing::error!("could not update experience: {err}");
            msg.reply(ctx.cache_http, "Unable to update experience right now.")
                .await?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    msg.reply(ctx.cache_http, admin_reply(cmd, amount, &outcomes))
        .await?;
    Ok(())
}

fn single(user: UserId, result: Result<u64, LevelingError>) -> Result<Vec<BulkOutcome>, LevelingError> {
    match result {
        Ok(value) => Ok(vec![(user, Ok(value))]),
        Err(LevelingError::StorageUnavailable(err)) => Ok(vec![(user, Err(err))]),
        Err(err) => Err(err),
    }
}

impl AdminCmd {
    fn verb(self) -> &'static str {
        match self {
            AdminCmd::Add => "add",
            AdminCmd::Remove => "remove",
            AdminCmd::Set => "set",
        }
    }
}

/// Summarize a bulk update, listing users whose update failed separately.  Updates are applied
/// per user, so some may have gone through while others didn't.
fn admin_reply(cmd: AdminCmd, amount: u64, outcomes: &[BulkOutcome]) -> String {
    let (done, failed): (Vec<_>, Vec<_>) = outcomes.iter().partition(|(_, r)| r.is_ok());
    let mention = |(user, _): &&BulkOutcome| user.mention().to_string();
    let done: Vec<String> = done.iter().map(mention).collect();
    let failed: Vec<String> = failed.iter().map(mention).collect();

    let amount = group_thousands(amount);
    let mut reply = if done.is_empty() {
        String::from("No experience was changed.")
    } else {
        let done = human_join(&done);
        match cmd {
            AdminCmd::Add => format!("Added `{amount}` experience to {done}."),
            AdminCmd::Remove => format!("Removed `{amount}` experience from {done}."),
            AdminCmd::Set => format!("Set experience of {done} to `{amount}`."),
        }
    };

    if !failed.is_empty() {
        reply.push_str(&format!("\nCould not update {}.", human_join(&failed)));
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{leveling::curve::Progress, store::StoreError};

    #[test]
    fn summary_shows_level_experience_and_bar() {
        let summary = ExperienceSummary {
            experience: 1_230,
            progress: Progress::of(1_230),
        };
        let text = summary_text(&summary);
        assert!(text.starts_with("**Level:** 5\n**Experience:** 1,230\n`["));
    }

    #[test]
    fn admin_reply_lists_updated_users() {
        let outcomes = vec![(UserId::new(1), Ok(50)), (UserId::new(2), Ok(70))];
        assert_eq!(
            admin_reply(AdminCmd::Add, 1500, &outcomes),
            "Added `1,500` experience to <@1> and <@2>."
        );
    }

    #[test]
    fn admin_reply_reports_partial_application() {
        let outcomes = vec![
            (UserId::new(1), Ok(0)),
            (
                UserId::new(2),
                Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows)),
            ),
        ];
        assert_eq!(
            admin_reply(AdminCmd::Remove, 10, &outcomes),
            "Removed `10` experience from <@1>.\nCould not update <@2>."
        );
    }
}
