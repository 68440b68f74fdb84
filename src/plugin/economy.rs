use crate::{
    event::*,
    helper::{group_thousands, human_duration},
    plugin::*,
};
use anyhow::Result;
use rand::Rng;
use serenity::all::{Mentionable, Message};
use tokio::time::Instant;

const COIN: &str = "incandecoins";

/// Daily coins and balances
pub struct Economy;

#[serenity::async_trait]
impl Plugin for Economy {
    fn name(&self) -> &'static str {
        "economy"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.general.command_prefix;
        Some(format!(
            "{p}daily - collect your daily {COIN}\n\
             {p}balance [@member] - show how many {COIN} someone has",
            p = prefix
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        if let Some((msg, _)) = event.is_bot_cmd(ctx, "daily") {
            handle_daily(ctx, msg).await?;
            return Ok(EventHandled::Yes);
        }

        if let Some((msg, _)) = event.is_bot_cmd(ctx, "balance") {
            handle_balance(ctx, msg).await?;
            return Ok(EventHandled::Yes);
        }

        Ok(EventHandled::No)
    }
}

async fn handle_daily(ctx: &Context<'_>, msg: &Message) -> Result<()> {
    let author = msg.author.id;
    let cooldown = &ctx.state.daily_cooldown;
    let now = Instant::now();

    if !cooldown.try_consume(author, now) {
        let retry_after = cooldown.retry_after(&author, now).unwrap_or_default();
        msg.reply(
            ctx.cache_http,
            format!(
                "You can use this command again in **{}**.",
                human_duration(retry_after)
            ),
        )
        .await?;
        return Ok(());
    }

    let economy = &ctx.cfg.economy;
    let is_booster = msg
        .member
        .as_ref()
        .is_some_and(|member| member.premium_since.is_some());
    let interval = if is_booster {
        economy.booster_min..=economy.booster_max
    } else {
        economy.daily_min..=economy.daily_max
    };
    let amount = rand::rng().random_range(interval);

    if let Err(err) = ctx
        .state
        .economy
        .add(author, i64::try_from(amount).unwrap_or(i64::MAX))
        .await
    {
        // Let them try again rather than losing the day's coins
        cooldown.forget(&author);
        return Err(err.into());
    }

    msg.reply(
        ctx.cache_http,
        format!(
            "{} received **{} {COIN}**!",
            author.mention(),
            group_thousands(amount)
        ),
    )
    .await?;
    Ok(())
}

async fn handle_balance(ctx: &Context<'_>, msg: &Message) -> Result<()> {
    let member = msg.mentions.first().unwrap_or(&msg.author);

    let reply = match ctx.state.economy.get(member.id).await {
        Ok(balance) => format!(
            "{} has **{} {COIN}**.",
            member.mention(),
            group_thousands(balance)
        ),
        Err(err) => {
            tracing::error!(user_id = %member.id, "could not fetch balance: {err}");
            String::from("Unable to fetch the balance right now, try again later.")
        }
    };

    msg.reply(ctx.cache_http, reply).await?;
    Ok(())
}
