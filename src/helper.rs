//! Miscellaneous convenience methods

use crate::context::Context;
use serenity::all::GuildId;
use std::time::Duration;

#[serenity::async_trait]
pub trait UserHelper {
    async fn nick_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String;
}

#[serenity::async_trait]
impl UserHelper for serenity::all::User {
    async fn nick_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String {
        let nick_in_guild = match guild_id {
            Some(guild_id) => self.nick_in(ctx.cache_http, guild_id).await,
            None => None,
        };

        // May not be in a guild, e.g. DM.  Fall back to global username.
        match nick_in_guild {
            Some(nick_in_guild) => nick_in_guild,
            None => self.name.clone(),
        }
    }
}

pub trait MessageHelper {
    fn is_from_owner(&self, ctx: &Context) -> bool;
    fn is_automated(&self) -> bool;
}

impl MessageHelper for serenity::all::Message {
    fn is_from_owner(&self, ctx: &Context) -> bool {
        ctx.cfg.general.bot_owners.contains(&self.author.id)
    }

    /// Sent by a bot account or a webhook
    fn is_automated(&self) -> bool {
        self.author.bot || self.webhook_id.is_some()
    }
}

/// Join items as `a, b and c`.
pub fn human_join<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_owned(),
        [init @ .., last] => {
            let init: Vec<&str> = init.iter().map(AsRef::as_ref).collect();
            format!("{} and {}", init.join(", "), last.as_ref())
        }
    }
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Text progress bar, e.g. `[█████···············]`
pub fn progress_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("`[{}{}]`", "█".repeat(filled), "·".repeat(width - filled))
}

/// `3903s` -> `1h 5m 3s`
pub fn human_duration(duration: Duration) -> String {
    let secs = duration.as_secs().max(1);
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);

    let parts: Vec<String> = [(h, "h"), (m, "m"), (s, "s")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    parts.join(" ")
}
