//! The Serenity crate we're using for the Discord API is designed around callbacks to handle
//! events.  However, this does not mesh well with our plugin framework here.  To resolve this,
//! `Handler` translates the callbacks into a distinct Event enum.

use crate::context::Context;
use serenity::all::{GuildId, Message, Ready, User};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
    MemberRemoved { guild_id: GuildId, user: User },
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => tracing::error!(plugin = plugin.name(), "Error in plugin: {err:#}"),
            }
        }
    }

    // Check if a message should be interpreted as a special bot command.
    //
    // These are prefixed with the configured command prefix, e.g. `in!exp add @user 50`.
    // Returns the message and the arguments following the command.
    pub fn is_bot_cmd<'a>(&'a self, ctx: &Context, cmd: &str) -> Option<(&'a Message, Vec<&'a str>)> {
        let Event::Message(msg) = self else {
            return None;
        };

        let mut words = msg.content.split_ascii_whitespace();
        let command = words.next()?.strip_prefix(ctx.cfg.general.command_prefix.as_str())?;
        if command != cmd {
            return None;
        }

        Some((msg, words.collect()))
    }
}

pub enum EventHandled {
    Yes,
    No,
}
