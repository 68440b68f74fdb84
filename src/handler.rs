use crate::{config::Config, context::Context, event::Event, state::State};
use serenity::all::{GuildId, Member, Message, Ready, User};

/// Discord event handler
pub struct Handler {
    cfg: Config,
    state: State,
}

impl<'a> Handler {
    pub fn new(cfg: Config, state: State) -> Self {
        Self { cfg, state }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            state: &self.state,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.ctx(&discord_ctx)).await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg).handle(self.ctx(&discord_ctx)).await;
    }

    async fn guild_member_removal(
        &self,
        discord_ctx: serenity::all::Context,
        guild_id: GuildId,
        user: User,
        _member_data_if_available: Option<Member>,
    ) {
        Event::MemberRemoved { guild_id, user }
            .handle(self.ctx(&discord_ctx))
            .await;
    }
}
