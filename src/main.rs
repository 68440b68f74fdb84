mod config;
mod context;
mod event;
mod gateway;
mod handler;
mod helper;
mod leveling;
mod logging;
mod plugin;
mod ranking;
mod state;
mod store;

use serenity::{
    all::{GatewayIntents, Http},
    Client,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cfg = crate::config::Config::load().await?;
    let token = cfg.general.discord_token.clone();
    let http = Arc::new(Http::new(&token));
    let discord = Arc::new(gateway::DiscordGateway::new(http, cfg.general.guild_id));
    let state = crate::state::State::new(&cfg, discord.clone()).await?;

    if let Some(fun) = &cfg.fun {
        let ranking =
            ranking::ChattyRanking::new(state.messages.clone(), fun.chatty_channel, fun.chatty_role);
        tokio::spawn(ranking.run_weekly(discord.clone(), discord));
    }

    let handler = handler::Handler::new(cfg, state);

    // Things we want discord to tell us about.
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(&token, intents)
        .event_handler(handler)
        .await?
        .start()
        .await
        .map_err(Into::into)
}
