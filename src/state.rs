use crate::{
    config::Config,
    gateway::DiscordGateway,
    leveling::{CooldownTracker, LevelRoles, LevelUpCoordinator, RoleSyncPolicy},
    log_internal,
    store::{CounterStore, Database, MessageLog, ECONOMY, LEVELS},
};
use anyhow::{anyhow, Result};
use serenity::all::UserId;
use std::sync::Arc;

/// Services built once at startup and shared by every event
pub struct State {
    pub levels: LevelUpCoordinator,
    pub economy: CounterStore,
    pub daily_cooldown: CooldownTracker<UserId>,
    pub messages: MessageLog,
}

impl State {
    pub async fn new(cfg: &Config, gateway: Arc<DiscordGateway>) -> Result<Self> {
        let db_cfg = &cfg.database;
        let db = Database::open(&db_cfg.path, db_cfg.pool_size, db_cfg.busy_timeout_ms)
            .await
            .map_err(|e| {
                anyhow!(
                    "Could not open database at `{}`: {}",
                    db_cfg.path.to_string_lossy(),
                    e
                )
            })?;

        log_internal!("Opened database at {}", db_cfg.path.to_string_lossy());

        let levels_cfg = &cfg.levels;
        let levels = LevelUpCoordinator::new(
            CounterStore::new(db.clone(), LEVELS),
            CooldownTracker::new(levels_cfg.cooldown_window(), levels_cfg.cooldown_limit),
            RoleSyncPolicy::new(LevelRoles::new(&levels_cfg.roles)),
            levels_cfg.grant_min..=levels_cfg.grant_max,
            gateway.clone(),
            gateway,
        );

        Ok(Self {
            levels,
            economy: CounterStore::new(db.clone(), ECONOMY),
            daily_cooldown: CooldownTracker::new(cfg.economy.daily_window(), 1),
            messages: MessageLog::new(db),
        })
    }
}
