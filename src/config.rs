use anyhow::{anyhow, bail, Result};
use serenity::all::{ChannelId, GuildId, RoleId, UserId};
use std::{collections::HashSet, path::PathBuf, time::Duration};
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/incandescent/config.toml";
const CONFIG_PATH_ENV: &str = "INCANDESCENT_CONFIG";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    pub database: Database,
    pub levels: Levels,
    #[serde(default)]
    pub economy: Economy,
    /// Weekly chatty ranking.  Disabled when absent.
    pub fun: Option<Fun>,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub bot_owners: Vec<UserId>,
    pub command_prefix: String,
    pub guild_id: GuildId,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Database {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Levels {
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_cooldown_limit")]
    pub cooldown_limit: u32,
    #[serde(default = "default_grant_min")]
    pub grant_min: u64,
    #[serde(default = "default_grant_max")]
    pub grant_max: u64,
    /// Only messages in this channel earn experience.  Used while developing the bot.
    #[serde(default)]
    pub only_channel: Option<ChannelId>,
    #[serde(default)]
    pub roles: Vec<LevelRole>,
}

#[derive(Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct LevelRole {
    pub level: u32,
    pub role_id: RoleId,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Economy {
    pub daily_cooldown_seconds: u64,
    pub daily_min: u64,
    pub daily_max: u64,
    pub booster_min: u64,
    pub booster_max: u64,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Fun {
    pub chatty_channel: ChannelId,
    pub chatty_role: RoleId,
}

impl Default for Economy {
    fn default() -> Self {
        Self {
            daily_cooldown_seconds: 60 * 60 * 24,
            daily_min: 100,
            daily_max: 150,
            booster_min: 150,
            booster_max: 375,
        }
    }
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u32 {
    5_000
}

fn default_cooldown_seconds() -> u64 {
    60
}

fn default_cooldown_limit() -> u32 {
    1
}

fn default_grant_min() -> u64 {
    15
}

fn default_grant_max() -> u64 {
    25
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Self::parse(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let levels = &self.levels;
        if levels.grant_min > levels.grant_max {
            bail!(
                "levels.grant_min ({}) is greater than levels.grant_max ({})",
                levels.grant_min,
                levels.grant_max
            );
        }
        if levels.cooldown_limit == 0 {
            bail!("levels.cooldown_limit must be at least 1");
        }
        if levels.cooldown_seconds == 0 {
            bail!("levels.cooldown_seconds must be greater than zero");
        }

        let mut seen = HashSet::new();
        for role in &levels.roles {
            if !seen.insert(role.level) {
                bail!("level {} is mapped to more than one role", role.level);
            }
        }

        let economy = &self.economy;
        if economy.daily_min > economy.daily_max || economy.booster_min > economy.booster_max {
            bail!("economy intervals must have min <= max");
        }

        Ok(())
    }
}

impl Levels {
    pub fn cooldown_window(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

impl Economy {
    pub fn daily_window(&self) -> Duration {
        Duration::from_secs(self.daily_cooldown_seconds)
    }
}
