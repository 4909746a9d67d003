//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::combat::WeaponStats;
use crate::game::player::PlayerStats;
use crate::game::EntityId;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated); any origin if unset
    pub client_origin: Option<String>,
    /// Simulation settings
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when both are set
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let game = GameConfig::from_env()?;
        game.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
            game,
        })
    }
}

/// Simulation and transport tuning
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Simulation ticks per second
    pub simulation_tps: u32,
    /// Network (state flush) ticks per second
    pub network_tps: u32,
    /// Positions beyond ±extent wrap to the opposite edge
    pub world_half_extent: f32,
    /// Projectile self-despawn delay
    pub projectile_lifetime: Duration,
    /// Delay before a player may fire again
    pub fire_cooldown: Duration,
    /// Interval between +1 health steps
    pub regen_interval: Duration,
    /// Delay between `get_id` and the full-state broadcast
    pub snapshot_delay: Duration,
    /// Upper bound on a single simulation step
    pub max_tick_delta: Duration,
    /// First id handed out, and where allocation restarts after the ceiling
    pub id_floor: EntityId,
    /// Allocation wraps once the counter exceeds this
    pub id_ceiling: EntityId,
    /// Per-client outbound frame buffer
    pub outbound_buffer: usize,
    /// Inbound messages per second per connection
    pub input_rate_limit: u32,
    /// Seed for spawn positions; random if unset
    pub seed: Option<u64>,
    pub player: PlayerStats,
    pub weapon: WeaponStats,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            simulation_tps: 30,
            network_tps: 20,
            world_half_extent: 40_000.0,
            projectile_lifetime: Duration::from_millis(2000),
            fire_cooldown: Duration::from_millis(50),
            regen_interval: Duration::from_millis(200),
            snapshot_delay: Duration::from_millis(100),
            max_tick_delta: Duration::from_millis(250),
            id_floor: 1,
            id_ceiling: 5000,
            outbound_buffer: 256,
            input_rate_limit: 120,
            seed: None,
            player: PlayerStats::default(),
            weapon: WeaponStats::default(),
        }
    }
}

impl GameConfig {
    /// Defaults overridden by any game variables present in the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            simulation_tps: env_parse("SIMULATION_TPS", d.simulation_tps)?,
            network_tps: env_parse("NETWORK_TPS", d.network_tps)?,
            world_half_extent: env_parse("WORLD_HALF_EXTENT", d.world_half_extent)?,
            projectile_lifetime: env_millis("PROJECTILE_LIFETIME_MS", d.projectile_lifetime)?,
            fire_cooldown: env_millis("FIRE_COOLDOWN_MS", d.fire_cooldown)?,
            regen_interval: env_millis("REGEN_INTERVAL_MS", d.regen_interval)?,
            snapshot_delay: env_millis("SNAPSHOT_DELAY_MS", d.snapshot_delay)?,
            max_tick_delta: env_millis("MAX_TICK_DELTA_MS", d.max_tick_delta)?,
            id_floor: d.id_floor,
            id_ceiling: env_parse("ENTITY_ID_CEILING", d.id_ceiling)?,
            outbound_buffer: env_parse("OUTBOUND_BUFFER", d.outbound_buffer)?,
            input_rate_limit: env_parse("INPUT_RATE_LIMIT", d.input_rate_limit)?,
            seed: env_optional("WORLD_SEED")?,
            player: d.player,
            weapon: d.weapon,
        })
    }

    /// Reject settings the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation_tps == 0 {
            return Err(ConfigError::OutOfRange("SIMULATION_TPS", "must be at least 1"));
        }
        if self.network_tps == 0 {
            return Err(ConfigError::OutOfRange("NETWORK_TPS", "must be at least 1"));
        }
        if !(self.world_half_extent.is_finite() && self.world_half_extent > 0.0) {
            return Err(ConfigError::OutOfRange("WORLD_HALF_EXTENT", "must be positive"));
        }
        if self.regen_interval.is_zero() {
            return Err(ConfigError::OutOfRange("REGEN_INTERVAL_MS", "must be positive"));
        }
        if self.id_ceiling <= self.id_floor {
            return Err(ConfigError::OutOfRange(
                "ENTITY_ID_CEILING",
                "must be above the id floor",
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::OutOfRange("OUTBOUND_BUFFER", "must be at least 1"));
        }
        if self.input_rate_limit == 0 {
            return Err(ConfigError::OutOfRange("INPUT_RATE_LIMIT", "must be at least 1"));
        }
        Ok(())
    }

    pub fn simulation_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.simulation_tps))
    }

    pub fn network_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.network_tps))
    }
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(env_optional(key)?.unwrap_or(default))
}

fn env_optional<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(None),
    }
}

fn env_millis(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(env_optional::<u64>(key)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("{0} {1}")]
    OutOfRange(&'static str, &'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
