//! Server configuration module
//! Handles dynamic configuration parameters for the world server

use crate::constants::{
    DEFAULT_AOI_CNTS_X, DEFAULT_AOI_CNTS_Z, DEFAULT_AOI_MAX_X, DEFAULT_AOI_MAX_Z,
    DEFAULT_AOI_MIN_X, DEFAULT_AOI_MIN_Z, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_HOST,
    DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_PACKET_SIZE, DEFAULT_MAX_WORKER_TASKS,
    DEFAULT_OUTBOUND_QUEUE, DEFAULT_PORT, DEFAULT_SAVE_PATH, DEFAULT_SEND_TIMEOUT_MS,
    DEFAULT_WORKER_POOL_SIZE, MIN_OUTBOUND_QUEUE,
};
use crate::core::outbound::SendPolicy;
use crate::error::{RealmError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// World extent and grid resolution for the AOI index
#[derive(Debug, Clone, PartialEq)]
pub struct AoiConfig {
    pub min_x: f32,
    pub max_x: f32,
    /// Number of columns along x
    pub cnts_x: usize,
    pub min_z: f32,
    pub max_z: f32,
    /// Number of rows along z
    pub cnts_z: usize,
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            min_x: DEFAULT_AOI_MIN_X,
            max_x: DEFAULT_AOI_MAX_X,
            cnts_x: DEFAULT_AOI_CNTS_X,
            min_z: DEFAULT_AOI_MIN_Z,
            max_z: DEFAULT_AOI_MAX_Z,
            cnts_z: DEFAULT_AOI_CNTS_Z,
        }
    }
}

impl AoiConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_x < self.max_x) || !(self.min_z < self.max_z) {
            return Err(RealmError::Config(format!(
                "AOI bounds are empty or inverted: x [{}, {}], z [{}, {}]",
                self.min_x, self.max_x, self.min_z, self.max_z
            )));
        }
        if self.cnts_x == 0 || self.cnts_z == 0 {
            return Err(RealmError::Config(
                "AOI cell counts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Live connections allowed at once
    pub max_connections: usize,
    /// Number of dispatch workers
    pub worker_pool_size: usize,
    /// Capacity of each worker's task queue
    pub max_worker_tasks: usize,
    /// Largest accepted payload, in bytes
    pub max_packet_size: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_queue: usize,
    pub send_policy: SendPolicy,
    /// How long the write loop may keep draining after close
    pub drain_timeout: Duration,
    /// Root directory for per-actor module saves
    pub save_path: PathBuf,
    pub aoi: AoiConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            max_worker_tasks: DEFAULT_MAX_WORKER_TASKS,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            send_policy: SendPolicy::Backpressure(Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS)),
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            save_path: PathBuf::from(DEFAULT_SAVE_PATH),
            aoi: AoiConfig::default(),
        }
    }
}

/// Read `key` from the environment. Absent means `default`; present but
/// unparsable is a configuration error.
fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            RealmError::Config(format!("invalid value for {}: '{}'", key, raw))
        }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => {
            Err(RealmError::Config(format!("{} is not valid unicode", key)))
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let send_timeout_ms = env_parse("RUSTY_REALM_SEND_TIMEOUT_MS", DEFAULT_SEND_TIMEOUT_MS)?;
        let send_policy = match env::var("RUSTY_REALM_SEND_POLICY") {
            Ok(raw) => SendPolicy::parse(&raw, Duration::from_millis(send_timeout_ms))?,
            Err(_) => SendPolicy::Backpressure(Duration::from_millis(send_timeout_ms)),
        };

        let aoi = AoiConfig {
            min_x: env_parse("RUSTY_REALM_AOI_MIN_X", defaults.aoi.min_x)?,
            max_x: env_parse("RUSTY_REALM_AOI_MAX_X", defaults.aoi.max_x)?,
            cnts_x: env_parse("RUSTY_REALM_AOI_CNTS_X", defaults.aoi.cnts_x)?,
            min_z: env_parse("RUSTY_REALM_AOI_MIN_Z", defaults.aoi.min_z)?,
            max_z: env_parse("RUSTY_REALM_AOI_MAX_Z", defaults.aoi.max_z)?,
            cnts_z: env_parse("RUSTY_REALM_AOI_CNTS_Z", defaults.aoi.cnts_z)?,
        };

        let config = Self {
            host: env::var("RUSTY_REALM_HOST").unwrap_or(defaults.host),
            port: env_parse("RUSTY_REALM_PORT", defaults.port)?,
            max_connections: env_parse("RUSTY_REALM_MAX_CONN", defaults.max_connections)?,
            worker_pool_size: env_parse("RUSTY_REALM_WORKER_POOL_SIZE", defaults.worker_pool_size)?,
            max_worker_tasks: env_parse("RUSTY_REALM_MAX_WORKER_TASKS", defaults.max_worker_tasks)?,
            max_packet_size: env_parse("RUSTY_REALM_MAX_PACKET_SIZE", defaults.max_packet_size)?,
            outbound_queue: env_parse("RUSTY_REALM_OUTBOUND_QUEUE", defaults.outbound_queue)?,
            send_policy,
            drain_timeout: Duration::from_millis(env_parse(
                "RUSTY_REALM_DRAIN_TIMEOUT_MS",
                DEFAULT_DRAIN_TIMEOUT_MS,
            )?),
            save_path: env::var("RUSTY_REALM_SAVE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.save_path),
            aoi,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration describes a runnable server
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(RealmError::Config(
                "worker pool size must be greater than zero".to_string(),
            ));
        }
        if self.max_worker_tasks == 0 {
            return Err(RealmError::Config(
                "worker queue capacity must be greater than zero".to_string(),
            ));
        }
        if self.outbound_queue < MIN_OUTBOUND_QUEUE {
            return Err(RealmError::Config(format!(
                "outbound queue must hold at least {} messages",
                MIN_OUTBOUND_QUEUE
            )));
        }
        if self.max_packet_size == 0 || self.max_packet_size > u32::MAX as usize {
            return Err(RealmError::Config(format!(
                "max packet size must be within 1..={}",
                u32::MAX
            )));
        }
        if self.max_connections == 0 {
            return Err(RealmError::Config(
                "max connections must be greater than zero".to_string(),
            ));
        }
        self.aoi.validate()
    }

    /// Socket address string the listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
