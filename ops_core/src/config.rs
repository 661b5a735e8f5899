use std::{
    env, fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blocks::BlockId;
use crate::classify::RuleSpec;

pub const BUILTIN_OPS_CONFIG: &str = include_str!("data/ops_config.json");
pub const CONFIG_PATH_ENV: &str = "OPS_CONFIG_PATH";
pub const HOST_ENV: &str = "RCON_HOST";
pub const PORT_ENV: &str = "RCON_PORT";
pub const PASSWORD_ENV: &str = "RCON_PASSWORD";

/// Everything the console operations need from the outside world. Nothing in
/// here is ever written back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub connection: ConnectionConfig,
    pub retry: RetryPolicy,
    pub batching: BatchConfig,
    pub verification: VerificationConfig,
    pub terrain: TerrainConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse ops config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read ops config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid value '{value}' in environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid ops config: {0}")]
    Invalid(String),
}

impl OpsConfig {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_OPS_CONFIG).expect("builtin ops config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_json_str(&contents)?)
    }

    /// Resolves the effective config: explicit path, else `OPS_CONFIG_PATH`,
    /// else the builtin document; then `RCON_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::builtin(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var(HOST_ENV) {
            self.connection.host = host;
        }
        if let Ok(port) = env::var(PORT_ENV) {
            self.connection.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: PORT_ENV,
                    value: port.clone(),
                })?;
        }
        if let Ok(password) = env::var(PASSWORD_ENV) {
            self.connection.password = password;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let batching = &self.batching;
        if batching.min_chunk_size == 0 {
            return Err(ConfigError::Invalid("min_chunk_size must be at least 1".into()));
        }
        if batching.min_chunk_size > batching.max_chunk_size {
            return Err(ConfigError::Invalid(format!(
                "min_chunk_size {} exceeds max_chunk_size {}",
                batching.min_chunk_size, batching.max_chunk_size
            )));
        }
        if batching.growth_factor <= 1.0 || batching.shrink_factor <= 1.0 {
            return Err(ConfigError::Invalid(
                "growth_factor and shrink_factor must be greater than 1".into(),
            ));
        }
        if batching.low_water_blocks_per_sec > batching.high_water_blocks_per_sec {
            return Err(ConfigError::Invalid(
                "low_water_blocks_per_sec exceeds high_water_blocks_per_sec".into(),
            ));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid("backoff_factor must be at least 1".into()));
        }
        if self.retry.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.verification.sample_rate) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate {} outside 0..=1",
                self.verification.sample_rate
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl ConnectionConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25575,
            password: String::new(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    /// Hard per-attempt deadline.
    pub timeout_ms: u64,
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Pause after failed attempt `attempt` (1-based):
    /// `base_delay * backoff_factor^(attempt - 1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);
        Duration::from_nanos((millis.max(0.0) * 1_000_000.0).round() as u64)
    }

    /// Sum of every pause taken when all attempts fail.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts()).map(|attempt| self.delay_after(attempt)).sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            backoff_factor: 2.0,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub initial_chunk_size: u64,
    pub min_chunk_size: u64,
    pub max_chunk_size: u64,
    pub growth_factor: f64,
    pub shrink_factor: f64,
    pub high_water_blocks_per_sec: f64,
    pub low_water_blocks_per_sec: f64,
    /// Consecutive successful chunks required before growing.
    pub growth_streak: u32,
    /// Times a failed chunk footprint goes back on the queue before it is
    /// reported as unresolved.
    pub max_requeues: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_chunk_size: 4096,
            min_chunk_size: 64,
            max_chunk_size: 32_768,
            growth_factor: 2.0,
            shrink_factor: 2.0,
            high_water_blocks_per_sec: 20_000.0,
            low_water_blocks_per_sec: 500.0,
            growth_streak: 2,
            max_requeues: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub sample_rate: f64,
    pub max_samples: u32,
    pub seed: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            sample_rate: 0.001,
            max_samples: 64,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Fill material used when no snapshot records the original block.
    pub default_surface_material: BlockId,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            default_surface_material: BlockId::new("grass_block"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Evaluated before the builtin dialect rules.
    pub extra_rules: Vec<RuleSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses_and_validates() {
        let config = OpsConfig::builtin();
        config.validate().unwrap();
        assert_eq!(config.connection.port, 25575);
        assert_eq!(config.batching.max_chunk_size, 32_768);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = OpsConfig::from_json_str(r#"{"retry":{"max_retries":7}}"#).unwrap();
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.batching.initial_chunk_size, 4096);
    }

    #[test]
    fn backoff_delays_grow_geometrically() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay_ms: 100,
            backoff_factor: 2.0,
            timeout_ms: 1000,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.total_backoff(), Duration::from_millis(700));
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let mut config = OpsConfig::default();
        config.batching.min_chunk_size = 10_000;
        config.batching.max_chunk_size = 100;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = OpsConfig::default();
        config.verification.sample_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = OpsConfig::default();
        config.batching.shrink_factor = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.json");
        fs::write(
            &path,
            r#"{"connection":{"host":"mc.internal","port":25000,"password":"hunter2"}}"#,
        )
        .unwrap();
        let config = OpsConfig::from_file(&path).unwrap();
        assert_eq!(config.connection.address(), "mc.internal:25000");
        assert!(!format!("{:?}", config.connection).contains("hunter2"));
    }
}
