use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Environment variables read by the harness, in addition to `CHURN_CONFIG`.
pub const ENV_KEYS: [&str; 4] = ["THREADS", "COUNT", "LOOPS", "PAUSE_MS"];

const DEFAULT_CONFIG_FILE: &str = "churn.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("COUNT={0} does not fit in this platform's address space")]
    CountTooLarge(u64),
}

/// Run parameters, resolved once at startup and copied into every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnConfig {
    /// Total workers, including the initiating one.
    pub threads: usize,
    /// Elements appended to the buffer per cycle.
    pub count: u64,
    /// Churn cycles per worker.
    pub loops: u64,
    /// Length of the pause after each allocation phase.
    pub pause_ms: u64,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            count: 100_000_000,
            loops: 3,
            pause_ms: 1000,
        }
    }
}

impl ChurnConfig {
    /// Defaults, then `churn.toml` (or `$CHURN_CONFIG`), then the raw environment.
    pub fn figment() -> Figment {
        let file = std::env::var("CHURN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file_exact(file))
            .merge(Env::raw().only(&ENV_KEYS))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let cfg: Self = figment.extract().map_err(Box::new)?;
        cfg.validate()
    }

    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.threads == 0 {
            warn!("THREADS=0 requested; running the initiating worker only");
            self.threads = 1;
        }
        if usize::try_from(self.count).is_err() {
            return Err(ConfigError::CountTooLarge(self.count));
        }
        Ok(self)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    /// Elements per cycle as a buffer length. Checked by [`ChurnConfig::validate`].
    pub fn target_len(&self) -> usize {
        usize::try_from(self.count).unwrap_or(usize::MAX)
    }
}
