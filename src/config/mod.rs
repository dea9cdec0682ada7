//! Compiler and runtime settings from `tessera.toml`, with environment
//! overrides.

use std::path::{Path, PathBuf};
use std::{env, fmt, fs};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "tessera.toml";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown power preference: {0}")]
    UnknownPowerPreference(String),

    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },
}

// ── PowerPreference ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    None,
    LowPower,
    #[default]
    HighPerformance,
}

impl PowerPreference {
    pub fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            Self::None => wgpu::PowerPreference::None,
            Self::LowPower => wgpu::PowerPreference::LowPower,
            Self::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl fmt::Display for PowerPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::LowPower => write!(f, "low-power"),
            Self::HighPerformance => write!(f, "high-performance"),
        }
    }
}

impl std::str::FromStr for PowerPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low-power" | "low_power" | "low" => Ok(Self::LowPower),
            "high-performance" | "high_performance" | "high" => Ok(Self::HighPerformance),
            other => Err(ConfigError::UnknownPowerPreference(other.to_string())),
        }
    }
}

// ── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Invocations per workgroup for parallel tasks.
    pub workgroup_size: u32,
    /// Threads launched for parallel loops whose trip count is only known
    /// on the device.
    pub dynamic_threads: u32,
    pub max_inline_depth: u32,
    /// Largest iteration count a static loop may unroll to.
    pub unroll_limit: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            workgroup_size: 128,
            dynamic_threads: 65536,
            max_inline_depth: 64,
            unroll_limit: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub power_preference: PowerPreference,
    /// Seed mixed into `random()`; `None` draws one per launch.
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compiler: CompilerConfig,
    pub runtime: RuntimeConfig,
}

impl Config {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Walk up from `start` looking for `tessera.toml`.
    pub fn find(start: &Path) -> Option<PathBuf> {
        let mut dir = if start.is_file() {
            start.parent()?.to_path_buf()
        } else {
            start.to_path_buf()
        };
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Load the nearest config file, or defaults when there is none, then
    /// apply `TESSERA_*` environment overrides.
    pub fn discover(start: &Path) -> Result<Self, ConfigError> {
        let mut config = match Self::find(start) {
            Some(path) => {
                tracing::debug!("loading config from {}", path.display());
                Self::load(&path)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("TESSERA_WORKGROUP_SIZE") {
            self.compiler.workgroup_size = parse_env_u32("TESSERA_WORKGROUP_SIZE", &v)?;
        }
        if let Ok(v) = env::var("TESSERA_DYNAMIC_THREADS") {
            self.compiler.dynamic_threads = parse_env_u32("TESSERA_DYNAMIC_THREADS", &v)?;
        }
        if let Ok(v) = env::var("TESSERA_POWER_PREFERENCE") {
            self.runtime.power_preference = v.parse()?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.compiler;
        if c.workgroup_size == 0 || c.workgroup_size > 256 {
            return Err(ConfigError::Validation(format!(
                "compiler.workgroup_size must be in 1..=256, got {}",
                c.workgroup_size
            )));
        }
        if c.dynamic_threads == 0 {
            return Err(ConfigError::Validation(
                "compiler.dynamic_threads must be positive".to_string(),
            ));
        }
        if c.max_inline_depth == 0 {
            return Err(ConfigError::Validation(
                "compiler.max_inline_depth must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvVar {
        key: key.to_string(),
        value: value.to_string(),
    })
}
