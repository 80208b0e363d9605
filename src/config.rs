use crate::cli::{Args, BackendKind, CompressionFormat};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of every environment variable read by [`AppConfig::apply_env`]
pub const ENV_PREFIX: &str = "COLLISION_DASH_";

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file or subdirectory
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    /// Ensure the config directory exists
    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub data: DataConfig,
    pub limits: LimitsConfig,
    pub years: YearRangeConfig,
    pub sampling: SamplingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub crash_path: Option<PathBuf>,
    pub person_path: Option<PathBuf>,
    pub backend: String,
    pub sample_rows: usize,
    pub compression: Option<String>,
    pub delimiter: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub map_sample_max: usize,
    pub age_row_max: Option<usize>,
    pub vehicle_options: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct YearRangeConfig {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub reproducible: bool,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            data: DataConfig::default(),
            limits: LimitsConfig::default(),
            years: YearRangeConfig::default(),
            sampling: SamplingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            crash_path: None,
            person_path: None,
            backend: "memory".to_string(),
            sample_rows: 200_000,
            compression: None,
            delimiter: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            map_sample_max: 2000,
            age_row_max: None,
            vehicle_options: 30,
        }
    }
}

impl Default for YearRangeConfig {
    fn default() -> Self {
        Self {
            min: 2015,
            max: 2025,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            reproducible: true,
            seed: 42,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user → environment)
    pub fn load(app_name: &str) -> Result<Self> {
        let config_manager = ConfigManager::new(app_name)?;
        Self::load_with(&config_manager, |key| std::env::var(key).ok())
    }

    /// Load configuration from a specific config directory and environment source
    pub fn load_with<F>(config_manager: &ConfigManager, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        let user_config = Self::load_user_config(config_manager)?;
        config.merge(user_config);
        config.apply_env(env)?;

        config.validate()?;

        Ok(config)
    }

    /// Load user configuration from ~/.config/collision-dash/config.toml
    fn load_user_config(config_manager: &ConfigManager) -> Result<AppConfig> {
        let config_path = config_manager.config_path("config.toml");

        if !config_path.exists() {
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.data.merge(other.data);
        self.limits.merge(other.limits);
        self.years.merge(other.years);
        self.sampling.merge(other.sampling);
        self.logging.merge(other.logging);
    }

    /// Apply `COLLISION_DASH_*` overrides. Unparseable values are errors
    /// rather than silently ignored.
    pub fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| env(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(path) = var("CRASH_PATH") {
            self.data.crash_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("PERSON_PATH") {
            self.data.person_path = Some(PathBuf::from(path));
        }
        if let Some(backend) = var("BACKEND") {
            self.data.backend = backend;
        }
        if let Some(value) = var("MAP_SAMPLE_MAX") {
            self.limits.map_sample_max = parse_env("MAP_SAMPLE_MAX", &value)?;
        }
        if let Some(value) = var("AGE_ROW_MAX") {
            self.limits.age_row_max = Some(parse_env("AGE_ROW_MAX", &value)?);
        }
        if let Some(value) = var("YEAR_MIN") {
            self.years.min = parse_env("YEAR_MIN", &value)?;
        }
        if let Some(value) = var("YEAR_MAX") {
            self.years.max = parse_env("YEAR_MAX", &value)?;
        }
        if let Some(value) = var("SEED") {
            self.sampling.seed = parse_env("SEED", &value)?;
            self.sampling.reproducible = true;
        }

        Ok(())
    }

    /// Apply command-line overrides (highest precedence)
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(path) = &args.crash_path {
            self.data.crash_path = Some(path.clone());
        }
        if let Some(path) = &args.person_path {
            self.data.person_path = Some(path.clone());
        }
        if let Some(backend) = args.backend {
            self.data.backend = backend.as_str().to_string();
        }
        if let Some(rows) = args.sample_rows {
            self.data.sample_rows = rows;
        }
        if let Some(compression) = args.compression {
            self.data.compression = Some(compression.extension().to_string());
        }
        self.data.delimiter = args.delimiter.or(self.data.delimiter);
        if let Some(max) = args.map_sample_max {
            self.limits.map_sample_max = max;
        }
        if let Some(max) = args.age_row_max {
            self.limits.age_row_max = Some(max);
        }
        if let Some(year) = args.year_min {
            self.years.min = year;
        }
        if let Some(year) = args.year_max {
            self.years.max = year;
        }
        if let Some(seed) = args.seed {
            self.sampling.seed = seed;
            self.sampling.reproducible = true;
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        let backend = self.backend()?;
        if backend == BackendKind::Sampled && self.data.sample_rows == 0 {
            return Err(eyre!("sample_rows must be greater than 0"));
        }

        if let Some(compression) = &self.data.compression {
            if CompressionFormat::from_name(compression).is_none() {
                return Err(eyre!(
                    "Invalid compression: {}. Must be 'gzip', 'zstd', 'bzip2', or 'xz'",
                    compression
                ));
            }
        }

        if self.limits.map_sample_max == 0 {
            return Err(eyre!("map_sample_max must be greater than 0"));
        }

        if self.limits.age_row_max == Some(0) {
            return Err(eyre!("age_row_max must be greater than 0 when set"));
        }

        if self.years.min > self.years.max {
            return Err(eyre!(
                "Invalid year range: min {} is after max {}",
                self.years.min,
                self.years.max
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(eyre!(
                    "Invalid logging level: {}. Must be off, error, warn, info, debug, or trace",
                    self.logging.level
                ))
            }
        }

        Ok(())
    }

    /// The configured backend kind
    pub fn backend(&self) -> Result<BackendKind> {
        BackendKind::from_name(&self.data.backend).ok_or_else(|| {
            eyre!(
                "Invalid backend: {}. Must be 'memory', 'lazy', or 'sampled'",
                self.data.backend
            )
        })
    }

    /// Seed for the map sample, `None` when every request should draw a fresh sample
    pub fn sample_seed(&self) -> Option<u64> {
        self.sampling.reproducible.then_some(self.sampling.seed)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| eyre!("Invalid value for {ENV_PREFIX}{name}: {value}"))
}

// Merge implementations for each config section
impl DataConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DataConfig::default();
        if other.crash_path.is_some() {
            self.crash_path = other.crash_path;
        }
        if other.person_path.is_some() {
            self.person_path = other.person_path;
        }
        if other.backend != default.backend {
            self.backend = other.backend;
        }
        if other.sample_rows != default.sample_rows {
            self.sample_rows = other.sample_rows;
        }
        if other.compression.is_some() {
            self.compression = other.compression;
        }
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
    }
}

impl LimitsConfig {
    pub fn merge(&mut self, other: Self) {
        let default = LimitsConfig::default();
        if other.map_sample_max != default.map_sample_max {
            self.map_sample_max = other.map_sample_max;
        }
        if other.age_row_max.is_some() {
            self.age_row_max = other.age_row_max;
        }
        if other.vehicle_options != default.vehicle_options {
            self.vehicle_options = other.vehicle_options;
        }
    }
}

impl YearRangeConfig {
    pub fn merge(&mut self, other: Self) {
        let default = YearRangeConfig::default();
        if other.min != default.min {
            self.min = other.min;
        }
        if other.max != default.max {
            self.max = other.max;
        }
    }
}

impl SamplingConfig {
    pub fn merge(&mut self, other: Self) {
        let default = SamplingConfig::default();
        if other.reproducible != default.reproducible {
            self.reproducible = other.reproducible;
        }
        if other.seed != default.seed {
            self.seed = other.seed;
        }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        let default = LoggingConfig::default();
        if other.level != default.level {
            self.level = other.level;
        }
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../config/default.toml");
