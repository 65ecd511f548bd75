use anyhow::Context as _;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

/// Prefix of the environment variables layered over the file, e.g.
/// `SLIDES_SERVER__PORT=4841`.
pub const ENV_PREFIX: &str = "SLIDES";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration file: {source}")]
    ReadError { source: std::io::Error },

    #[error("Failed to parse configuration: {source}")]
    ParseError { source: toml::de::Error },

    #[error("Failed to apply environment overrides: {source}")]
    LayerError { source: config::ConfigError },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError { source: toml::ser::Error },

    #[error("Failed to write configuration file: {source}")]
    WriteError { source: std::io::Error },

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 4840,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Read and write timeout of one request, in seconds.
    pub timeout: f64,
    /// Upper bound for homing a device during initialization, in seconds.
    pub home_timeout: f64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout: 0.5,
            home_timeout: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SlideAxis {
    /// Two axes of one device moving as a lockstep group.
    Lockstep { id: u8, axes: [u8; 2] },
    Single { axis: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideConfig {
    pub name: String,
    /// Position of the device in detection order, starting at 0.
    pub device_index: usize,
    /// Travel of one microstep in millimetres.
    #[serde(default = "default_microstep_size")]
    pub microstep_size: f64,
    pub axis: SlideAxis,
}

fn default_microstep_size() -> f64 {
    0.000_047_625
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Tick period of the server loop, in seconds.
    pub refresh_time: f64,
    pub namespace: String,
    /// Minimum time between two initialization attempts of one slide, in
    /// seconds.
    pub reconnect_timeout: f64,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Writes a daily rolling log file here instead of stdout.
    pub log_dir: Option<PathBuf>,
    pub server: ServerConfig,
    pub serial: SerialConfig,
    pub slides: Vec<SlideConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            refresh_time: 0.1,
            namespace: "zaber-opcua".to_string(),
            reconnect_timeout: 10.0,
            log_level: "warn".to_string(),
            log_format: LogFormat::Text,
            log_dir: None,
            server: ServerConfig::default(),
            serial: SerialConfig::default(),
            slides: vec![
                SlideConfig {
                    name: "Parallel Slide".to_string(),
                    device_index: 0,
                    microstep_size: default_microstep_size(),
                    axis: SlideAxis::Lockstep { id: 1, axes: [1, 2] },
                },
                SlideConfig {
                    name: "Cross Slide".to_string(),
                    device_index: 1,
                    microstep_size: default_microstep_size(),
                    axis: SlideAxis::Single { axis: 1 },
                },
            ],
        }
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    if value <= 0.0 {
        return Err(ConfigError::ValidationError {
            message: format!("{} must be positive, got {}", name, value),
        });
    }
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::ValidationError {
        message: format!("{}: {}", name, e),
    })
}

impl BridgeConfig {
    pub fn refresh_period(&self) -> Result<Duration, ConfigError> {
        seconds("refresh_time", self.refresh_time)
    }

    pub fn reconnect_cooldown(&self) -> Result<Duration, ConfigError> {
        seconds("reconnect_timeout", self.reconnect_timeout)
    }

    pub fn serial_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("serial.timeout", self.serial.timeout)
    }

    pub fn home_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("serial.home_timeout", self.serial.home_timeout)
    }

    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.ip, self.server.port)
            .parse()
            .map_err(|e| ConfigError::ValidationError {
                message: format!("server address {}:{}: {}", self.server.ip, self.server.port, e),
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.refresh_period()?;
        self.reconnect_cooldown()?;
        self.serial_timeout()?;
        self.home_timeout()?;
        self.server_addr()?;

        if self.slides.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "at least one slide has to be configured".to_string(),
            });
        }

        for (index, slide) in self.slides.iter().enumerate() {
            if self.slides[..index].iter().any(|other| other.name == slide.name) {
                return Err(ConfigError::ValidationError {
                    message: format!("slide name '{}' is used twice", slide.name),
                });
            }
            if !(slide.microstep_size.is_finite() && slide.microstep_size > 0.0) {
                return Err(ConfigError::ValidationError {
                    message: format!("microstep_size of '{}' must be positive", slide.name),
                });
            }
            if let SlideAxis::Lockstep { axes, .. } = slide.axis {
                if axes[0] == axes[1] {
                    return Err(ConfigError::ValidationError {
                        message: format!("lockstep axes of '{}' must differ", slide.name),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Parses `content` and layers `SLIDES_*` variables over it. Tests pass
/// `env` explicitly, `None` reads the process environment.
pub fn layered(
    content: &str,
    env: Option<config::Map<String, String>>,
) -> Result<BridgeConfig, ConfigError> {
    // Fail with the toml position before the layering hides it.
    toml::from_str::<BridgeConfig>(content).map_err(|e| ConfigError::ParseError { source: e })?;

    config::Config::builder()
        .add_source(File::from_str(content, FileFormat::Toml))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .and_then(|layers| layers.try_deserialize())
        .map_err(|e| ConfigError::LayerError { source: e })
}

#[derive(Debug)]
pub struct ConfigOptions {
    pub config_path: PathBuf,
    pub create_if_missing: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            create_if_missing: true,
        }
    }
}

impl ConfigOptions {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("slide_bridge.toml"))
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    options: ConfigOptions,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            options: ConfigOptions::default(),
        }
    }

    pub fn with_options(options: ConfigOptions) -> Self {
        Self { options }
    }

    pub fn path(&self) -> &Path {
        &self.options.config_path
    }

    pub fn load(&self) -> anyhow::Result<BridgeConfig> {
        self.load_with_env(None)
    }

    fn load_with_env(
        &self,
        env: Option<config::Map<String, String>>,
    ) -> anyhow::Result<BridgeConfig> {
        let config_path = self.options.config_path.clone();

        let content = if config_path.exists() {
            fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError { source: e })?
        } else if self.options.create_if_missing {
            let default_config = BridgeConfig::default();
            self.save(&default_config)
                .context("Failed to save default config")?;
            toml::to_string_pretty(&default_config)
                .map_err(|e| ConfigError::SerializeError { source: e })?
        } else {
            return Err(ConfigError::FileNotFound { path: config_path }.into());
        };

        let config = layered(&content, env)?;
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, config: &BridgeConfig) -> anyhow::Result<()> {
        let config_path = &self.options.config_path;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(config_path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn init_config() -> anyhow::Result<(ConfigManager, BridgeConfig)> {
    let manager = ConfigManager::new();
    let config = manager.load()?;
    Ok((manager, config))
}

pub fn create_default_config<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<()> {
    let config_path = path
        .map(|p| p.as_ref().to_path_buf())
        .unwrap_or_else(ConfigOptions::default_config_path);

    let options = ConfigOptions {
        config_path,
        create_if_missing: true,
    };

    let manager = ConfigManager::with_options(options);
    manager.save(&BridgeConfig::default())?;

    Ok(())
}
