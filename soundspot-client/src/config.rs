use std::{path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

/// Where the client runs, which decides how the API host is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    /// The host machine is reachable on loopback
    #[default]
    IosSimulator,
    /// The emulator reaches the host machine through a fixed NAT address
    AndroidEmulator,
    /// A physical device reaches the host over the local network
    Device,
}

impl Platform {
    pub fn default_host(&self, lan_host: Option<&str>) -> String {
        match self {
            Platform::IosSimulator => "localhost".to_string(),
            Platform::AndroidEmulator => "10.0.2.2".to_string(),
            Platform::Device => lan_host.unwrap_or(ClientConfig::DEFAULT_LAN_HOST).to_string(),
        }
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ios" | "ios-simulator" => Ok(Platform::IosSimulator),
            "android" | "android-emulator" => Ok(Platform::AndroidEmulator),
            "device" => Ok(Platform::Device),
            other => Err(ConfigError::InvalidPlatform(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown platform \"{0}\", expected ios-simulator, android-emulator, or device")]
    InvalidPlatform(String),
    #[error("Invalid timeout \"{0}\", expected a number of seconds")]
    InvalidTimeout(String),
}

/// How the client reaches the API and where it keeps its files
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub platform: Platform,
    pub api_url: String,
    pub timeout: Duration,
    /// Where persisted sessions live
    pub data_dir: PathBuf,
}

impl ClientConfig {
    pub const DEFAULT_PORT: u16 = 5000;
    pub const DEFAULT_LAN_HOST: &'static str = "192.168.1.100";
    pub const DEFAULT_TIMEOUT_IN_SECONDS: u64 = 30;

    /// Reads the configuration from `SOUNDSPOT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let platform = lookup("SOUNDSPOT_PLATFORM")
            .map(|p| p.parse::<Platform>())
            .transpose()?
            .unwrap_or_default();

        let api_url = lookup("SOUNDSPOT_API_URL").unwrap_or_else(|| {
            let lan_host = lookup("SOUNDSPOT_LAN_HOST");
            let host = platform.default_host(lan_host.as_deref());

            format!("http://{}:{}/api", host, Self::DEFAULT_PORT)
        });

        let timeout = match lookup("SOUNDSPOT_TIMEOUT") {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|s| s.is_finite() && *s > 0.)
                .map(Duration::from_secs_f32)
                .ok_or(ConfigError::InvalidTimeout(raw))?,
            None => Duration::from_secs(Self::DEFAULT_TIMEOUT_IN_SECONDS),
        };

        let data_dir = lookup("SOUNDSPOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("soundspot"));

        Ok(Self {
            platform,
            api_url,
            timeout,
            data_dir,
        })
    }
}
