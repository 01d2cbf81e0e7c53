use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://dev.shamela.ws/api/v1";
pub const DEFAULT_PORT: u16 = 3001;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Root URL of the remote patch API
    pub base_url: ConfigValue<String>,
    /// API key sent with every patch request
    #[serde(serialize_with = "serialize_masked")]
    pub api_key: ConfigValue<Option<String>>,
    /// Directory holding snapshots and version cursors
    pub data_dir: ConfigValue<PathBuf>,
    /// Port the API server listens on
    pub port: ConfigValue<u16>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    base_url: Option<String>,
    api_key: Option<String>,
    data_dir: Option<PathBuf>,
    port: Option<u16>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], reading environment variables through `env`.
    pub fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut base_url = ConfigValue::new(DEFAULT_BASE_URL.to_string(), ConfigSource::Default);
        let mut api_key = ConfigValue::new(None, ConfigSource::Default);
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut port = ConfigValue::new(DEFAULT_PORT, ConfigSource::Default);
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.base_url {
                base_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(key) = file_config.api_key {
                api_key = ConfigValue::new(Some(key), ConfigSource::File);
            }
            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(p) = file_config.port {
                port = ConfigValue::new(p, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        if let Some(url) = env("MAKTABA_BASE_URL") {
            base_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Some(key) = env("MAKTABA_API_KEY") {
            api_key = ConfigValue::new(Some(key), ConfigSource::Environment);
        }
        if let Some(dir) = env("MAKTABA_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Some(p) = env("MAKTABA_PORT") {
            let parsed = p.parse().map_err(|_| ConfigError::InvalidValue {
                name: "MAKTABA_PORT",
                value: p.clone(),
            })?;
            port = ConfigValue::new(parsed, ConfigSource::Environment);
        }

        Ok(Self {
            base_url,
            api_key,
            data_dir,
            port,
            config_file,
        })
    }

    /// The API key, or an error explaining how to set one.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .value
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir.value
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/maktaba/
    /// - macOS: ~/Library/Application Support/maktaba/
    /// - Windows: %APPDATA%/maktaba/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("maktaba")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/maktaba/
    /// - macOS: ~/Library/Application Support/maktaba/
    /// - Windows: %APPDATA%/maktaba/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("maktaba")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Shows only the last four characters of a key.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn serialize_masked<S: Serializer>(
    key: &ConfigValue<Option<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    ConfigValue::new(key.value.as_deref().map(mask_key), key.source.clone()).serialize(serializer)
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue { name: &'static str, value: String },
    MissingApiKey,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue { name, value } => {
                write!(f, "Invalid value '{}' for {}", value, name)
            }
            ConfigError::MissingApiKey => write!(
                f,
                "No API key configured. Set api_key in the config file or MAKTABA_API_KEY."
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(dir: &Path, lines: &[&str]) -> PathBuf {
        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        config_path
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        assert_eq!(config.base_url.value, DEFAULT_BASE_URL);
        assert_eq!(config.base_url.source, ConfigSource::Default);
        assert_eq!(config.api_key.value, None);
        assert!(config.data_dir.value.ends_with("maktaba"));
        assert_eq!(config.port.value, 3001);
        assert!(config.config_file.is_none());
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(
            temp_dir.path(),
            &[
                "base_url: http://localhost:9000/api",
                "api_key: file-key",
                "data_dir: /var/lib/maktaba",
                "port: 8080",
            ],
        );

        let config = Config::load_with_env(Some(config_path.clone()), no_env).unwrap();
        assert_eq!(config.base_url.value, "http://localhost:9000/api");
        assert_eq!(config.base_url.source, ConfigSource::File);
        assert_eq!(config.require_api_key().unwrap(), "file-key");
        assert_eq!(config.data_dir.value, PathBuf::from("/var/lib/maktaba"));
        assert_eq!(config.port.value, 8080);
        assert_eq!(config.port.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_relative_data_dir_resolves_against_config_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["data_dir: library"]);

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("library"));
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["api_key: fromfile", "port: 8080"]);
        let env: HashMap<&str, &str> = [("MAKTABA_API_KEY", "fromenv"), ("MAKTABA_DATA_DIR", "/tmp/m")]
            .into_iter()
            .collect();

        let config =
            Config::load_with_env(Some(config_path), |name| env.get(name).map(|v| v.to_string()))
                .unwrap();
        assert_eq!(config.api_key.value.as_deref(), Some("fromenv"));
        assert_eq!(config.api_key.source, ConfigSource::Environment);
        assert_eq!(config.data_dir.value, PathBuf::from("/tmp/m"));
        assert_eq!(config.port.value, 8080);
        assert_eq!(config.port.source, ConfigSource::File);
    }

    #[test]
    fn test_invalid_port_env_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let result = Config::load_with_env(Some(config_path), |name| {
            (name == "MAKTABA_PORT").then(|| "http".to_string())
        });
        assert!(result.unwrap_err().to_string().contains("MAKTABA_PORT"));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["invalid: yaml: content: ["]);

        let result = Config::load_with_env(Some(config_path), no_env);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_api_key_is_masked_when_serialized() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["api_key: a81267-6a3bfd"]);

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["api_key"]["value"], "****3bfd");
        assert_eq!(json["api_key"]["source"], "file");
        assert_eq!(mask_key("abc"), "****");
    }
}
