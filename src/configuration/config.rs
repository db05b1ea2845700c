use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::info;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line arguments.
///
/// Every flag overrides the matching value read from the configuration file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pgservices")]
#[command(version)]
#[command(about = "Discovers, tracks and provisions PostgreSQL service containers")]
pub struct Args {
    /// Path to a TOML configuration file. Built-in defaults are used without one.
    pub config_file: Option<PathBuf>,

    /// Private directory under which provisioning stages init scripts and console files.
    ///
    /// # Command Line
    /// Use `--storage-dir <PATH>` or the `PGSERVICES_STORAGE_DIR` environment variable
    #[arg(long, env = "PGSERVICES_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Address the HTTP API listens on.
    #[arg(long)]
    pub bind_address: Option<String>,

    /// Port the HTTP API listens on.
    #[arg(long)]
    pub port: Option<u16>,
}

/// Application configuration.
///
/// Read from a TOML file with four optional tables:
/// - `[engine]`: podman binary, call timeout and event-stream restart back-off
/// - `[storage]`: private storage root
/// - `[web]`: bind address, port and long-poll timeout of the HTTP API
/// - `[provisioning]`: pod co-location and admin console credentials
///
/// Missing tables and keys fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub web: WebConfig,
    pub provisioning: ProvisioningConfig,
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the effective configuration from the file named in `args`, if any,
    /// and the command-line overrides.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config_file {
            Some(path) => {
                info!("Reading configuration from {}", path.display());
                Self::parse_file(path)?
            }
            None => {
                info!("No configuration file given, using defaults");
                Config::default()
            }
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(dir) = &args.storage_dir {
            self.storage.root = dir.clone();
        }
        if let Some(address) = &args.bind_address {
            self.web.bind_address = address.clone();
        }
        if let Some(port) = args.port {
            self.web.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.port == 0 {
            return Err(ConfigError::BadPort("web port must not be 0".to_string()));
        }
        self.bind_ip()?;
        if self.engine.call_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "engine.call_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.engine.restart_backoff_secs == 0 {
            return Err(ConfigError::NotInRange(
                "engine.restart_backoff_secs must be greater than 0".to_string(),
            ));
        }
        if self.web.long_poll_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "web.long_poll_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.engine.binary.trim().is_empty() {
            return Err(ConfigError::NotInRange(
                "engine.binary must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.web
            .bind_address
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::BadIPFormatting(format!("{}: {}", self.web.bind_address, e)))
    }

    pub fn socket_address(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.web.port))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.call_timeout_secs)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.engine.restart_backoff_secs)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.web.long_poll_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const FULL: &str = r#"
[engine]
binary = "/usr/local/bin/podman"
call_timeout_secs = 10
restart_backoff_secs = 2

[storage]
root = "/var/lib/pgservices"

[web]
bind_address = "0.0.0.0"
port = 8088
long_poll_timeout_secs = 5

[provisioning]
use_pod = false
pgadmin_email = "dba@example.com"
pgadmin_password = "hunter2"
"#;

    #[test]
    fn test_parse_full_file() {
        let config = Config::parse(FULL).unwrap();
        assert_eq!(config.engine.binary, "/usr/local/bin/podman");
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.restart_backoff(), Duration::from_secs(2));
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/pgservices"));
        assert_eq!(config.socket_address().unwrap().to_string(), "0.0.0.0:8088");
        assert_eq!(config.long_poll_timeout(), Duration::from_secs(5));
        assert!(!config.provisioning.use_pod);
        assert_eq!(config.provisioning.pgadmin_email, "dba@example.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_tables_use_defaults() {
        let config = Config::parse("[web]\nport = 9000\n").unwrap();
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.bind_address, "127.0.0.1");
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.provisioning.use_pod);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::parse("[web\nport = 1"),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.web.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::BadPort(_))));

        let mut config = Config::default();
        config.web.bind_address = "localhost:80".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadIPFormatting(_))
        ));

        let mut config = Config::default();
        config.engine.call_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NotInRange(_))));

        let mut config = Config::default();
        config.web.long_poll_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NotInRange(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.web.port, 8088);

        let missing = Config::from_file(Path::new("/nonexistent/pgservices.toml"));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }

    #[test]
    #[serial]
    fn test_cli_overrides_file() {
        std::env::remove_var("PGSERVICES_STORAGE_DIR");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = Args::try_parse_from([
            "pgservices",
            path.as_str(),
            "--bind-address",
            "127.0.0.1",
            "--port",
            "7171",
            "--storage-dir",
            "/srv/pg",
        ])
        .unwrap_or_else(|e| panic!("{}", e));

        let config = Config::load(&args).unwrap();
        assert_eq!(config.web.bind_address, "127.0.0.1");
        assert_eq!(config.web.port, 7171);
        assert_eq!(config.storage.root, PathBuf::from("/srv/pg"));
        assert_eq!(config.engine.call_timeout_secs, 10);
    }

    #[test]
    #[serial]
    fn test_storage_dir_from_environment() {
        std::env::set_var("PGSERVICES_STORAGE_DIR", "/env/storage");
        let args = Args::try_parse_from(["pgservices"]);
        std::env::remove_var("PGSERVICES_STORAGE_DIR");

        let config = Config::load(&args.unwrap()).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/env/storage"));
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        std::env::remove_var("PGSERVICES_STORAGE_DIR");
        let args = Args::try_parse_from(["pgservices"]).unwrap();
        let config = Config::load(&args).unwrap();
        assert_eq!(config.web, WebConfig::default());
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = Args {
            port: Some(0),
            ..Default::default()
        };
        assert!(matches!(Config::load(&args), Err(ConfigError::BadPort(_))));
    }
}
