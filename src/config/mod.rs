pub mod toml_config;

use crate::adapters::griddata::DEFAULT_GRIDDATA_URL;
use crate::utils::error::{HabError, Result};
use crate::utils::validation::{self, Validate};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8002;
pub const DEFAULT_INFLUX_PORT: u16 = 8086;
pub const ADMIN_USERNAME: &str = "admin";

#[derive(Debug, Clone, Parser)]
#[command(name = "hab-data-api")]
#[command(about = "Energy and heat pump data API backed by InfluxDB")]
pub struct CliArgs {
    /// Environment file loaded before configuration is read
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,

    /// Bind address (overrides HAB_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (overrides HAB_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Additional tariff definitions (overrides HAB_TARIFF_FILE)
    #[arg(long)]
    pub tariffs: Option<PathBuf>,

    /// Do not run the price ingestion and cache clearing jobs
    #[arg(long)]
    pub no_scheduler: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// The bind address; the host must be an IPv4 or IPv6 literal.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .trim()
            .parse()
            .map_err(|e: std::net::AddrParseError| HabError::InvalidConfigValueError {
                field: "HAB_HOST".to_string(),
                value: self.host.clone(),
                reason: e.to_string(),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct InfluxConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub influx: InfluxConfig,
    pub griddata_url: String,
    pub tariff_file: Option<PathBuf>,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let password = read_secret("API_ADMIN_PASS", &lookup)?;
        let password = validation::validate_required_field("API_ADMIN_PASS", &password)?.clone();

        let influx_host = lookup("INFLUX_HOST");
        let influx_host = validation::validate_required_field("INFLUX_HOST", &influx_host)?;
        let influx_port = parse_port("INFLUX_PORT", lookup("INFLUX_PORT"))?.unwrap_or(DEFAULT_INFLUX_PORT);

        let database = lookup("INFLUX_DATABASE");
        let database = validation::validate_required_field("INFLUX_DATABASE", &database)?.clone();

        let server = ServerConfig {
            host: lookup("HAB_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_port("HAB_PORT", lookup("HAB_PORT"))?.unwrap_or(DEFAULT_PORT),
        };

        Ok(Self {
            server,
            auth: AuthConfig {
                username: ADMIN_USERNAME.to_string(),
                password,
            },
            influx: InfluxConfig {
                url: influx_url(influx_host, influx_port),
                database,
                username: lookup("INFLUX_USERNAME").filter(|u| !u.is_empty()),
                password: read_secret("INFLUX_PASSWORD", &lookup)?,
            },
            griddata_url: lookup("GRIDDATA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GRIDDATA_URL.to_string()),
            tariff_file: lookup("HAB_TARIFF_FILE").map(PathBuf::from),
        })
    }

    /// Command line flags win over the environment.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(tariffs) = &args.tariffs {
            self.tariff_file = Some(tariffs.clone());
        }
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("HAB_HOST", &self.server.host)?;
        validation::validate_range("HAB_PORT", self.server.port, 1, u16::MAX)?;
        self.server.socket_addr()?;
        validation::validate_non_empty_string("API_ADMIN_PASS", &self.auth.password)?;
        validation::validate_url("INFLUX_HOST", &self.influx.url)?;
        validation::validate_non_empty_string("INFLUX_DATABASE", &self.influx.database)?;
        validation::validate_url("GRIDDATA_BASE_URL", &self.griddata_url)?;

        if let Some(path) = &self.tariff_file {
            validation::validate_file_extension("HAB_TARIFF_FILE", &path.to_string_lossy(), &["toml"])?;
        }

        Ok(())
    }
}

/// Loads `KEY=value` pairs from an env file into the process environment.
/// Variables already set are kept. Returns `Ok(false)` when the file does
/// not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(HabError::ConfigError {
            message: format!("cannot read environment file '{}': {}", path.display(), e),
        }),
    }
}

/// Reads `<name>_FILE` when set (docker secrets), otherwise `<name>`.
pub fn read_secret<F>(name: &str, lookup: &F) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(&format!("{}_FILE", name)) {
        let secret = std::fs::read_to_string(&path).map_err(|e| HabError::ConfigError {
            message: format!("cannot read {}_FILE '{}': {}", name, path, e),
        })?;
        return Ok(Some(secret.trim_end_matches(&['\r', '\n'][..]).to_string()));
    }

    Ok(lookup(name))
}

/// A bare host gets the default scheme and port; a URL is used as given.
fn influx_url(host: &str, port: u16) -> String {
    if host.contains("://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{}:{}", host, port)
    }
}

fn parse_port(field: &str, raw: Option<String>) -> Result<Option<u16>> {
    raw.map(|value| {
        value
            .trim()
            .parse::<u16>()
            .map_err(|e| HabError::InvalidConfigValueError {
                field: field.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_minimal_environment() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("API_ADMIN_PASS", "s3cret"),
            ("INFLUX_HOST", "influxdb"),
            ("INFLUX_DATABASE", "home"),
        ]))
        .unwrap();

        assert_eq!(config.server.socket_addr().unwrap().to_string(), "0.0.0.0:8002");
        assert_eq!(config.auth.username, "admin");
        assert_eq!(config.auth.password, "s3cret");
        assert_eq!(config.influx.url, "http://influxdb:8086");
        assert_eq!(config.influx.username, None);
        assert_eq!(config.griddata_url, DEFAULT_GRIDDATA_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_files_and_overrides() {
        let mut secret = NamedTempFile::new().unwrap();
        writeln!(secret, "from-file").unwrap();
        let secret_path = secret.path().to_string_lossy().to_string();

        let config = AppConfig::from_lookup(lookup_from(&[
            ("API_ADMIN_PASS", "ignored"),
            ("API_ADMIN_PASS_FILE", secret_path.as_str()),
            ("INFLUX_HOST", "https://influx.example.com/"),
            ("INFLUX_DATABASE", "home"),
            ("INFLUX_USERNAME", "reader"),
            ("INFLUX_PASSWORD", "pw"),
            ("HAB_PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.auth.password, "from-file");
        assert_eq!(config.influx.url, "https://influx.example.com");
        assert_eq!(config.influx.username.as_deref(), Some("reader"));
        assert_eq!(config.influx.password.as_deref(), Some("pw"));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_missing_password_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("INFLUX_HOST", "influxdb"),
            ("INFLUX_DATABASE", "home"),
        ]))
        .unwrap_err();

        assert!(matches!(err, HabError::MissingConfigError { ref field } if field == "API_ADMIN_PASS"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("API_ADMIN_PASS", "s3cret"),
            ("INFLUX_HOST", "influxdb"),
            ("INFLUX_DATABASE", "home"),
            ("HAB_PORT", "eighty"),
        ]))
        .unwrap_err();

        assert!(matches!(err, HabError::InvalidConfigValueError { .. }));
    }

    #[test]
    fn test_cli_overrides_environment() {
        let mut config = AppConfig::from_lookup(lookup_from(&[
            ("API_ADMIN_PASS", "s3cret"),
            ("INFLUX_HOST", "influxdb"),
            ("INFLUX_DATABASE", "home"),
        ]))
        .unwrap();

        let args = CliArgs::parse_from(["hab-data-api", "--host", "127.0.0.1", "--port", "8100", "--tariffs", "rates.yaml"]);
        config.apply_cli(&args);

        assert_eq!(config.server.socket_addr().unwrap().to_string(), "127.0.0.1:8100");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ipv6_and_hostname_bind_addresses() {
        let server = ServerConfig {
            host: "::".to_string(),
            port: 8002,
        };
        let addr = server.socket_addr().unwrap();
        assert!(addr.is_ipv6());
        assert_eq!(addr.to_string(), "[::]:8002");

        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 8002,
        };
        assert!(matches!(
            server.socket_addr(),
            Err(HabError::InvalidConfigValueError { ref field, .. }) if field == "HAB_HOST"
        ));
    }
}
