//! Конфигурация конвейера из переменных окружения

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost(#[from] std::net::AddrParseError),
}

/// Случайный разброс эвристических оценок (в процентных пунктах)
#[derive(Debug, Clone, PartialEq)]
pub struct JitterConfig {
    pub enabled: bool,
    pub approval_amplitude: f64,
    pub withdrawal_amplitude: f64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            approval_amplitude: 4.0,
            withdrawal_amplitude: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Каталог артефактов моделей, метаданных и истории
    pub weights_dir: PathBuf,
    /// Каталог архива обучающих данных
    pub data_dir: PathBuf,
    pub seed: u64,
    pub jitter: JitterConfig,
    /// Размер синтетической выборки для первичного обучения
    pub bootstrap_samples: usize,
    pub training_timeout: Duration,
    pub server: ServerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            weights_dir: PathBuf::from("weights"),
            data_dir: PathBuf::from("data"),
            seed: 42,
            jitter: JitterConfig::default(),
            bootstrap_samples: 500,
            training_timeout: Duration::from_secs(300),
            server: ServerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let jitter_defaults = JitterConfig::default();

        Ok(Self {
            weights_dir: env::var("CREDIT_ML_WEIGHTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.weights_dir),
            data_dir: env::var("CREDIT_ML_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            seed: parse_var("CREDIT_ML_SEED", "u64", defaults.seed)?,
            jitter: JitterConfig {
                enabled: parse_var("CREDIT_ML_JITTER", "bool", jitter_defaults.enabled)?,
                approval_amplitude: parse_var(
                    "CREDIT_ML_APPROVAL_JITTER",
                    "f64",
                    jitter_defaults.approval_amplitude,
                )?,
                withdrawal_amplitude: parse_var(
                    "CREDIT_ML_WITHDRAWAL_JITTER",
                    "f64",
                    jitter_defaults.withdrawal_amplitude,
                )?,
            },
            bootstrap_samples: parse_var(
                "CREDIT_ML_BOOTSTRAP_SAMPLES",
                "usize",
                defaults.bootstrap_samples,
            )?,
            training_timeout: Duration::from_secs(parse_var(
                "CREDIT_ML_TRAIN_TIMEOUT_SECS",
                "u64",
                defaults.training_timeout.as_secs(),
            )?),
            server: ServerConfig {
                host: env::var("APP_HOST").unwrap_or(defaults.server.host),
                port: parse_var("APP_PORT", "u16", defaults.server.port)?,
                log_level: env::var("APP_LOG_LEVEL").unwrap_or(defaults.server.log_level),
            },
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue {
                name,
                expected,
                value,
            }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_deterministic() {
        let config = PipelineConfig::default();
        assert!(!config.jitter.enabled);
        assert_eq!(config.seed, 42);
        assert_eq!(config.weights_dir, PathBuf::from("weights"));
    }

    #[test]
    fn localhost_resolves_to_loopback() {
        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 8080,
            log_level: "info".to_string(),
        };
        assert_eq!(server.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn invalid_host_is_rejected() {
        let server = ServerConfig {
            host: "not-an-ip".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(server.socket_addr(), Err(ConfigError::InvalidHost(_))));
    }

    #[test]
    fn unparsable_variable_reports_its_name() {
        env::set_var("CREDIT_ML_TEST_ONLY_SEED", "forty-two");
        let err = parse_var::<u64>("CREDIT_ML_TEST_ONLY_SEED", "u64", 1).unwrap_err();
        env::remove_var("CREDIT_ML_TEST_ONLY_SEED");
        assert!(err.to_string().contains("CREDIT_ML_TEST_ONLY_SEED"));
    }
}
