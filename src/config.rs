use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("both SLOTD_TLS_CERT and SLOTD_TLS_KEY must be set, or neither")]
    HalfTls,
    #[error("{0} must be positive")]
    Zero(&'static str),
}

/// Process settings, read once at startup from `SLOTD_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub sweep_interval: Duration,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tls_cert = lookup("SLOTD_TLS_CERT");
        let tls_key = lookup("SLOTD_TLS_KEY");
        if tls_cert.is_some() != tls_key.is_some() {
            return Err(ConfigError::HalfTls);
        }

        let max_connections = parsed(&lookup, "SLOTD_MAX_CONNECTIONS", 256)?;
        if max_connections == 0 {
            return Err(ConfigError::Zero("SLOTD_MAX_CONNECTIONS"));
        }
        let sweep_secs: u64 = parsed(&lookup, "SLOTD_SWEEP_INTERVAL_SECS", 60)?;
        if sweep_secs == 0 {
            return Err(ConfigError::Zero("SLOTD_SWEEP_INTERVAL_SECS"));
        }

        Ok(Self {
            bind: lookup("SLOTD_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "SLOTD_PORT", 5433)?,
            data_dir: PathBuf::from(lookup("SLOTD_DATA_DIR").unwrap_or_else(|| "./data".into())),
            password: lookup("SLOTD_PASSWORD").unwrap_or_else(|| "slotd".into()),
            max_connections,
            compact_threshold: parsed(&lookup, "SLOTD_COMPACT_THRESHOLD", 1000)?,
            sweep_interval: Duration::from_secs(sweep_secs),
            metrics_port: lookup("SLOTD_METRICS_PORT")
                .map(|v| parse_value("SLOTD_METRICS_PORT", v))
                .transpose()?,
            tls_cert,
            tls_key,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => parse_value(var, value),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.addr(), "0.0.0.0:5433");
        assert_eq!(c.data_dir, PathBuf::from("./data"));
        assert_eq!(c.password, "slotd");
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.compact_threshold, 1000);
        assert_eq!(c.sweep_interval, Duration::from_secs(60));
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.tls_cert, None);
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("SLOTD_BIND", "127.0.0.1"),
            ("SLOTD_PORT", "6543"),
            ("SLOTD_SWEEP_INTERVAL_SECS", "5"),
            ("SLOTD_METRICS_PORT", "9100"),
        ])
        .unwrap();
        assert_eq!(c.addr(), "127.0.0.1:6543");
        assert_eq!(c.sweep_interval, Duration::from_secs(5));
        assert_eq!(c.metrics_port, Some(9100));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = config(&[("SLOTD_PORT", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SLOTD_PORT", .. }));
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn zero_limits_rejected() {
        assert!(matches!(
            config(&[("SLOTD_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::Zero("SLOTD_MAX_CONNECTIONS"))
        ));
    }

    #[test]
    fn tls_needs_both_halves() {
        assert!(matches!(
            config(&[("SLOTD_TLS_CERT", "cert.pem")]),
            Err(ConfigError::HalfTls)
        ));
        let c = config(&[("SLOTD_TLS_CERT", "cert.pem"), ("SLOTD_TLS_KEY", "key.pem")]).unwrap();
        assert_eq!(c.tls_key.as_deref(), Some("key.pem"));
    }
}
