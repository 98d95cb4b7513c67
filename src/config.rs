/// Runtime configuration read from the environment.
///
/// | Variable                 | Default                 |
/// |--------------------------|-------------------------|
/// | `HOST`                   | `127.0.0.1`             |
/// | `PORT`                   | `8080`                  |
/// | `OPTIMIZER_URL`          | `http://127.0.0.1:5000` |
/// | `STATE_DIR`              | `./state`               |
/// | `OPTIMIZER_TIMEOUT_SECS` | `90`                    |
///
/// Unparseable values fall back to the default with a warning.

use crate::optimizer::DEFAULT_TIMEOUT_SECS;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_OPTIMIZER_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_STATE_DIR: &str = "./state";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub optimizer_url: String,
    pub state_dir: PathBuf,
    pub optimizer_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            optimizer_url: DEFAULT_OPTIMIZER_URL.to_string(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            optimizer_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = AppConfig::default();
        AppConfig {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(get("PORT"), "PORT", defaults.port),
            optimizer_url: get("OPTIMIZER_URL").unwrap_or(defaults.optimizer_url),
            state_dir: get("STATE_DIR").map(PathBuf::from).unwrap_or(defaults.state_dir),
            optimizer_timeout_secs: parse_or(
                get("OPTIMIZER_TIMEOUT_SECS"),
                "OPTIMIZER_TIMEOUT_SECS",
                defaults.optimizer_timeout_secs,
            ),
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match raw {
        None => default,
        Some(text) => text.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} must be a number, got '{}'; using {}", key, text, default);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.optimizer_timeout_secs, 90);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "9000"),
            ("OPTIMIZER_URL", "http://optimizer:5000"),
            ("STATE_DIR", "/var/lib/plantable"),
            ("OPTIMIZER_TIMEOUT_SECS", "30"),
        ]);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.optimizer_url, "http://optimizer:5000");
        assert_eq!(cfg.state_dir, PathBuf::from("/var/lib/plantable"));
        assert_eq!(cfg.optimizer_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[("PORT", "eighty"), ("OPTIMIZER_TIMEOUT_SECS", "-1"), ("HOST", " ")]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.optimizer_timeout_secs, 90);
        assert_eq!(cfg.host, "127.0.0.1");
    }
}
