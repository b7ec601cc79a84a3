//! Environment-driven server configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GEOLOCATION_URL: &str = "http://ip-api.com";
const DEFAULT_GEOLOCATION_TIMEOUT_MS: u64 = 1500;
const DEFAULT_GEOLOCATION_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_GEOLOCATION_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeolocationConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_GEOLOCATION_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_GEOLOCATION_TIMEOUT_MS),
            cache_ttl: Duration::from_secs(DEFAULT_GEOLOCATION_CACHE_TTL_SECS),
            cache_capacity: DEFAULT_GEOLOCATION_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub environment: String,
    /// Set cookies with the Secure flag (public URL is https).
    pub secure_cookies: bool,
    pub geolocation: GeolocationConfig,
    pub cards_file: Option<PathBuf>,
    pub profile_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let geolocation = GeolocationConfig {
            enabled: env_parse("GEOLOCATION_ENABLED", true),
            base_url: env::var("GEOLOCATION_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEOLOCATION_URL.to_string()),
            timeout: Duration::from_millis(env_parse(
                "GEOLOCATION_TIMEOUT_MS",
                DEFAULT_GEOLOCATION_TIMEOUT_MS,
            )),
            cache_ttl: Duration::from_secs(env_parse(
                "GEOLOCATION_CACHE_TTL_SECS",
                DEFAULT_GEOLOCATION_CACHE_TTL_SECS,
            )),
            cache_capacity: env_parse(
                "GEOLOCATION_CACHE_CAPACITY",
                DEFAULT_GEOLOCATION_CACHE_CAPACITY,
            ),
        };

        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "production".to_string()),
            secure_cookies: env::var("PUBLIC_URL")
                .map(|url| url.starts_with("https://"))
                .unwrap_or(false),
            geolocation,
            cards_file: env_path("CARDS_FILE"),
            profile_file: env_path("PROFILE_FILE"),
        }
    }

    /// Development mode turns on verbose region-resolution logging.
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn env_parse<T: FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    "Invalid value {:?} for {}, using default {}",
                    raw,
                    name,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "PORT",
        "ENVIRONMENT",
        "PUBLIC_URL",
        "GEOLOCATION_ENABLED",
        "GEOLOCATION_URL",
        "GEOLOCATION_TIMEOUT_MS",
        "GEOLOCATION_CACHE_TTL_SECS",
        "GEOLOCATION_CACHE_CAPACITY",
        "CARDS_FILE",
        "PROFILE_FILE",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = AppConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, "production");
        assert!(!config.is_development());
        assert!(!config.secure_cookies);
        assert_eq!(config.geolocation, GeolocationConfig::default());
        assert_eq!(config.cards_file, None);
        assert_eq!(config.profile_file, None);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        env::set_var("PORT", "9000");
        env::set_var("ENVIRONMENT", "Development");
        env::set_var("PUBLIC_URL", "https://links.example.com");
        env::set_var("GEOLOCATION_ENABLED", "false");
        env::set_var("GEOLOCATION_URL", "http://localhost:1234/");
        env::set_var("GEOLOCATION_TIMEOUT_MS", "250");
        env::set_var("CARDS_FILE", "/srv/cards.json");

        let config = AppConfig::from_env();
        assert_eq!(config.port, 9000);
        assert!(config.is_development());
        assert!(config.secure_cookies);
        assert!(!config.geolocation.enabled);
        assert_eq!(config.geolocation.base_url, "http://localhost:1234");
        assert_eq!(config.geolocation.timeout, Duration::from_millis(250));
        assert_eq!(config.cards_file, Some(PathBuf::from("/srv/cards.json")));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back_to_defaults() {
        clear_env();
        env::set_var("PORT", "not-a-port");
        env::set_var("GEOLOCATION_CACHE_CAPACITY", "-5");
        env::set_var("GEOLOCATION_ENABLED", "maybe");

        let config = AppConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.geolocation.cache_capacity, 10_000);
        assert!(config.geolocation.enabled);

        clear_env();
    }
}
