use std::net::SocketAddr;
use tracing::Level;
use uuid::Uuid;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Token endpoint of the message bus; a fresh client access URL is
    /// fetched from here on every connect attempt.
    pub negotiate_url: String,
    pub hub: String,
    /// Public URL of this service; seeds the bootstrap destination.
    pub service_url: String,
    pub app_id: String,
    pub app_password: Option<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3978".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let negotiate_url = std::env::var("BUS_NEGOTIATE_URL")
            .map_err(|_| ConfigError::MissingVar("BUS_NEGOTIATE_URL".to_string()))?;

        let hub = std::env::var("BUS_HUB").unwrap_or_else(|_| "Hub".to_string());

        let service_url =
            std::env::var("SERVICE_URL").unwrap_or_else(|_| "http://localhost:3978".to_string());

        // A generated identity keeps local development working without a
        // registered channel application.
        let app_id = std::env::var("APP_ID")
            .ok()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let app_password = std::env::var("APP_PASSWORD").ok().filter(|p| !p.is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            negotiate_url,
            hub,
            service_url,
            app_id,
            app_password,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("BUS_NEGOTIATE_URL");
            env::remove_var("BUS_HUB");
            env::remove_var("SERVICE_URL");
            env::remove_var("APP_ID");
            env::remove_var("APP_PASSWORD");
            env::remove_var("RUST_LOG");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("BUS_NEGOTIATE_URL", "http://localhost:8080/negotiate");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3978");
        assert_eq!(config.negotiate_url, "http://localhost:8080/negotiate");
        assert_eq!(config.hub, "Hub");
        assert_eq!(config.service_url, "http://localhost:3978");
        assert!(!config.app_id.is_empty());
        assert_eq!(config.app_password, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("BUS_NEGOTIATE_URL", "https://bus.example/negotiate");
            env::set_var("BUS_HUB", "TravelHub");
            env::set_var("SERVICE_URL", "https://bot.example");
            env::set_var("APP_ID", "app-123");
            env::set_var("APP_PASSWORD", "secret");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.negotiate_url, "https://bus.example/negotiate");
        assert_eq!(config.hub, "TravelHub");
        assert_eq!(config.service_url, "https://bot.example");
        assert_eq!(config.app_id, "app-123");
        assert_eq!(config.app_password, Some("secret".to_string()));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_negotiate_url() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "BUS_NEGOTIATE_URL"),
            _ => panic!("Expected MissingVar for BUS_NEGOTIATE_URL"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
            env::set_var("BUS_NEGOTIATE_URL", "http://localhost:8080/negotiate");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("BUS_NEGOTIATE_URL", "http://localhost:8080/negotiate");
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_generated_app_id_when_unset() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("APP_ID", "");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert!(Uuid::parse_str(&config.app_id).is_ok());
    }
}
