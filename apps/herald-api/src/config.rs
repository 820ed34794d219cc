use core_config::server::ServerConfig;
use core_config::{app_info, env_or_default, env_required, AppInfo, FromEnv};

// Re-export Environment for use in other modules
pub use core_config::Environment;

/// Application-specific configuration
/// Composes shared config components from the `core_config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub server: ServerConfig,
    pub environment: Environment,
    /// Site identifier referenced by notification templates.
    pub site_url: String,
    /// Comma-separated CORS origin allow-list. Required in production;
    /// absent in development means a permissive CORS policy.
    pub cors_allowed_origins: Option<String>,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080

        let (site_url, cors_allowed_origins) = match environment {
            Environment::Production => (
                env_required("APP_SITE_URL")?,
                Some(env_required("CORS_ALLOWED_ORIGIN")?),
            ),
            Environment::Development => (
                env_or_default("APP_SITE_URL", "http://localhost:3000"),
                std::env::var("CORS_ALLOWED_ORIGIN").ok(),
            ),
        };

        Ok(Self {
            app: app_info!(),
            server,
            environment,
            site_url,
            cors_allowed_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_in_development() {
        temp_env::with_vars(
            [
                ("APP_ENV", None::<&str>),
                ("APP_SITE_URL", None),
                ("CORS_ALLOWED_ORIGIN", None),
                ("HOST", None),
                ("PORT", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.environment, Environment::Development);
                assert_eq!(config.site_url, "http://localhost:3000");
                assert_eq!(config.cors_allowed_origins, None);
                assert_eq!(config.server.port, 8080);
            },
        );
    }

    #[test]
    fn test_config_requires_site_url_and_cors_in_production() {
        temp_env::with_vars(
            [
                ("APP_ENV", Some("production")),
                ("APP_SITE_URL", None),
                ("CORS_ALLOWED_ORIGIN", None),
            ],
            || {
                let result = Config::from_env();
                assert!(result.is_err());
            },
        );

        temp_env::with_vars(
            [
                ("APP_ENV", Some("production")),
                ("APP_SITE_URL", Some("https://example.com")),
                ("CORS_ALLOWED_ORIGIN", Some("https://example.com")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.site_url, "https://example.com");
                assert_eq!(
                    config.cors_allowed_origins.as_deref(),
                    Some("https://example.com")
                );
            },
        );
    }
}
