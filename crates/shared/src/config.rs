//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtConfig,
    /// Posting engine policy.
    #[serde(default)]
    pub posting: PostingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900
}

/// How FX resolution behaves when no rate exists for the exact date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FxFallbackPolicy {
    /// Fail unless a rate exists on the transaction date.
    ExactOnly,
    /// Use the nearest earlier rate within `fx_fallback_max_days`.
    PriorDate,
}

/// Posting engine policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PostingConfig {
    /// FX fallback policy.
    #[serde(default = "default_fx_fallback_policy")]
    pub fx_fallback_policy: FxFallbackPolicy,
    /// Maximum number of days to scan backwards for a prior rate.
    #[serde(default = "default_fx_fallback_max_days")]
    pub fx_fallback_max_days: u32,
    /// Decimal places of base-currency amounts.
    #[serde(default = "default_base_scale")]
    pub base_scale: u32,
    /// Realized FX differences smaller than this are absorbed instead of posted.
    #[serde(
        default = "default_min_postable_fx_difference",
        with = "rust_decimal::serde::str"
    )]
    pub min_postable_fx_difference: Decimal,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            fx_fallback_policy: default_fx_fallback_policy(),
            fx_fallback_max_days: default_fx_fallback_max_days(),
            base_scale: default_base_scale(),
            min_postable_fx_difference: default_min_postable_fx_difference(),
        }
    }
}

fn default_fx_fallback_policy() -> FxFallbackPolicy {
    FxFallbackPolicy::PriorDate
}

fn default_fx_fallback_max_days() -> u32 {
    7
}

fn default_base_scale() -> u32 {
    2
}

fn default_min_postable_fx_difference() -> Decimal {
    Decimal::new(1, 2)
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("DEFTER").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_load_from_environment_with_posting_defaults() {
        temp_env::with_vars(
            [
                ("DEFTER__DATABASE__URL", Some("postgres://localhost/defter")),
                ("DEFTER__JWT__SECRET", Some("secret")),
                ("DEFTER__POSTING__FX_FALLBACK_MAX_DAYS", None::<&str>),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/defter");
                assert_eq!(config.server.port, 8080);
                assert_eq!(config.posting.fx_fallback_policy, FxFallbackPolicy::PriorDate);
                assert_eq!(config.posting.fx_fallback_max_days, 7);
                assert_eq!(config.posting.base_scale, 2);
                assert_eq!(config.posting.min_postable_fx_difference, dec!(0.01));
            },
        );
    }

    #[test]
    fn test_posting_overrides_from_environment() {
        temp_env::with_vars(
            [
                ("DEFTER__DATABASE__URL", Some("postgres://localhost/defter")),
                ("DEFTER__JWT__SECRET", Some("secret")),
                ("DEFTER__POSTING__FX_FALLBACK_POLICY", Some("exact_only")),
                ("DEFTER__POSTING__FX_FALLBACK_MAX_DAYS", Some("3")),
                ("DEFTER__POSTING__MIN_POSTABLE_FX_DIFFERENCE", Some("0.05")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.posting.fx_fallback_policy, FxFallbackPolicy::ExactOnly);
                assert_eq!(config.posting.fx_fallback_max_days, 3);
                assert_eq!(config.posting.min_postable_fx_difference, dec!(0.05));
            },
        );
    }
}
