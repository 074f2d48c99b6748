//! Process configuration, loaded from environment variables.
//!
//! Keys follow the `PREFIX_SPLIT_WORDS` convention (`API_ADDRESS`,
//! `DB_URI`, `PDP_SKIP_POLICY_CHECK`, ...). Loading is lenient: a missing or
//! unparsable value logs a warning and falls back to the default, so a
//! service never fails to boot over configuration alone.

use crate::calculator::DEFAULT_CARBON_FACTOR;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Listen address for the service's HTTP listener.
    pub address: String,
    /// Maximum allowed look-back for historical queries, in days.
    pub max_time_period_days: i64,
    /// HS256 secret for subject binding. The default is insecure and logs a
    /// warning; set `API_JWT_SECRET` outside development.
    pub jwt_secret: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".into(),
            max_time_period_days: 730,
            jwt_secret: "dev-secret".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub uri: String,
    pub name: String,
    /// Use the in-memory store instead of Postgres. Dev/test only.
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/efn".into(),
            name: "efn".into(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: String,
    /// `production` selects JSON output; anything else is plain text.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "production".into(),
        }
    }
}

/// Policy decision point.
#[derive(Debug, Clone, PartialEq)]
pub struct PdpConfig {
    pub address: String,
    /// If true, bypass authorization and allow all access. DEV ONLY.
    pub skip_policy_check: bool,
}

impl Default for PdpConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:3593".into(),
            skip_policy_check: false,
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpConfig {
    /// If true, skip TLS certificate verification for internal-cluster
    /// sinks. Never applies to the external-trust client.
    pub insecure_skip_verify: bool,
}

/// Event bus emission target.
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    /// Broker ingress URL events are POSTed to.
    pub address: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:8081".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub pdp: PdpConfig,
    pub http: HttpConfig,
    pub bus: BusConfig,
    pub carbon_factor: CarbonFactor,
}

/// Carbon conversion factor (tCO2e per kWh). Must be positive; invalid
/// values fall back to the default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbonFactor(pub f64);

impl Default for CarbonFactor {
    fn default() -> Self {
        Self(DEFAULT_CARBON_FACTOR)
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api: ApiConfig {
                address: var_or("API_ADDRESS", defaults.api.address),
                max_time_period_days: parsed_or("API_MAX_TIME_PERIOD_DAYS", defaults.api.max_time_period_days),
                jwt_secret: match std::env::var("API_JWT_SECRET") {
                    Ok(s) if !s.is_empty() => s,
                    _ => {
                        tracing::warn!("API_JWT_SECRET not set; using insecure dev default");
                        defaults.api.jwt_secret
                    }
                },
            },
            database: DatabaseConfig {
                uri: var_or("DB_URI", defaults.database.uri),
                name: var_or("DB_NAME", defaults.database.name),
                in_memory: bool_or("DB_IN_MEMORY", defaults.database.in_memory),
            },
            log: LogConfig {
                level: var_or("LOG_LEVEL", defaults.log.level),
                format: var_or("LOG_FORMAT", defaults.log.format),
            },
            pdp: PdpConfig {
                address: var_or("PDP_ADDRESS", defaults.pdp.address),
                skip_policy_check: bool_or("PDP_SKIP_POLICY_CHECK", defaults.pdp.skip_policy_check),
            },
            http: HttpConfig {
                insecure_skip_verify: bool_or("HTTP_INSECURE_SKIP_VERIFY", defaults.http.insecure_skip_verify),
            },
            bus: BusConfig {
                address: var_or("BUS_ADDRESS", defaults.bus.address),
            },
            carbon_factor: carbon_factor_from_env(),
        }
    }
}

fn carbon_factor_from_env() -> CarbonFactor {
    match std::env::var("CARBON_FACTOR_TCO2E_PER_KWH") {
        Ok(raw) => match raw.parse::<f64>() {
            Ok(f) if f > 0.0 => CarbonFactor(f),
            _ => {
                tracing::warn!(value = %raw, "invalid CARBON_FACTOR_TCO2E_PER_KWH; using default");
                CarbonFactor::default()
            }
        },
        Err(_) => CarbonFactor::default(),
    }
}

fn var_or(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default,
    }
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparsable config value; using default");
            default
        }),
        Err(_) => default,
    }
}

fn bool_or(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => {
            let v = v.to_lowercase();
            v == "true" || v == "1"
        }
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.api.address, "0.0.0.0:8080");
        assert_eq!(config.api.max_time_period_days, 730);
        assert_eq!(config.database.name, "efn");
        assert!(!config.database.in_memory);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.pdp.address, "http://localhost:3593");
        assert!(!config.pdp.skip_policy_check);
        assert!(!config.http.insecure_skip_verify);
        assert_eq!(config.carbon_factor.0, DEFAULT_CARBON_FACTOR);
    }
}
