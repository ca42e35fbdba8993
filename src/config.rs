//! Configuration management for Tollgate.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `TOLLGATE_*` environment variables (`__` separates nested keys).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, TollgateError};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON formatted log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis URL for the primary store. Without it the primary store is in-process.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Latency bound for a single backend call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Seconds to wait after a failover before probing the primary store again
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Multiplier applied to `max_attempts` while serving from the secondary store
    #[serde(default = "default_relaxation_factor")]
    pub relaxation_factor: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            timeout_ms: default_timeout_ms(),
            health_check_interval_secs: default_health_check_interval(),
            relaxation_factor: default_relaxation_factor(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    100
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_relaxation_factor() -> u32 {
    2
}

/// What to do with a request when no throttling decision can be made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit the request
    #[default]
    Open,
    /// Reject the request as unavailable
    Closed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Glob patterns of route names considered sensitive
    #[serde(default = "default_protected_routes")]
    pub protected_routes: Vec<String>,

    /// Rule settings per classification label
    #[serde(default = "default_endpoint_types")]
    pub endpoint_types: HashMap<String, RuleSettings>,

    /// Rule used whenever a label has no usable settings
    #[serde(default = "default_rule_settings")]
    pub default: RuleSettings,

    /// Log the SHA-256 of rate limit keys instead of the raw key
    #[serde(default = "default_hash_key")]
    pub hash_key: bool,

    /// Store calls at or above this latency are logged as warnings
    #[serde(default = "default_slow_latency_ms")]
    pub slow_latency_ms: f64,

    /// Policy applied when every store fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            protected_routes: default_protected_routes(),
            endpoint_types: default_endpoint_types(),
            default: default_rule_settings(),
            hash_key: default_hash_key(),
            slow_latency_ms: default_slow_latency_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_protected_routes() -> Vec<String> {
    ["login", "register", "password.*", "admin.*", "payment.*"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_endpoint_types() -> HashMap<String, RuleSettings> {
    HashMap::from([
        ("public_unauthenticated".to_string(), RuleSettings::new(60, 1)),
        ("protected_unauthenticated".to_string(), RuleSettings::new(5, 10)),
        ("public_authenticated".to_string(), RuleSettings::new(120, 1)),
        ("protected_authenticated".to_string(), RuleSettings::new(30, 1)),
    ])
}

fn default_rule_settings() -> RuleSettings {
    RuleSettings::new(30, 1)
}

fn default_hash_key() -> bool {
    true
}

fn default_slow_latency_ms() -> f64 {
    10.0
}

/// Raw rule settings as they appear in configuration.
///
/// Both fields are optional so that a partially configured label can be
/// detected and replaced by the default rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSettings {
    #[serde(default)]
    pub max_attempts: Option<ConfigNumber>,
    #[serde(default)]
    pub decay_minutes: Option<ConfigNumber>,
}

impl RuleSettings {
    /// Settings with both fields present.
    pub fn new(max_attempts: i64, decay_minutes: i64) -> Self {
        Self {
            max_attempts: Some(ConfigNumber::Int(max_attempts)),
            decay_minutes: Some(ConfigNumber::Int(decay_minutes)),
        }
    }
}

/// A numeric setting that may have been written as a number or a string.
///
/// Environment overrides always arrive as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConfigNumber {
    /// Coerce to an integer. Floats truncate toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigNumber::Int(n) => Some(*n),
            ConfigNumber::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            ConfigNumber::Float(_) => None,
            ConfigNumber::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            }
        }
    }
}

impl TollgateConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with(path, environment())
    }

    /// Built-in defaults, then the file, then `env`. Later layers override
    /// individual fields, not whole sections.
    fn load_with(path: Option<&str>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&TollgateConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::with_name(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        let settings = builder.add_source(env).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TollgateError::Config(e.to_string()))
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{EndpointType, RateLimitConfigManager};

    #[test]
    fn test_defaults() {
        let config = TollgateConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.store.redis_url.is_none());
        assert_eq!(config.store.health_check_interval_secs, 30);
        assert_eq!(config.store.relaxation_factor, 2);
        assert_eq!(config.rate_limiting.endpoint_types.len(), 4);
        assert_eq!(config.rate_limiting.default, RuleSettings::new(30, 1));
        assert_eq!(config.rate_limiting.failure_policy, FailurePolicy::Open);
        assert!(config.rate_limiting.hash_key);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = TollgateConfig::from_yaml("{}").unwrap();
        assert_eq!(config.rate_limiting.protected_routes.len(), 5);
        assert_eq!(config.store.timeout_ms, 100);
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
logging:
  level: debug
  json: true
store:
  redis_url: redis://127.0.0.1:6379
  timeout_ms: 25
rate_limiting:
  protected_routes: ["admin.*"]
  endpoint_types:
    public_unauthenticated:
      max_attempts: "50"
      decay_minutes: 2
  default:
    max_attempts: 10
    decay_minutes: 1
  hash_key: false
  failure_policy: closed
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();
        assert!(config.logging.json);
        assert_eq!(config.store.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.store.timeout_ms, 25);
        assert_eq!(config.rate_limiting.protected_routes, vec!["admin.*"]);
        assert_eq!(config.rate_limiting.failure_policy, FailurePolicy::Closed);

        let public = &config.rate_limiting.endpoint_types["public_unauthenticated"];
        assert_eq!(public.max_attempts, Some(ConfigNumber::Text("50".to_string())));
        assert_eq!(public.decay_minutes, Some(ConfigNumber::Int(2)));
    }

    #[test]
    fn test_partial_rule_settings() {
        let yaml = r#"
rate_limiting:
  endpoint_types:
    public_unauthenticated:
      decay_minutes: 1
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();
        let public = &config.rate_limiting.endpoint_types["public_unauthenticated"];
        assert!(public.max_attempts.is_none());
    }

    #[test]
    fn test_config_number_coercion() {
        assert_eq!(ConfigNumber::Int(7).as_i64(), Some(7));
        assert_eq!(ConfigNumber::Float(2.9).as_i64(), Some(2));
        assert_eq!(ConfigNumber::Text(" 42 ".to_string()).as_i64(), Some(42));
        assert_eq!(ConfigNumber::Text("3.5".to_string()).as_i64(), Some(3));
        assert_eq!(ConfigNumber::Text("many".to_string()).as_i64(), None);
        assert_eq!(ConfigNumber::Float(f64::NAN).as_i64(), None);
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        environment().source(Some(vars))
    }

    #[test]
    fn test_env_overrides_single_default_field() {
        let config = TollgateConfig::load_with(
            None,
            env(&[("TOLLGATE_RATE_LIMITING__DEFAULT__MAX_ATTEMPTS", "50")]),
        )
        .unwrap();

        let rules = RateLimitConfigManager::new(config.rate_limiting);
        let default = rules.get_default_rule();
        assert_eq!(default.max_attempts(), 50);
        assert_eq!(default.decay_minutes(), 1);
    }

    #[test]
    fn test_env_override_keeps_other_endpoint_types() {
        let config = TollgateConfig::load_with(
            None,
            env(&[(
                "TOLLGATE_RATE_LIMITING__ENDPOINT_TYPES__PUBLIC_UNAUTHENTICATED__MAX_ATTEMPTS",
                "90",
            )]),
        )
        .unwrap();

        let rules = RateLimitConfigManager::new(config.rate_limiting).get_all_rules();
        let public = &rules[&EndpointType::PublicUnauthenticated];
        assert_eq!((public.max_attempts(), public.decay_minutes()), (90, 1));
        let login = &rules[&EndpointType::ProtectedUnauthenticated];
        assert_eq!((login.max_attempts(), login.decay_minutes()), (5, 10));
        assert_eq!(rules[&EndpointType::PublicAuthenticated].max_attempts(), 120);
    }

    #[test]
    fn test_file_layer_merges_onto_defaults() {
        let path = std::env::temp_dir().join(format!("tollgate-{}.yaml", uuid::Uuid::new_v4().simple()));
        std::fs::write(
            &path,
            "store:\n  timeout_ms: 25\nrate_limiting:\n  default:\n    max_attempts: 10\n",
        )
        .unwrap();

        let config = TollgateConfig::load_with(path.to_str(), env(&[("TOLLGATE_STORE__TIMEOUT_MS", "40")]));
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();

        assert_eq!(config.store.timeout_ms, 40);
        assert_eq!(config.store.health_check_interval_secs, 30);
        assert_eq!(config.rate_limiting.protected_routes.len(), 5);
        let default = RateLimitConfigManager::new(config.rate_limiting).get_default_rule();
        assert_eq!((default.max_attempts(), default.decay_minutes()), (10, 1));
    }

    #[test]
    fn test_load_without_file() {
        let config = TollgateConfig::load(None).unwrap();
        assert_eq!(config.rate_limiting.default, RuleSettings::new(30, 1));
    }
}
