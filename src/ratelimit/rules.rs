//! Rate limit rule resolution from configuration.
//!
//! Rules are looked up by classification label and memoized. A label whose
//! settings are missing or unusable resolves to the default rule instead of
//! failing: a misconfigured limiter still throttles.

use std::collections::{BTreeMap, HashMap};

use glob::Pattern;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::classification::EndpointType;
use super::rule::RateLimitRule;
use crate::config::{RateLimitingConfig, RuleSettings};

/// Cache key for the default rule.
const DEFAULT_RULE_LABEL: &str = "default";

/// Resolves and memoizes [`RateLimitRule`]s per classification label.
pub struct RateLimitConfigManager {
    config: RateLimitingConfig,
    protected_routes: Vec<Pattern>,
    rules: RwLock<HashMap<String, RateLimitRule>>,
    default_rule: RwLock<Option<RateLimitRule>>,
}

impl RateLimitConfigManager {
    /// Create a manager over the given settings.
    ///
    /// Protected route patterns are compiled once; invalid patterns are
    /// skipped with a warning.
    pub fn new(config: RateLimitingConfig) -> Self {
        let protected_routes = config
            .protected_routes
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %raw, error = %e, "Ignoring invalid protected route pattern");
                    None
                }
            })
            .collect();

        Self {
            config,
            protected_routes,
            rules: RwLock::new(HashMap::new()),
            default_rule: RwLock::new(None),
        }
    }

    /// The settings this manager was built from.
    pub fn settings(&self) -> &RateLimitingConfig {
        &self.config
    }

    /// Get the rule for a classification label. Never fails.
    pub fn get_rule(&self, endpoint_type: &str) -> RateLimitRule {
        if let Some(rule) = self.rules.read().get(endpoint_type) {
            return rule.clone();
        }

        let Some(settings) = self.config.endpoint_types.get(endpoint_type) else {
            debug!(endpoint_type, "No rate limit configured, using default rule");
            return self.get_default_rule();
        };

        match build_rule(endpoint_type, settings) {
            Some(rule) => {
                let mut rules = self.rules.write();
                rules
                    .entry(endpoint_type.to_string())
                    .or_insert(rule)
                    .clone()
            }
            None => {
                warn!(
                    endpoint_type,
                    settings = ?settings,
                    "Unusable rate limit settings, using default rule"
                );
                self.get_default_rule()
            }
        }
    }

    /// Get the conservative rule used when a label has no usable settings.
    pub fn get_default_rule(&self) -> RateLimitRule {
        if let Some(rule) = self.default_rule.read().as_ref() {
            return rule.clone();
        }

        let rule = build_rule(DEFAULT_RULE_LABEL, &self.config.default).unwrap_or_else(|| {
            warn!(
                settings = ?self.config.default,
                "Unusable default rate limit settings, using built-in rule"
            );
            RateLimitRule::fallback()
        });

        let mut slot = self.default_rule.write();
        slot.get_or_insert(rule).clone()
    }

    /// Resolve the rule for every quadrant.
    pub fn get_all_rules(&self) -> BTreeMap<EndpointType, RateLimitRule> {
        EndpointType::ALL
            .into_iter()
            .map(|endpoint_type| (endpoint_type, self.get_rule(endpoint_type.as_str())))
            .collect()
    }

    /// Whether a route name matches any protected route pattern.
    pub fn is_protected_route(&self, route_name: &str) -> bool {
        self.protected_routes
            .iter()
            .any(|pattern| pattern.matches(route_name))
    }
}

/// Build a rule from raw settings, coercing numeric fields to integers.
fn build_rule(endpoint_type: &str, settings: &RuleSettings) -> Option<RateLimitRule> {
    let max_attempts = settings.max_attempts.as_ref()?.as_i64()?;
    let decay_minutes = settings.decay_minutes.as_ref()?.as_i64()?;

    let max_attempts = u32::try_from(max_attempts).ok()?;
    let decay_minutes = u32::try_from(decay_minutes).ok()?;

    RateLimitRule::new(endpoint_type, max_attempts, decay_minutes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigNumber;

    fn manager() -> RateLimitConfigManager {
        RateLimitConfigManager::new(RateLimitingConfig::default())
    }

    fn manager_with(endpoint_type: &str, settings: RuleSettings) -> RateLimitConfigManager {
        let mut config = RateLimitingConfig::default();
        config.endpoint_types.insert(endpoint_type.to_string(), settings);
        RateLimitConfigManager::new(config)
    }

    #[test]
    fn test_get_configured_rules() {
        let manager = manager();

        let rule = manager.get_rule("public_unauthenticated");
        assert_eq!(rule.endpoint_type(), "public_unauthenticated");
        assert_eq!(rule.max_attempts(), 60);
        assert_eq!(rule.decay_minutes(), 1);

        let rule = manager.get_rule("protected_unauthenticated");
        assert_eq!(rule.max_attempts(), 5);
        assert_eq!(rule.decay_minutes(), 10);

        assert_eq!(manager.get_rule("public_authenticated").max_attempts(), 120);
        assert_eq!(manager.get_rule("protected_authenticated").max_attempts(), 30);
    }

    #[test]
    fn test_rule_is_memoized() {
        let manager = manager();
        let first = manager.get_rule("public_authenticated");
        let second = manager.get_rule("public_authenticated");
        assert_eq!(first, second);
        assert_eq!(manager.rules.read().len(), 1);
    }

    #[test]
    fn test_unknown_type_returns_default() {
        let manager = manager();
        let rule = manager.get_rule("webhook");
        assert_eq!(rule.endpoint_type(), "default");
        assert_eq!(rule.max_attempts(), 30);
        assert_eq!(rule.decay_minutes(), 1);
    }

    #[test]
    fn test_missing_max_attempts_returns_default() {
        let manager = manager_with(
            "public_unauthenticated",
            RuleSettings {
                max_attempts: None,
                decay_minutes: Some(ConfigNumber::Int(1)),
            },
        );
        let rule = manager.get_rule("public_unauthenticated");
        assert_eq!(rule.endpoint_type(), "default");
        assert_eq!(rule.max_attempts(), 30);
    }

    #[test]
    fn test_missing_decay_minutes_returns_default() {
        let manager = manager_with(
            "public_unauthenticated",
            RuleSettings {
                max_attempts: Some(ConfigNumber::Int(60)),
                decay_minutes: None,
            },
        );
        let rule = manager.get_rule("public_unauthenticated");
        assert_eq!(rule.endpoint_type(), "default");
        assert_eq!(rule.decay_minutes(), 1);
    }

    #[test]
    fn test_string_values_are_coerced() {
        let manager = manager_with(
            "public_unauthenticated",
            RuleSettings {
                max_attempts: Some(ConfigNumber::Text("50".to_string())),
                decay_minutes: Some(ConfigNumber::Text("3".to_string())),
            },
        );
        let rule = manager.get_rule("public_unauthenticated");
        assert_eq!(rule.max_attempts(), 50);
        assert_eq!(rule.decay_minutes(), 3);
    }

    #[test]
    fn test_out_of_range_values_return_default() {
        let manager = manager_with("public_unauthenticated", RuleSettings::new(0, 1));
        assert_eq!(manager.get_rule("public_unauthenticated").endpoint_type(), "default");

        let manager = manager_with("public_unauthenticated", RuleSettings::new(-5, 1));
        assert_eq!(manager.get_rule("public_unauthenticated").endpoint_type(), "default");
    }

    #[test]
    fn test_empty_configuration_returns_default() {
        let mut config = RateLimitingConfig::default();
        config.endpoint_types.clear();
        let manager = RateLimitConfigManager::new(config);

        for endpoint_type in EndpointType::ALL {
            let rule = manager.get_rule(endpoint_type.as_str());
            assert_eq!(rule.endpoint_type(), "default");
            assert_eq!(rule.max_attempts(), 30);
        }
    }

    #[test]
    fn test_invalid_default_uses_builtin_rule() {
        let mut config = RateLimitingConfig::default();
        config.default = RuleSettings {
            max_attempts: Some(ConfigNumber::Text("lots".to_string())),
            decay_minutes: None,
        };
        let manager = RateLimitConfigManager::new(config);

        assert_eq!(manager.get_default_rule(), RateLimitRule::fallback());
    }

    #[test]
    fn test_configured_default_rule() {
        let mut config = RateLimitingConfig::default();
        config.default = RuleSettings::new(15, 2);
        let manager = RateLimitConfigManager::new(config);

        let rule = manager.get_default_rule();
        assert_eq!(rule.endpoint_type(), "default");
        assert_eq!(rule.max_attempts(), 15);
        assert_eq!(rule.decay_minutes(), 2);
    }

    #[test]
    fn test_get_all_rules() {
        let rules = manager().get_all_rules();
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[&EndpointType::PublicUnauthenticated].max_attempts(), 60);
        assert_eq!(rules[&EndpointType::ProtectedUnauthenticated].max_attempts(), 5);
        assert_eq!(rules[&EndpointType::PublicAuthenticated].max_attempts(), 120);
        assert_eq!(rules[&EndpointType::ProtectedAuthenticated].max_attempts(), 30);
    }

    #[test]
    fn test_protected_route_matching() {
        let manager = manager();
        assert!(manager.is_protected_route("login"));
        assert!(manager.is_protected_route("admin.users.index"));
        assert!(manager.is_protected_route("password.reset"));
        assert!(!manager.is_protected_route("Admin.users"));
        assert!(!manager.is_protected_route("users.index"));
        assert!(!manager.is_protected_route("login.form"));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let mut config = RateLimitingConfig::default();
        config.protected_routes = vec!["[".to_string(), "admin.*".to_string()];
        let manager = RateLimitConfigManager::new(config);

        assert_eq!(manager.protected_routes.len(), 1);
        assert!(manager.is_protected_route("admin.dashboard"));
    }
}
