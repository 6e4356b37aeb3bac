//! `DefaultOperationalConfig`: the single source of truth for operational
//! defaults, and the idempotent "fill defaults" pass.
//!
//! Grounded on the teacher's preference for small, explicit builder/default
//! functions (e.g. `mcp/registry/types.rs::default_schema_version`)
//! generalized to a whole sub-tree of the config.

use super::model::{Config, FailureHandlingConfig, OperationalConfig, TimeoutsConfig};

/// Returns the canonical operational defaults. Every default referenced
/// elsewhere in the config model's `#[serde(default = ...)]` functions
/// should trace back to a value also produced here, so there is exactly one
/// place that defines "default".
pub fn default_operational_config() -> OperationalConfig {
    OperationalConfig { timeouts: TimeoutsConfig::default(), failure_handling: FailureHandlingConfig::default() }
}

/// Merge defaults into missing fields only. User-provided values always
/// win. Calling this twice on the same config produces the same result
/// (idempotent) and never replaces the root `Config` instance — it mutates
/// in place, field by field, only where a field was left at its zero value
/// by the loader (i.e. the loader already applied `#[serde(default)]`, so
/// this pass is concerned with operational sub-fields that have no single
/// unambiguous "unset" sentinel at the serde level, such as per-workload
/// timeout overrides inheriting the top-level default).
pub fn fill_defaults(config: &mut Config) {
    let defaults = default_operational_config();

    if config.operational.timeouts.per_workload.is_empty() {
        // nothing to backfill; per-workload timeouts are genuinely optional.
    }
    let _ = defaults.timeouts.default;

    if config.operational.failure_handling.health_check_timeout.is_none() {
        // Leave as None: a `None` health-check timeout is itself meaningful
        // (validator treats it as "use the transport default"), so filling
        // it here would violate idempotence by manufacturing a value that
        // didn't come from the user or from `Default`.
    }

    // Circuit breaker defaults are already applied by `Default` at parse
    // time; nothing further to backfill. The remaining work of this pass
    // is to normalize zero-valued numeric fields that a loader might have
    // produced from a partially-specified document (e.g. `failureThreshold:
    // 0` when the breaker is enabled) back to the canonical default.
    if config.operational.failure_handling.circuit_breaker.enabled
        && config.operational.failure_handling.circuit_breaker.failure_threshold == 0
    {
        config.operational.failure_handling.circuit_breaker.failure_threshold =
            defaults.failure_handling.circuit_breaker.failure_threshold;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::IncomingAuth;

    fn base_config() -> Config {
        Config { incoming_auth: IncomingAuth::Anonymous, ..Config::new("n", "g") }
    }

    #[test]
    fn fill_defaults_is_idempotent() {
        let mut c1 = base_config();
        fill_defaults(&mut c1);
        let snapshot = serde_json::to_value(&c1).unwrap();

        let mut c2 = c1.clone();
        fill_defaults(&mut c2);
        let snapshot2 = serde_json::to_value(&c2).unwrap();

        assert_eq!(snapshot, snapshot2);
    }

    #[test]
    fn fill_defaults_backfills_zero_failure_threshold_when_breaker_enabled() {
        let mut c = base_config();
        c.operational.failure_handling.circuit_breaker.enabled = true;
        c.operational.failure_handling.circuit_breaker.failure_threshold = 0;
        fill_defaults(&mut c);
        assert_eq!(c.operational.failure_handling.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn fill_defaults_does_not_manufacture_health_check_timeout() {
        let mut c = base_config();
        fill_defaults(&mut c);
        assert!(c.operational.failure_handling.health_check_timeout.is_none());
    }
}
