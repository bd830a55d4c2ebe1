//! Stage timeouts.
//!
//! Budgets come from the template ConfigMaps with fixed fallbacks and are
//! loaded once per reconciliation. Timeout checks are pure functions of
//! (start, now, budget).

use crate::error::StageError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

pub const HARDWARE_PROVISIONING_TIMEOUT_KEY: &str = "hardwareProvisioningTimeout";
pub const CLUSTER_INSTALLATION_TIMEOUT_KEY: &str = "clusterInstallationTimeout";
pub const CLUSTER_CONFIGURATION_TIMEOUT_KEY: &str = "clusterConfigurationTimeout";

pub const DEFAULT_HARDWARE_PROVISIONING_TIMEOUT: Duration = Duration::from_secs(90 * 60);
pub const DEFAULT_CLUSTER_INSTALLATION_TIMEOUT: Duration = Duration::from_secs(90 * 60);
pub const DEFAULT_CLUSTER_CONFIGURATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Per-stage budgets for one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub hardware_provisioning: Duration,
    pub cluster_installation: Duration,
    pub cluster_configuration: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            hardware_provisioning: DEFAULT_HARDWARE_PROVISIONING_TIMEOUT,
            cluster_installation: DEFAULT_CLUSTER_INSTALLATION_TIMEOUT,
            cluster_configuration: DEFAULT_CLUSTER_CONFIGURATION_TIMEOUT,
        }
    }
}

/// Reads a timeout from ConfigMap data, falling back when the key is absent or blank.
pub fn timeout_from_config(data: &BTreeMap<String, String>, key: &str, fallback: Duration) -> Result<Duration, StageError> {
    match data.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(fallback),
        Some(raw) => parse_duration(raw)
            .map_err(|e| StageError::input(format!("the value of key {key} is not a valid duration string: {e}"))),
    }
}

/// Parses duration strings such as `90m`, `1h30m`, `45s` or `1.5h`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration {input:?}"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration {input:?}"))?;
        rest = &rest[number_len..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration {input:?}")),
            unit => return Err(format!("unknown unit {unit:?} in duration {input:?}")),
        };
        rest = &rest[unit_len..];
        total += value * seconds_per_unit;
    }
    Duration::try_from_secs_f64(total).map_err(|e| format!("duration {input:?} out of range: {e}"))
}

/// True once more than `budget` has elapsed since `start`
pub fn is_timed_out(start: DateTime<Utc>, now: DateTime<Utc>, budget: Duration) -> bool {
    (now - start).to_std().is_ok_and(|elapsed| elapsed > budget)
}

/// Returns the stage start time, recording `now` the first time it is asked.
pub fn start_once(slot: &mut Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    *slot.get_or_insert(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("90m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in ["", "90", "m", "1x", "1h-5m", "soon"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_timeout_from_config_falls_back() {
        let mut data = BTreeMap::new();
        assert_eq!(
            timeout_from_config(&data, CLUSTER_INSTALLATION_TIMEOUT_KEY, DEFAULT_CLUSTER_INSTALLATION_TIMEOUT).unwrap(),
            DEFAULT_CLUSTER_INSTALLATION_TIMEOUT
        );

        data.insert(CLUSTER_INSTALLATION_TIMEOUT_KEY.to_string(), "2h".to_string());
        assert_eq!(
            timeout_from_config(&data, CLUSTER_INSTALLATION_TIMEOUT_KEY, DEFAULT_CLUSTER_INSTALLATION_TIMEOUT).unwrap(),
            Duration::from_secs(7200)
        );

        data.insert(CLUSTER_INSTALLATION_TIMEOUT_KEY.to_string(), "two hours".to_string());
        let err = timeout_from_config(&data, CLUSTER_INSTALLATION_TIMEOUT_KEY, DEFAULT_CLUSTER_INSTALLATION_TIMEOUT).unwrap_err();
        assert!(err.is_input());
        assert!(err.to_string().contains(CLUSTER_INSTALLATION_TIMEOUT_KEY));
    }

    #[test]
    fn test_is_timed_out_is_strict() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let budget = Duration::from_secs(30 * 60);
        assert!(!is_timed_out(start, start + chrono::Duration::minutes(30), budget));
        assert!(is_timed_out(start, start + chrono::Duration::minutes(31), budget));
        // Clock skew never counts as elapsed time
        assert!(!is_timed_out(start, start - chrono::Duration::minutes(5), budget));
    }

    #[test]
    fn test_start_once_keeps_first_value() {
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut slot = None;
        assert_eq!(start_once(&mut slot, first), first);
        assert_eq!(start_once(&mut slot, first + chrono::Duration::minutes(10)), first);
        assert_eq!(slot, Some(first));
    }
}
