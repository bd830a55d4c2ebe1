//! Controller configuration.
//!
//! Settings are read from environment variables once at startup. Every
//! variable is optional; unparseable values are rejected rather than
//! silently replaced by defaults.

use crate::error::ControllerError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Namespace the hardware plugin watches for NodeAllocationRequests
pub const DEFAULT_HARDWARE_NAMESPACE: &str = "hardware-manager";

/// The three requeue intervals a reconciliation can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueIntervals {
    /// Quick retry, used for transient collaborator errors
    pub short: Duration,
    /// Waiting for hardware, or for an externally fixable resource problem
    pub medium: Duration,
    /// Waiting for cluster installation or policy convergence
    pub long: Duration,
}

impl Default for RequeueIntervals {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(15),
            medium: Duration::from_secs(60),
            long: Duration::from_secs(300),
        }
    }
}

/// Runtime settings of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Restricts ClusterTemplate lookups to one namespace (all namespaces when unset)
    pub watch_namespace: Option<String>,
    /// Namespace NodeAllocationRequests are created in
    pub hardware_namespace: String,
    pub requeue: RequeueIntervals,
    /// Maximum concurrent reconciliations
    pub concurrency: u16,
    /// Quiet period after the last watch event before reconciling
    pub debounce: Duration,
    /// Dry-run the rendered ClusterInstance before any side effects
    pub dry_run_validation: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            hardware_namespace: DEFAULT_HARDWARE_NAMESPACE.to_string(),
            requeue: RequeueIntervals::default(),
            concurrency: 3,
            debounce: Duration::from_secs(5),
            dry_run_validation: true,
        }
    }
}

impl ControllerSettings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let seconds = |key: &str, default: Duration| -> Result<Duration, ControllerError> {
            Ok(parse_var::<u64>(&lookup, key)?.map(Duration::from_secs).unwrap_or(default))
        };

        let requeue = RequeueIntervals {
            short: seconds("REQUEUE_SHORT_SECONDS", defaults.requeue.short)?,
            medium: seconds("REQUEUE_MEDIUM_SECONDS", defaults.requeue.medium)?,
            long: seconds("REQUEUE_LONG_SECONDS", defaults.requeue.long)?,
        };
        if requeue.short.is_zero() || requeue.short > requeue.medium || requeue.medium > requeue.long {
            return Err(ControllerError::InvalidConfig(format!(
                "requeue intervals must satisfy 0 < short <= medium <= long (got {:?}, {:?}, {:?})",
                requeue.short, requeue.medium, requeue.long
            )));
        }

        let concurrency = parse_var::<u16>(&lookup, "RECONCILE_CONCURRENCY")?.unwrap_or(defaults.concurrency);
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            hardware_namespace: lookup("HWMGR_NAMESPACE")
                .filter(|ns| !ns.is_empty())
                .unwrap_or(defaults.hardware_namespace),
            requeue,
            concurrency,
            debounce: seconds("RECONCILE_DEBOUNCE_SECONDS", defaults.debounce)?,
            dry_run_validation: parse_var::<bool>(&lookup, "DRY_RUN_VALIDATION")?
                .unwrap_or(defaults.dry_run_validation),
        })
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ControllerError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ControllerError::InvalidConfig(format!("{key} has an invalid value: {raw:?}"))
        }),
    }
}
