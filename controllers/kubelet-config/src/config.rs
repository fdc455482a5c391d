//! Controller configuration.
//!
//! Read once from environment variables at startup. Every value has a
//! default; a value that is present but unparsable is a startup error.

use crate::error::ControllerError;
use kubelet_render::{Platform, TemplateContext};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_CLUSTER_DNS_IP: &str = "172.30.0.10";
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_CONFLICT_RETRY_LIMIT: u32 = 5;
pub const DEFAULT_CONFLICT_RETRY_DELAY_MS: u64 = 200;
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub platform: Platform,
    pub cluster_dns_ip: String,
    /// Reconciliation workers; each pool is pinned to one of them
    pub worker_count: usize,
    /// Attempts per reconciliation before giving up on store conflicts
    pub conflict_retry_limit: u32,
    /// Base delay of the backoff between conflict retries
    pub conflict_retry_delay: Duration,
    pub metrics_addr: SocketAddr,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            platform: Platform::None,
            cluster_dns_ip: DEFAULT_CLUSTER_DNS_IP.to_string(),
            worker_count: DEFAULT_WORKER_COUNT,
            conflict_retry_limit: DEFAULT_CONFLICT_RETRY_LIMIT,
            conflict_retry_delay: Duration::from_millis(DEFAULT_CONFLICT_RETRY_DELAY_MS),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();

        let platform = lookup("PLATFORM")
            .map(|p| Platform::parse(p.trim()))
            .unwrap_or(defaults.platform);
        let cluster_dns_ip = lookup("CLUSTER_DNS_IP")
            .map(|ip| ip.trim().to_string())
            .unwrap_or(defaults.cluster_dns_ip);

        let worker_count = parse_var(&lookup, "WORKER_COUNT", defaults.worker_count)?;
        if worker_count == 0 {
            return Err(ControllerError::InvalidConfig("WORKER_COUNT must be greater than 0".to_string()));
        }

        let conflict_retry_limit = parse_var(&lookup, "CONFLICT_RETRY_LIMIT", defaults.conflict_retry_limit)?;
        if conflict_retry_limit == 0 {
            return Err(ControllerError::InvalidConfig("CONFLICT_RETRY_LIMIT must be greater than 0".to_string()));
        }

        let delay_ms = parse_var(&lookup, "CONFLICT_RETRY_DELAY_MS", DEFAULT_CONFLICT_RETRY_DELAY_MS)?;
        let metrics_addr = parse_var(&lookup, "METRICS_ADDR", defaults.metrics_addr)?;

        Ok(Self {
            platform,
            cluster_dns_ip,
            worker_count,
            conflict_retry_limit,
            conflict_retry_delay: Duration::from_millis(delay_ms),
            metrics_addr,
        })
    }

    pub fn template_context(&self) -> TemplateContext {
        TemplateContext::new(self.platform.clone(), self.cluster_dns_ip.clone())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", key, raw, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.metrics_addr.to_string(), DEFAULT_METRICS_ADDR);
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("PLATFORM", "AWS"),
            ("CLUSTER_DNS_IP", "10.96.0.10"),
            ("WORKER_COUNT", "8"),
            ("CONFLICT_RETRY_LIMIT", "3"),
            ("CONFLICT_RETRY_DELAY_MS", "0"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
        ]))
        .unwrap();

        assert_eq!(config.platform, Platform::Aws);
        assert_eq!(config.cluster_dns_ip, "10.96.0.10");
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.conflict_retry_limit, 3);
        assert_eq!(config.conflict_retry_delay, Duration::ZERO);
        assert_eq!(config.metrics_addr.port(), 9090);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ControllerConfig::from_lookup(lookup(&[("WORKER_COUNT", "0")])).is_err());
        assert!(ControllerConfig::from_lookup(lookup(&[("WORKER_COUNT", "many")])).is_err());
        assert!(ControllerConfig::from_lookup(lookup(&[("CONFLICT_RETRY_LIMIT", "0")])).is_err());
        assert!(ControllerConfig::from_lookup(lookup(&[("METRICS_ADDR", "localhost")])).is_err());
    }

    #[test]
    fn test_unknown_platform_is_kept() {
        let config = ControllerConfig::from_lookup(lookup(&[("PLATFORM", "Nutanix")])).unwrap();
        assert_eq!(config.platform, Platform::Unrecognized("Nutanix".to_string()));
    }
}
