use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::MetricPath;
use crate::actors::gateway::GatewayConfig;
use crate::actors::publisher::PublisherConfig;
use crate::alerts::{AlertRule, Severity};
use crate::util::{MONITOR_ADDR, MONITOR_PORT, parse_var};

const METRICS_INTERVAL: &str = "METRICS_INTERVAL";
const ALERT_THRESHOLD_CPU: &str = "ALERT_THRESHOLD_CPU";
const ALERT_THRESHOLD_MEMORY: &str = "ALERT_THRESHOLD_MEMORY";
const ALERT_THRESHOLD_DISK: &str = "ALERT_THRESHOLD_DISK";

/// Ten years, far beyond anything a ring buffer keeps
const MAX_RETENTION_HOURS: u64 = 10 * 365 * 24;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Sampling period in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Consecutive sampling failures before the source counts as degraded
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Per-subscriber queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Filesystem whose usage is reported
    #[serde(default = "default_disk_mount")]
    pub disk_mount: PathBuf,

    #[serde(default = "default_rules")]
    pub rules: Vec<AlertRule>,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub api: ApiSettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Alerts replayed to a new dashboard connection
    pub catchup_alerts: usize,

    /// Alerts kept in memory for catch-up and queries
    pub recent_alerts: usize,

    /// Write timeout per event in milliseconds
    pub send_timeout_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        let defaults = GatewayConfig::default();
        Self {
            catchup_alerts: defaults.catchup_alerts,
            recent_alerts: defaults.recent_alerts,
            send_timeout_ms: defaults.send_timeout.as_millis() as u64,
        }
    }
}

/// In-memory storage limits
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Records kept per kind
    pub capacity: usize,

    /// Records older than this are dropped
    pub retention_hours: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            capacity: 1000,
            retention_hours: 24,
        }
    }
}

impl StorageSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(60 * 60))
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "crate::util::get_default_addr")]
    pub addr: IpAddr,

    #[serde(default = "crate::util::get_default_port")]
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            addr: crate::util::get_default_addr(),
            port: crate::util::get_default_port(),
        }
    }
}

fn default_interval() -> u64 {
    5
}

fn default_failure_threshold() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    crate::broker::DEFAULT_QUEUE_CAPACITY
}

fn default_disk_mount() -> PathBuf {
    PathBuf::from("/")
}

/// Rules used when the configuration names none
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(MetricPath::CpuPercent, 80.0, Severity::Warning),
        AlertRule::new(MetricPath::MemoryPercent, 80.0, Severity::Warning),
        AlertRule::new(MetricPath::DiskPercent, 90.0, Severity::Critical),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            failure_threshold: default_failure_threshold(),
            queue_capacity: default_queue_capacity(),
            disk_mount: default_disk_mount(),
            rules: default_rules(),
            gateway: GatewaySettings::default(),
            storage: StorageSettings::default(),
            api: ApiSettings::default(),
        }
    }
}

impl Config {
    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(interval) = parse_var(&lookup, METRICS_INTERVAL) {
            self.interval = interval;
        }

        for (name, metric) in [
            (ALERT_THRESHOLD_CPU, MetricPath::CpuPercent),
            (ALERT_THRESHOLD_MEMORY, MetricPath::MemoryPercent),
            (ALERT_THRESHOLD_DISK, MetricPath::DiskPercent),
        ] {
            let Some(threshold) = parse_var::<f64>(&lookup, name) else {
                continue;
            };
            for rule in self.rules.iter_mut().filter(|rule| rule.metric == metric) {
                rule.threshold = threshold;
            }
        }

        if let Some(addr) = parse_var(&lookup, MONITOR_ADDR) {
            self.api.addr = addr;
        }
        if let Some(port) = parse_var(&lookup, MONITOR_PORT) {
            self.api.port = port;
        }

        trace!("config after overrides: {self:?}");
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval == 0 {
            bail!("interval must be at least one second");
        }
        if self.failure_threshold == 0 {
            bail!("failure_threshold must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if self.storage.capacity == 0 {
            bail!("storage capacity must be at least 1");
        }
        if self.storage.retention_hours > MAX_RETENTION_HOURS {
            bail!("storage retention_hours must be at most {MAX_RETENTION_HOURS}");
        }
        if self.gateway.send_timeout_ms == 0 {
            bail!("gateway send_timeout_ms must be at least 1");
        }
        if let Some(rule) = self.rules.iter().find(|rule| !rule.threshold.is_finite()) {
            bail!("threshold of rule on {} is not a finite number", rule.metric);
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| !(rule.cooldown_secs.is_finite() && rule.cooldown_secs >= 0.0))
        {
            bail!("cooldown of rule on {} must be a non-negative number", rule.metric);
        }
        Ok(())
    }

    pub fn publisher(&self) -> PublisherConfig {
        PublisherConfig {
            interval: Duration::from_secs(self.interval),
            failure_threshold: self.failure_threshold,
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            catchup_alerts: self.gateway.catchup_alerts,
            recent_alerts: self.gateway.recent_alerts.max(self.gateway.catchup_alerts),
            send_timeout: Duration::from_millis(self.gateway.send_timeout_ms),
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided! ({e})"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
