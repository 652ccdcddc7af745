pub mod actors;
pub mod alerts;
pub mod broker;
pub mod config;
pub mod error;
pub mod monitors;
pub mod pipeline;
pub mod storage;
pub mod util;

#[cfg(feature = "api")]
pub mod api;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Point in time of a sample.
///
/// Ordering follows the monotonic component, the wall clock part is what goes
/// over the wire (RFC 3339).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    monotonic: Duration,
    wall: DateTime<Utc>,
}

impl Timestamp {
    pub fn new(monotonic: Duration, wall: DateTime<Utc>) -> Self {
        Self { monotonic, wall }
    }

    /// Timestamp `secs` seconds after the unix epoch on both clocks.
    pub fn from_secs(secs: u64) -> Self {
        let wall = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(secs as i64);
        Self {
            monotonic: Duration::from_secs(secs),
            wall,
        }
    }

    /// Timestamp for a wall clock value read back from the wire.
    pub fn from_wall(wall: DateTime<Utc>) -> Self {
        let millis = u64::try_from(wall.timestamp_millis()).unwrap_or_default();
        Self {
            monotonic: Duration::from_millis(millis),
            wall,
        }
    }

    pub fn monotonic(&self) -> Duration {
        self.monotonic
    }

    pub fn wall(&self) -> DateTime<Utc> {
        self.wall
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn since(&self, earlier: &Timestamp) -> Duration {
        self.monotonic.saturating_sub(earlier.monotonic)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wall.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.wall.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DateTime::<Utc>::deserialize(deserializer).map(Timestamp::from_wall)
    }
}

/// One point-in-time bundle of host resource metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: Timestamp,
    pub cpu: CpuInformation,
    pub memory: MemoryInformation,
    pub disk: DiskInformation,
    pub network: NetworkInformation,
    pub processes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInformation {
    pub percent: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInformation {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskInformation {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInformation {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

impl Snapshot {
    /// Read the value a metric path points at
    pub fn value(&self, path: MetricPath) -> f64 {
        match path {
            MetricPath::CpuPercent => self.cpu.percent,
            MetricPath::CpuCount => self.cpu.count as f64,
            MetricPath::MemoryPercent => self.memory.percent,
            MetricPath::MemoryUsed => self.memory.used as f64,
            MetricPath::MemoryAvailable => self.memory.available as f64,
            MetricPath::DiskPercent => self.disk.percent,
            MetricPath::DiskUsed => self.disk.used as f64,
            MetricPath::DiskFree => self.disk.free as f64,
            MetricPath::Processes => self.processes as f64,
        }
    }
}

/// Addressable numeric fields of a [`Snapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricPath {
    CpuPercent,
    CpuCount,
    MemoryPercent,
    MemoryUsed,
    MemoryAvailable,
    DiskPercent,
    DiskUsed,
    DiskFree,
    Processes,
}

impl MetricPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricPath::CpuPercent => "cpu.percent",
            MetricPath::CpuCount => "cpu.count",
            MetricPath::MemoryPercent => "memory.percent",
            MetricPath::MemoryUsed => "memory.used",
            MetricPath::MemoryAvailable => "memory.available",
            MetricPath::DiskPercent => "disk.percent",
            MetricPath::DiskUsed => "disk.used",
            MetricPath::DiskFree => "disk.free",
            MetricPath::Processes => "processes",
        }
    }

    /// Human readable label used in alert messages
    pub fn label(&self) -> &'static str {
        match self {
            MetricPath::CpuPercent => "CPU usage",
            MetricPath::CpuCount => "CPU count",
            MetricPath::MemoryPercent => "memory usage",
            MetricPath::MemoryUsed => "used memory",
            MetricPath::MemoryAvailable => "available memory",
            MetricPath::DiskPercent => "disk usage",
            MetricPath::DiskUsed => "used disk space",
            MetricPath::DiskFree => "free disk space",
            MetricPath::Processes => "process count",
        }
    }

    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            MetricPath::CpuPercent | MetricPath::MemoryPercent | MetricPath::DiskPercent
        )
    }
}

impl fmt::Display for MetricPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = match s {
            "cpu.percent" => MetricPath::CpuPercent,
            "cpu.count" => MetricPath::CpuCount,
            "memory.percent" => MetricPath::MemoryPercent,
            "memory.used" => MetricPath::MemoryUsed,
            "memory.available" => MetricPath::MemoryAvailable,
            "disk.percent" => MetricPath::DiskPercent,
            "disk.used" => MetricPath::DiskUsed,
            "disk.free" => MetricPath::DiskFree,
            "processes" | "process_count" => MetricPath::Processes,
            other => return Err(format!("unknown metric path '{other}'")),
        };
        Ok(path)
    }
}

impl TryFrom<String> for MetricPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricPath> for String {
    fn from(path: MetricPath) -> Self {
        path.as_str().to_string()
    }
}
