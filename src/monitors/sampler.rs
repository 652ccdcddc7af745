use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, ProcessRefreshKind, ProcessesToUpdate,
    RefreshKind, System,
};
use tracing::{instrument, trace};

use crate::error::SamplerError;
use crate::{
    CpuInformation, DiskInformation, MemoryInformation, NetworkInformation, Snapshot, Timestamp,
};

/// Source of snapshots, called once per publisher tick
pub trait Sampler: Send {
    fn sample(&mut self) -> Result<Snapshot, SamplerError>;
}

/// Timestamp source
///
/// The monotonic part comes from [`Instant`], the wall clock part never goes
/// backwards even if the system clock is adjusted.
#[derive(Debug, Clone)]
pub struct Clock {
    started: Instant,
    last_wall: Option<DateTime<Utc>>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_wall: None,
        }
    }

    pub fn now(&mut self) -> Timestamp {
        let monotonic = self.started.elapsed();
        let wall = match self.last_wall {
            Some(last) => Utc::now().max(last),
            None => Utc::now(),
        };
        self.last_wall = Some(wall);
        Timestamp::new(monotonic, wall)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Sampler backed by `sysinfo`
pub struct SystemSampler {
    system: System,
    disks: Disks,
    networks: Networks,
    mount_point: PathBuf,
    clock: Clock,
}

impl SystemSampler {
    /// Create a sampler reporting disk usage for the filesystem at `mount_point`
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything())
            .with_processes(ProcessRefreshKind::nothing());

        // first refresh primes the CPU usage delta for the first tick
        let mut system = System::new_with_specifics(refresh_kind);
        system.refresh_cpu_usage();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            mount_point: mount_point.into(),
            clock: Clock::new(),
        }
    }

    fn cpu(&self) -> CpuInformation {
        CpuInformation {
            percent: self.system.global_cpu_usage() as f64,
            count: self.system.cpus().len(),
        }
    }

    fn memory(&self) -> MemoryInformation {
        let total = self.system.total_memory();
        let available = self.system.available_memory();

        MemoryInformation {
            total,
            available,
            used: self.system.used_memory(),
            percent: percentage(total.saturating_sub(available), total),
        }
    }

    fn disk(&self) -> DiskInformation {
        let usage = |total: u64, free: u64| {
            let used = total.saturating_sub(free);
            DiskInformation {
                total,
                used,
                free,
                percent: percentage(used, total),
            }
        };

        let mounted = self
            .disks
            .iter()
            .filter(|disk| self.mount_point.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count());

        if let Some(disk) = mounted {
            return usage(disk.total_space(), disk.available_space());
        }

        // no filesystem covers the mount point (e.g. overlay roots), use all disks
        trace!(
            "no disk mounted at {}, aggregating {} disks",
            self.mount_point.display(),
            self.disks.list().len()
        );
        let (total, free) = self.disks.iter().fold((0, 0), |(total, free), disk| {
            (total + disk.total_space(), free + disk.available_space())
        });
        usage(total, free)
    }

    fn network(&self) -> NetworkInformation {
        self.networks
            .values()
            .fold(NetworkInformation::default(), |acc, data| NetworkInformation {
                bytes_sent: acc.bytes_sent + data.total_transmitted(),
                bytes_recv: acc.bytes_recv + data.total_received(),
                packets_sent: acc.packets_sent + data.total_packets_transmitted(),
                packets_recv: acc.packets_recv + data.total_packets_received(),
            })
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}

impl Sampler for SystemSampler {
    #[instrument(skip(self))]
    fn sample(&mut self) -> Result<Snapshot, SamplerError> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        self.disks.refresh(true);
        self.networks.refresh(true);

        let cpu = self.cpu();
        if cpu.count == 0 {
            return Err(SamplerError::SourceUnavailable(
                "no CPU information available".to_string(),
            ));
        }

        let memory = self.memory();
        if memory.total == 0 {
            return Err(SamplerError::SourceUnavailable(
                "no memory information available".to_string(),
            ));
        }

        let snapshot = Snapshot {
            timestamp: self.clock.now(),
            cpu,
            memory,
            disk: self.disk(),
            network: self.network(),
            processes: self.system.processes().len(),
        };

        trace!(
            "sampled cpu {:.1}%, memory {:.1}%, disk {:.1}%",
            snapshot.cpu.percent, snapshot.memory.percent, snapshot.disk.percent
        );

        Ok(snapshot)
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64) * 100.0
}
