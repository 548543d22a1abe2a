//! Host telemetry snapshots.
//!
//! Collection blocks (CPU usage needs two samples), so handlers run these
//! functions on the blocking pool. Sizes are reported in GB rounded to two
//! decimals.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use sysinfo::{Disks, Networks, System};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Operating system and distribution.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformInfo {
    /// Kernel family (`Linux`, `Darwin`, ...).
    pub system: String,
    /// Kernel release.
    pub release: String,
    /// OS version.
    pub version: String,
    /// Machine architecture.
    pub machine: String,
    /// CPU brand string.
    pub processor: String,
    /// Distribution display name.
    pub distribution: String,
    /// Distribution ID (`ubuntu`, `debian`, ...).
    pub distribution_id: String,
}

/// CPU topology and load.
#[derive(Debug, Clone, Serialize)]
pub struct CpuInfo {
    /// Physical cores, when the platform reports them.
    pub physical_cores: Option<usize>,
    /// Logical cores.
    pub total_cores: usize,
    /// Current frequency in MHz.
    pub cpu_freq_current: Option<f64>,
    /// Usage percentage per logical core.
    pub cpu_usage_per_core: Vec<f64>,
    /// Overall usage percentage.
    pub total_cpu_usage: f64,
}

/// Swap usage.
#[derive(Debug, Clone, Serialize)]
pub struct SwapMemory {
    /// Total swap in GB.
    pub total: f64,
    /// Used swap in GB.
    pub used: f64,
    /// Free swap in GB.
    pub free: f64,
    /// Usage percentage.
    pub percentage: f64,
}

/// RAM usage.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryInfo {
    /// Total RAM in GB.
    pub total: f64,
    /// Available RAM in GB.
    pub available: f64,
    /// Used RAM in GB.
    pub used: f64,
    /// Usage percentage.
    pub percentage: f64,
    /// Swap usage.
    pub swap: SwapMemory,
}

/// One mounted disk.
#[derive(Debug, Clone, Serialize)]
pub struct DiskPartition {
    /// Device name.
    pub device: String,
    /// Mount point.
    pub mountpoint: String,
    /// File system type.
    pub filesystem_type: String,
    /// Capacity in GB.
    pub total: f64,
    /// Used space in GB.
    pub used: f64,
    /// Free space in GB.
    pub free: f64,
    /// Usage percentage.
    pub percentage: f64,
}

/// Per-interface I/O counters since boot.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkIoCounters {
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_recv: u64,
    /// Packets sent.
    pub packets_sent: u64,
    /// Packets received.
    pub packets_recv: u64,
    /// Receive errors.
    pub errors_in: u64,
    /// Transmit errors.
    pub errors_out: u64,
}

/// One network interface.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInterface {
    /// Hardware address.
    pub mac_address: String,
    /// I/O counters.
    pub io_counters: NetworkIoCounters,
}

/// All network interfaces keyed by name.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    /// Interfaces keyed by name.
    pub interfaces: BTreeMap<String, NetworkInterface>,
}

/// Complete host snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    /// Platform details.
    pub platform: PlatformInfo,
    /// Boot time as `YYYY-MM-DD HH:MM:SS` UTC.
    pub boot_time: String,
    /// CPU details.
    pub cpu: CpuInfo,
    /// Memory details.
    pub memory: MemoryInfo,
    /// Mounted disks.
    pub disks: Vec<DiskPartition>,
    /// Network interfaces.
    pub network: NetworkInfo,
}

#[allow(clippy::cast_precision_loss)]
fn gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / whole as f64)
    }
}

/// Platform details.
#[must_use]
pub fn platform_info() -> PlatformInfo {
    let mut sys = System::new();
    sys.refresh_cpu();
    PlatformInfo {
        system: System::name().unwrap_or_default(),
        release: System::kernel_version().unwrap_or_default(),
        version: System::os_version().unwrap_or_default(),
        machine: std::env::consts::ARCH.to_string(),
        processor: sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .unwrap_or_default(),
        distribution: System::long_os_version().unwrap_or_default(),
        distribution_id: System::distribution_id(),
    }
}

/// CPU snapshot. Blocks for one sampling interval.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cpu_info() -> CpuInfo {
    let mut sys = System::new();
    sys.refresh_cpu();
    std::thread::sleep(CPU_SAMPLE_INTERVAL);
    sys.refresh_cpu();

    let cpus = sys.cpus();
    CpuInfo {
        physical_cores: sys.physical_core_count(),
        total_cores: cpus.len(),
        cpu_freq_current: cpus
            .first()
            .map(sysinfo::Cpu::frequency)
            .filter(|mhz| *mhz > 0)
            .map(|mhz| mhz as f64),
        cpu_usage_per_core: cpus
            .iter()
            .map(|c| round2(f64::from(c.cpu_usage())))
            .collect(),
        total_cpu_usage: round2(f64::from(sys.global_cpu_info().cpu_usage())),
    }
}

/// Memory snapshot.
#[must_use]
pub fn memory_info() -> MemoryInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    let available = sys.available_memory();
    let used = total.saturating_sub(available);
    let swap_total = sys.total_swap();
    let swap_used = sys.used_swap();
    MemoryInfo {
        total: gb(total),
        available: gb(available),
        used: gb(used),
        percentage: percent(used, total),
        swap: SwapMemory {
            total: gb(swap_total),
            used: gb(swap_used),
            free: gb(sys.free_swap()),
            percentage: percent(swap_used, swap_total),
        },
    }
}

/// Mounted disk snapshot.
#[must_use]
pub fn disk_info() -> Vec<DiskPartition> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| {
            let total = disk.total_space();
            let free = disk.available_space();
            let used = total.saturating_sub(free);
            DiskPartition {
                device: disk.name().to_string_lossy().into_owned(),
                mountpoint: disk.mount_point().display().to_string(),
                filesystem_type: disk.file_system().to_string_lossy().into_owned(),
                total: gb(total),
                used: gb(used),
                free: gb(free),
                percentage: percent(used, total),
            }
        })
        .collect()
}

/// Network interface snapshot.
#[must_use]
pub fn network_info() -> NetworkInfo {
    let networks = Networks::new_with_refreshed_list();
    let interfaces = networks
        .list()
        .iter()
        .map(|(name, data)| {
            (
                name.clone(),
                NetworkInterface {
                    mac_address: data.mac_address().to_string(),
                    io_counters: NetworkIoCounters {
                        bytes_sent: data.total_transmitted(),
                        bytes_recv: data.total_received(),
                        packets_sent: data.total_packets_transmitted(),
                        packets_recv: data.total_packets_received(),
                        errors_in: data.total_errors_on_received(),
                        errors_out: data.total_errors_on_transmitted(),
                    },
                },
            )
        })
        .collect();
    NetworkInfo { interfaces }
}

/// Boot time as `YYYY-MM-DD HH:MM:SS` UTC.
#[must_use]
pub fn boot_time() -> String {
    i64::try_from(System::boot_time())
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Complete host snapshot.
#[must_use]
pub fn system_info() -> SystemInfo {
    SystemInfo {
        platform: platform_info(),
        boot_time: boot_time(),
        cpu: cpu_info(),
        memory: memory_info(),
        disks: disk_info(),
        network: network_info(),
    }
}
