//! Host telemetry handlers.

use axum::Json;

use crate::error::{ApiError, Result};
use crate::telemetry::{self, CpuInfo, DiskPartition, MemoryInfo, NetworkInfo, SystemInfo};

async fn collect<T, F>(collector: F) -> Result<Json<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(collector)
        .await
        .map(Json)
        .map_err(|e| ApiError::Internal(format!("telemetry collection failed: {e}")))
}

/// `GET /system`
pub async fn system_info() -> Result<Json<SystemInfo>> {
    collect(telemetry::system_info).await
}

/// `GET /system/cpu`
pub async fn cpu_info() -> Result<Json<CpuInfo>> {
    collect(telemetry::cpu_info).await
}

/// `GET /system/memory`
pub async fn memory_info() -> Result<Json<MemoryInfo>> {
    collect(telemetry::memory_info).await
}

/// `GET /system/disk`
pub async fn disk_info() -> Result<Json<Vec<DiskPartition>>> {
    collect(telemetry::disk_info).await
}

/// `GET /system/network`
pub async fn network_info() -> Result<Json<NetworkInfo>> {
    collect(telemetry::network_info).await
}
