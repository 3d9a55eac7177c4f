use thiserror::Error;

/// Engine-level failures surfaced to the host application. Per-function
/// failures (missing energy, rejected topology, nothing found) never show up
/// here; they are written into token memory instead.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A cluster's cells do not form a single connected component.
    #[error("cluster {cluster_id} is not connected: {reachable} of {total} cells reachable")]
    DisconnectedCluster {
        cluster_id: u64,
        reachable: usize,
        total: usize,
    },
    /// A connection is asymmetric, out of range, a self-connection or exceeds
    /// the cell's connection limit.
    #[error("invalid connection on cell {cell_id} of cluster {cluster_id}: {reason}")]
    InvalidConnection {
        cluster_id: u64,
        cell_id: u64,
        reason: &'static str,
    },
    /// Internal energy changed by more than the tolerated amount during a tick.
    #[error("energy not conserved in timestep {timestep}: expected {expected:.6}, found {actual:.6}")]
    EnergyNotConserved {
        timestep: u64,
        expected: f64,
        actual: f64,
    },
    #[error("invalid world description: {0}")]
    InvalidDescription(String),
    #[error("invalid world size {width}x{height}")]
    InvalidWorldSize { width: u32, height: u32 },
}
