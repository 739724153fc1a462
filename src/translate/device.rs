use tokio::process::Command;
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;

/// Where a model gets loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Gpu { free_mib: u64 },
    Cpu,
}

impl Device {
    pub fn is_gpu(&self) -> bool {
        matches!(self, Self::Gpu { .. })
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu { free_mib } => write!(f, "gpu ({} MiB free)", free_mib),
            Self::Cpu => f.write_str("cpu"),
        }
    }
}

/// Parse `nvidia-smi --query-gpu=memory.free --format=csv,noheader,nounits`,
/// one MiB value per GPU; returns the largest.
pub fn parse_free_memory(output: &str) -> Option<u64> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u64>().ok())
        .max()
}

/// Free accelerator memory in MiB, or `None` when no GPU can be queried.
pub async fn query_free_gpu_memory(query_binary: &str) -> Option<u64> {
    let output = Command::new(query_binary)
        .args(["--query-gpu=memory.free", "--format=csv,noheader,nounits"])
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => parse_free_memory(&String::from_utf8_lossy(&output.stdout)),
        Ok(output) => {
            debug!("{} exited with {}", query_binary, output.status);
            None
        }
        Err(e) => {
            debug!("{} unavailable: {}", query_binary, e);
            None
        }
    }
}

/// Model memory estimate: weights plus the same again for activations/buffers.
pub fn required_bytes(checkpoint_bytes: u64) -> u64 {
    checkpoint_bytes.saturating_mul(2)
}

pub fn choose(free_mib: Option<u64>, required: u64) -> Device {
    match free_mib {
        Some(free) if free.saturating_mul(MIB) >= required => Device::Gpu { free_mib: free },
        Some(free) => {
            warn!(
                "Only {} MiB GPU memory free, {} MiB needed; loading into process memory",
                free,
                required / MIB
            );
            Device::Cpu
        }
        None => Device::Cpu,
    }
}

/// Query the accelerator, then fall back to process memory if it is too small.
pub async fn select(query_binary: &str, checkpoint_bytes: u64) -> Device {
    let device = choose(query_free_gpu_memory(query_binary).await, required_bytes(checkpoint_bytes));
    info!("Selected device: {}", device);
    device
}
