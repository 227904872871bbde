// ============================================================
// Layer 6 - Reproducibility and Device Selection
// ============================================================
// Both functions change process-wide state and run once at
// startup, before any data is loaded or model built.

use burn::{backend::wgpu::WgpuDevice, prelude::*};

/// Environment variable carrying the run seed for child processes.
pub const HASH_SEED_VAR: &str = "HASH_SEED";

/// Seeds the backend RNG (parameter init, dropout). The data loader's
/// shuffle takes the same seed separately.
pub fn seed_everything<B: Backend>(seed: u64) {
    std::env::set_var(HASH_SEED_VAR, seed.to_string());
    B::seed(seed);
    tracing::debug!("Seeded backend RNG with {seed}");
}

/// Exposes `device` through the CUDA visibility variables and maps it to a
/// WGPU device: "cpu" picks the CPU adapter, anything else the default
/// adapter.
pub fn configure_devices(device: &str) -> WgpuDevice {
    std::env::set_var("CUDA_DEVICE_ORDER", "PCI_BUS_ID");
    std::env::set_var("CUDA_VISIBLE_DEVICES", device);
    select_device(device)
}

/// A GPU index only narrows the visible devices. Requesting
/// `DiscreteGpu(n)` panics inside the wgpu runtime on hosts without that
/// adapter, so indices resolve to the default adapter, which falls back
/// to integrated GPUs and the CPU.
pub fn select_device(device: &str) -> WgpuDevice {
    let device = device.trim();
    if device.eq_ignore_ascii_case("cpu") {
        return WgpuDevice::Cpu;
    }
    if device.parse::<usize>().is_err() {
        tracing::debug!("Device selector '{device}' is not an index; using the default adapter");
    }
    WgpuDevice::DefaultDevice
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_device_mapping() {
        assert_eq!(select_device(" 2 "), WgpuDevice::DefaultDevice);
        assert_eq!(select_device("CPU"), WgpuDevice::Cpu);
        assert_eq!(select_device("0,1"), WgpuDevice::DefaultDevice);
    }

    #[test]
    fn test_default_device_never_requires_a_discrete_gpu() {
        let cfg = crate::application::train_use_case::TrainConfig::default();
        assert_eq!(select_device(&cfg.device), WgpuDevice::DefaultDevice);
        for index in ["0", "1", "7"] {
            assert!(!matches!(select_device(index), WgpuDevice::DiscreteGpu(_)));
        }
    }

    #[test]
    fn test_configure_sets_cuda_env() {
        let _ = configure_devices("3");
        assert_eq!(std::env::var("CUDA_DEVICE_ORDER").unwrap(), "PCI_BUS_ID");
        assert_eq!(std::env::var("CUDA_VISIBLE_DEVICES").unwrap(), "3");
    }

    #[test]
    fn test_seed_exported_to_env() {
        seed_everything::<NdArray>(11);
        assert_eq!(std::env::var(HASH_SEED_VAR).unwrap(), "11");
    }
}
