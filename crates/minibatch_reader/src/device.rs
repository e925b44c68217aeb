use tch::Device;

/// Device used when a caller does not name one: the first CUDA device if
/// there is one, the CPU otherwise.
///
/// Only the public entry points call this. Everything below them takes an
/// explicit `Device`.
pub fn default_device() -> Device {
    Device::cuda_if_available()
}
