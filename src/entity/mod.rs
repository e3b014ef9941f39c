pub mod device_live_state;
pub mod device_stats;
pub mod devices;
pub mod pivot_centers;
pub mod position_samples;
pub mod sectors;
pub mod vueltas;
