mod handlers;
mod types;

pub use handlers::{get_live, get_open_vuelta, list_devices, put_device, stop_device};
pub use types::{DeviceRequest, DeviceResponse, LiveStateResponse, OpenVueltaResponse, StopQuery};

// Re-export utoipa path structs for OpenAPI documentation
pub use handlers::{
    __path_get_live, __path_get_open_vuelta, __path_list_devices, __path_put_device,
    __path_stop_device,
};
