mod handlers;
mod types;

pub use handlers::{list_sectors, patch_sector, put_sectors};
pub use types::{
    PivotCenterRequest, PivotCenterResponse, SectorConfigRequest, SectorRequest, SectorResponse,
    SectorToggleRequest, SectorsResponse,
};

// Re-export utoipa path structs for OpenAPI documentation
pub use handlers::{__path_list_sectors, __path_patch_sector, __path_put_sectors};
