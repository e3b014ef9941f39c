mod handlers;
mod types;

pub use handlers::{get_stats, list_vueltas};
pub use types::{StatsQuery, StatsResponse, VueltaResponse, VueltasQuery, VueltasResponse};

// Re-export utoipa path structs for OpenAPI documentation
pub use handlers::{__path_get_stats, __path_list_vueltas};
