//! Pivot sector and revolution tracking engine.

pub mod circular;
pub mod device;
pub mod resolver;
pub mod revolution;
pub mod sectors;
pub mod state_machine;
pub mod stats;
pub mod water;

pub use device::{
    ApplyOutcome, Changes, DeviceKind, DeviceProfile, DeviceSnapshot, DeviceTracker, DropReason,
    FlowConfig, LiveState, PositionSample, TrackerCheckpoint,
};
pub use resolver::{PositionResolver, SectorEvent};
pub use revolution::{CloseReason, RevolutionTracker, Vuelta};
pub use sectors::{Sector, SectorId, SectorSet, SectorSpec, SectorValidationError};
pub use state_machine::{DeviceStateMachine, OperatingState};
pub use stats::{DeviceStats, StatsAggregator};
pub use water::WaterAccumulator;
