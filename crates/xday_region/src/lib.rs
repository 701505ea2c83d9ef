#![doc = include_str!("../../../readme.md")]

mod config;
mod curve;
#[cfg(feature = "serialize")]
pub mod export;
mod grid;
mod layer;
pub(crate) mod math;
mod mesh;
mod outline;
mod path;
mod region;
pub mod repair;
mod system;

pub use config::{ConfigError, RegionSystemConfig, RegionSystemConfigBuilder};
pub use curve::{CurveSettings, curve_outline};
pub use grid::{RegionGrid, RegionGridBuilder, RegionGridBuilderError};
pub use layer::{Building, BuildingKey, LayerError, RegionLayer, RegionMeshes};
pub use math::Aabb2d;
pub use mesh::{MeshError, MeshLodConfig, RegionMesh};
pub use outline::{BorderEdge, Outline, OutlineError};
pub use path::{
    AStarPathFinder, GridData, NeighbourCount, PathError, PathFinder, PathFinderSettings,
    PathFlags, PathTask,
};
pub use region::{RegionId, RegionInfo};
pub use repair::{GridIssue, GridIssueKind, GridRepair, RepairAction, RepairReport};
pub use system::{LayerKey, RegionSystem};
