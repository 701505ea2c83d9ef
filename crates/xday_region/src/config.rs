use thiserror::Error;

use crate::{
    GridRepair, MeshLodConfig, NeighbourCount, PathFinderSettings,
    repair::DEFAULT_ISLAND_WARNING_THRESHOLD,
};

/// Settings shared by all layers of a [`RegionSystem`](crate::RegionSystem).
/// Usually built using [`RegionSystemConfigBuilder`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionSystemConfig {
    /// Connected fragments of a region smaller than this are reported by the repair passes.
    pub island_warning_threshold: usize,
    /// The neighbourhood used for path finding on new layers.
    pub neighbour_count: NeighbourCount,
    /// Settings of the path finders created by the system.
    pub path_finder: PathFinderSettings,
    /// Mesh settings per level of detail, from most to least detailed. `[Limit: not empty]`
    pub lods: Vec<MeshLodConfig>,
}

impl Default for RegionSystemConfig {
    fn default() -> Self {
        RegionSystemConfigBuilder::default().build()
    }
}

impl RegionSystemConfig {
    /// Checks that the configuration can be used to build meshes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lods.is_empty() {
            return Err(ConfigError::NoLods);
        }
        for (index, lod) in self.lods.iter().enumerate() {
            let reason = if !lod.border_size.is_finite() || lod.border_size < 0.0 {
                "border size must be finite and not negative"
            } else if !lod.border_width.is_finite() || lod.border_width < 0.0 {
                "border width must be finite and not negative"
            } else if !lod.height.is_finite() {
                "height must be finite"
            } else {
                continue;
            };
            return Err(ConfigError::InvalidLod { index, reason });
        }
        Ok(())
    }

    /// The repair passes configured with this config's thresholds.
    pub fn grid_repair(&self) -> GridRepair {
        GridRepair {
            island_warning_threshold: self.island_warning_threshold,
        }
    }

    /// Parses and validates a configuration from JSON.
    #[cfg(feature = "serialize")]
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    #[cfg(feature = "serialize")]
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A builder for [`RegionSystemConfig`]. Derives the mesh settings of every level of detail from
/// the settings of the most detailed one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionSystemConfigBuilder {
    /// See [`RegionSystemConfig::island_warning_threshold`].
    pub island_warning_threshold: usize,
    /// See [`RegionSystemConfig::neighbour_count`].
    pub neighbour_count: NeighbourCount,
    /// How far path queries look for a walkable cell next to a blocked endpoint. `[Units: cells]`
    pub max_nearest_search_distance: u32,
    /// Corner rounding distance at LOD 0. `[Units: wu]`
    pub border_size: f32,
    /// Segments per rounded corner at LOD 0. Halved for each further LOD, but never below 1.
    pub corner_segments: u32,
    /// Border strip width at LOD 0. `[Units: wu]`
    pub border_width: f32,
    /// Height of all meshes. `[Units: wu]`
    pub height: f32,
    /// How many levels of detail to generate. `[Limit: >= 1]`
    pub lod_count: u32,
    /// Factor applied to the border size and width for each further LOD.
    pub lod_scale: f32,
}

impl Default for RegionSystemConfigBuilder {
    fn default() -> Self {
        Self {
            island_warning_threshold: DEFAULT_ISLAND_WARNING_THRESHOLD,
            neighbour_count: NeighbourCount::Four,
            max_nearest_search_distance: PathFinderSettings::default().max_nearest_search_distance,
            border_size: 0.5,
            corner_segments: 4,
            border_width: 0.2,
            height: 0.0,
            lod_count: 1,
            lod_scale: 2.0,
        }
    }
}

impl RegionSystemConfigBuilder {
    /// Builds a [`RegionSystemConfig`] from the current configuration.
    pub fn build(self) -> RegionSystemConfig {
        let lods = (0..self.lod_count.max(1))
            .map(|lod| {
                let scale = self.lod_scale.powi(lod as i32);
                let corner_segments = match self.corner_segments {
                    0 => 0,
                    segments => (segments >> lod.min(31)).max(1),
                };
                MeshLodConfig {
                    border_size: self.border_size * scale,
                    corner_segments,
                    border_width: self.border_width * scale,
                    height: self.height,
                }
            })
            .collect();
        RegionSystemConfig {
            island_warning_threshold: self.island_warning_threshold,
            neighbour_count: self.neighbour_count,
            path_finder: PathFinderSettings {
                max_nearest_search_distance: self.max_nearest_search_distance,
            },
            lods,
        }
    }
}

/// Errors that can occur when loading a [`RegionSystemConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No level of detail was configured.
    #[error("At least one level of detail is required")]
    NoLods,
    /// A level of detail has unusable values.
    #[error("Level of detail {index} is invalid: {reason}")]
    InvalidLod {
        /// The index of the level of detail
        index: usize,
        /// What is wrong with it
        reason: &'static str,
    },
    /// The configuration is not valid JSON or does not match the expected layout.
    #[cfg(feature = "serialize")]
    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
