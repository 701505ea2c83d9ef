//! Game data export.
//!
//! Two formats are written: a JSON summary of one layer for game config tooling, and a compressed
//! binary blob with the grids of all layers for the game runtime.

use std::{
    collections::BTreeMap,
    io::{Read as _, Write as _},
    path::Path,
};

use anyhow::Context as _;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use glam::{U8Vec4, Vec2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Aabb2d, RegionId, RegionLayer, RegionSystem};

/// Identifies binary game data.
pub const GAME_DATA_MAGIC: [u8; 4] = *b"XRGN";
/// The binary layout version written by [`encode_game_data`].
pub const GAME_DATA_VERSION: u32 = 1;

/// The JSON summary of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRegionJson {
    /// Cells along the x-axis
    pub width: u32,
    /// Cells along the y-axis
    pub height: u32,
    /// For every region config ID, the config IDs of the regions sharing a side with it
    pub neighbours: BTreeMap<u32, Vec<u32>>,
    /// Every region that owns at least one cell
    pub regions: Vec<GameRegionJsonEntry>,
    /// Every placed building
    pub buildings: Vec<GameBuildingJson>,
}

/// A region in [`GameRegionJson`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRegionJsonEntry {
    /// The game config of the region
    pub cfg_id: u32,
    /// Display name
    pub name: String,
    /// RGBA color
    pub color: [u8; 4],
    /// Average cell center in world space
    pub center: [f32; 2],
    /// Lower corner of the region's bounds
    pub min: [f32; 2],
    /// Upper corner of the region's bounds
    pub max: [f32; 2],
}

/// A building in [`GameRegionJson`]. Positions are the footprint center on the ground plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameBuildingJson {
    /// The game config of the building
    pub cfg_id: u32,
    /// World position along the x-axis
    pub x: f32,
    /// World position along the z-axis, which is the grid's y-axis
    pub z: f32,
    /// The upgrade level
    pub level: u32,
}

impl GameRegionJson {
    /// Collects the summary of a layer. Cells of unregistered regions are left out.
    pub fn from_layer(layer: &RegionLayer) -> Self {
        let config_id = |id: RegionId| layer.region(id).map(|info| info.config_id);
        let neighbours = layer
            .region_neighbours()
            .into_iter()
            .filter_map(|(region, others)| {
                let others = others.into_iter().filter_map(config_id).collect();
                Some((config_id(region)?, others))
            })
            .collect();

        let regions = layer
            .regions()
            .filter_map(|(id, info)| {
                let center = layer.region_center(id)?;
                let bounds = layer.region_bounds(id)?;
                Some(GameRegionJsonEntry {
                    cfg_id: info.config_id,
                    name: info.name.clone(),
                    color: info.color.to_array(),
                    center: center.to_array(),
                    min: bounds.min.to_array(),
                    max: bounds.max.to_array(),
                })
            })
            .collect();

        let grid = layer.grid();
        let buildings = layer
            .buildings()
            .map(|(_, building)| {
                let corner = grid.coordinate_to_position(building.coordinate.x, building.coordinate.y);
                let center = corner + building.size.as_vec2() * grid.cell_size() * 0.5;
                GameBuildingJson {
                    cfg_id: building.config_id,
                    x: center.x,
                    z: center.y,
                    level: building.level,
                }
            })
            .collect();

        Self {
            width: grid.horizontal_count(),
            height: grid.vertical_count(),
            neighbours,
            regions,
            buildings,
        }
    }

    /// Serializes the summary as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The binary game data of a whole [`RegionSystem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRegionData {
    /// Always [`GAME_DATA_MAGIC`]
    pub magic: [u8; 4],
    /// Always [`GAME_DATA_VERSION`]
    pub version: u32,
    /// One entry per layer
    pub layers: Vec<GameLayerData>,
}

/// The binary game data of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLayerData {
    /// The name of the layer
    pub name: String,
    /// Cells along the x-axis
    pub horizontal_count: u32,
    /// Cells along the y-axis
    pub vertical_count: u32,
    /// The position of the lower-left corner of cell `(0, 0)`
    pub origin: Vec2,
    /// The size of a single cell
    pub cell_size: Vec2,
    /// Row-major region indices. 0 means no region, `i + 1` refers to `regions[i]`.
    pub grid: Vec<u8>,
    /// The regions that are referenced by the grid
    pub regions: Vec<GameRegionMeta>,
}

/// Metadata of one region in [`GameLayerData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRegionMeta {
    /// The ID of the region in the editor
    pub id: RegionId,
    /// The game config of the region
    pub config_id: u32,
    /// Display name
    pub name: String,
    /// Display color
    pub color: U8Vec4,
    /// Average cell center in world space
    pub center: Vec2,
    /// The area covered by the region
    pub bounds: Aabb2d,
    /// The prefab shown for the region, if any
    pub prefab_path: Option<String>,
}

impl GameRegionData {
    /// Collects the game data of every layer.
    pub fn from_system(system: &RegionSystem) -> Result<Self, ExportError> {
        let layers = system
            .layers()
            .map(|(_, layer)| GameLayerData::from_layer(layer))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            magic: GAME_DATA_MAGIC,
            version: GAME_DATA_VERSION,
            layers,
        })
    }
}

impl GameLayerData {
    /// Collects the game data of one layer.
    ///
    /// Only regions that own cells are written. A layer may reference at most 255 regions.
    pub fn from_layer(layer: &RegionLayer) -> Result<Self, ExportError> {
        let grid = layer.grid();
        let used = grid.region_ids();
        if used.len() > u8::MAX as usize {
            return Err(ExportError::TooManyRegions {
                layer: layer.name().to_string(),
                count: used.len(),
            });
        }

        let mut regions = Vec::with_capacity(used.len());
        let mut indices = BTreeMap::new();
        for id in used {
            let info = layer.region(id).ok_or_else(|| ExportError::UnregisteredRegion {
                layer: layer.name().to_string(),
                region: id,
            })?;
            let (Some(center), Some(bounds)) = (layer.region_center(id), layer.region_bounds(id))
            else {
                continue;
            };
            regions.push(GameRegionMeta {
                id,
                config_id: info.config_id,
                name: info.name.clone(),
                color: info.color,
                center,
                bounds,
                prefab_path: info.prefab_path.clone(),
            });
            indices.insert(id, regions.len() as u8);
        }

        let cells = grid
            .cells()
            .iter()
            .map(|id| indices.get(id).copied().unwrap_or(0))
            .collect();

        Ok(Self {
            name: layer.name().to_string(),
            horizontal_count: grid.horizontal_count(),
            vertical_count: grid.vertical_count(),
            origin: grid.origin(),
            cell_size: grid.cell_size(),
            grid: cells,
            regions,
        })
    }

    /// The region of a cell, if any.
    pub fn region_at(&self, x: u32, y: u32) -> Option<&GameRegionMeta> {
        if x >= self.horizontal_count || y >= self.vertical_count {
            return None;
        }
        let index = *self
            .grid
            .get(x as usize + y as usize * self.horizontal_count as usize)?;
        index
            .checked_sub(1)
            .and_then(|index| self.regions.get(index as usize))
    }
}

/// Serializes game data with bincode and compresses it with gzip.
pub fn encode_game_data(data: &GameRegionData) -> Result<Vec<u8>, ExportError> {
    let bincode_bytes = bincode::serde::encode_to_vec(data, bincode::config::standard())?;
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&bincode_bytes)?;
    Ok(gz.finish()?)
}

/// Reverses [`encode_game_data`], checking the header and the grid sizes.
pub fn decode_game_data(bytes: &[u8]) -> Result<GameRegionData, ExportError> {
    let mut gz = GzDecoder::new(bytes);
    let mut bincode_bytes = Vec::new();
    gz.read_to_end(&mut bincode_bytes)?;
    let (data, _len): (GameRegionData, usize) =
        bincode::serde::decode_from_slice(&bincode_bytes, bincode::config::standard())?;

    if data.magic != GAME_DATA_MAGIC {
        return Err(ExportError::BadMagic { found: data.magic });
    }
    if data.version != GAME_DATA_VERSION {
        return Err(ExportError::UnsupportedVersion {
            found: data.version,
        });
    }
    for layer in &data.layers {
        let expected = layer.horizontal_count as usize * layer.vertical_count as usize;
        let out_of_range = layer
            .grid
            .iter()
            .any(|index| *index as usize > layer.regions.len());
        if layer.grid.len() != expected || out_of_range {
            return Err(ExportError::CorruptLayer {
                layer: layer.name.clone(),
            });
        }
    }
    Ok(data)
}

/// Writes the JSON summary of a layer to a file.
pub fn save_json(path: impl AsRef<Path>, layer: &RegionLayer) -> anyhow::Result<()> {
    let path = path.as_ref();
    let json = GameRegionJson::from_layer(layer)
        .to_json_string()
        .with_context(|| format!("Failed to serialize layer {}", layer.name()))?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!("Wrote region JSON of layer {} to {}", layer.name(), path.display());
    Ok(())
}

/// Writes the binary game data of all layers to a file.
pub fn save_binary(path: impl AsRef<Path>, system: &RegionSystem) -> anyhow::Result<()> {
    let path = path.as_ref();
    let data = GameRegionData::from_system(system).context("Failed to collect game data")?;
    let bytes = encode_game_data(&data).context("Failed to encode game data")?;
    std::fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!(
        "Wrote {} layers ({} bytes) to {}",
        data.layers.len(),
        bytes.len(),
        path.display()
    );
    Ok(())
}

/// Reads binary game data written by [`save_binary`].
pub fn load_binary(path: impl AsRef<Path>) -> anyhow::Result<GameRegionData> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    decode_game_data(&bytes).with_context(|| format!("Failed to decode {}", path.display()))
}

/// Errors that can occur when exporting game data.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The binary grid stores region indices as `u8`.
    #[error("Layer {layer} uses {count} regions, at most 255 can be exported")]
    TooManyRegions {
        /// The name of the layer
        layer: String,
        /// The number of regions in use
        count: usize,
    },
    /// The grid contains a region without [`RegionInfo`](crate::RegionInfo).
    #[error("Layer {layer} contains cells of unregistered region {}", region.0)]
    UnregisteredRegion {
        /// The name of the layer
        layer: String,
        /// The unregistered region
        region: RegionId,
    },
    /// The data does not start with [`GAME_DATA_MAGIC`].
    #[error("Not region game data, found magic {found:?}")]
    BadMagic {
        /// The magic that was found
        found: [u8; 4],
    },
    /// The data was written by an incompatible version.
    #[error("Unsupported game data version {found}, expected {}", GAME_DATA_VERSION)]
    UnsupportedVersion {
        /// The version that was found
        found: u32,
    },
    /// A layer's grid does not match its dimensions or region list.
    #[error("Grid of layer {layer} is corrupt")]
    CorruptLayer {
        /// The name of the layer
        layer: String,
    },
    /// Compression or decompression failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Bincode encoding failed.
    #[error(transparent)]
    Encode(#[from] bincode::error::EncodeError),
    /// Bincode decoding failed.
    #[error(transparent)]
    Decode(#[from] bincode::error::DecodeError),
}
