//! A [`RegionLayer`] is one named grid together with the regions painted into it and the
//! buildings placed on top of them.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use bevy_tasks::{ComputeTaskPool, TaskPool};
use glam::{IVec2, UVec2, Vec2};
use slotmap::SlotMap;
use thiserror::Error;

use crate::{
    Aabb2d, CurveSettings, GridData, GridRepair, MeshLodConfig, NeighbourCount, Outline,
    OutlineError, PathFinderSettings, RegionGrid, RegionId, RegionInfo, RegionMesh, RepairReport,
    curve_outline, path::AStarPathFinder,
};

slotmap::new_key_type! {
    /// A key into the buildings of a [`RegionLayer`].
    pub struct BuildingKey;
}

/// A building occupying a rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Building {
    /// The game config of the building
    pub config_id: u32,
    /// The lower-left cell of the footprint
    pub coordinate: IVec2,
    /// The footprint in cells
    pub size: UVec2,
    /// The upgrade level
    pub level: u32,
}

impl Building {
    /// Creates a level 1 building.
    pub fn new(config_id: u32, coordinate: IVec2, size: UVec2) -> Self {
        Self {
            config_id,
            coordinate,
            size,
            level: 1,
        }
    }

    /// The cells covered by the building, in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = IVec2> + '_ {
        let min = self.coordinate;
        (0..self.size.y as i32)
            .flat_map(move |y| (0..self.size.x as i32).map(move |x| min + IVec2::new(x, y)))
    }
}

/// One named grid of regions.
#[derive(Debug, Clone)]
pub struct RegionLayer {
    name: String,
    grid: RegionGrid,
    regions: BTreeMap<RegionId, RegionInfo>,
    buildings: SlotMap<BuildingKey, Building>,
    /// Which building covers a cell
    occupied: HashMap<IVec2, BuildingKey>,
    neighbour_count: NeighbourCount,
}

/// The meshes of one region for one level of detail.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMeshes {
    /// The region the meshes belong to
    pub region: RegionId,
    /// The filled area of the region
    pub fill: RegionMesh,
    /// The strip along the inside of the outline. Empty if the border width is zero.
    pub border: RegionMesh,
}

impl RegionLayer {
    /// Creates a layer around an existing grid. Region IDs already painted into the grid have no
    /// [`RegionInfo`] until one is registered with [`RegionLayer::insert_region`].
    pub fn new(name: impl Into<String>, grid: RegionGrid) -> Self {
        Self {
            name: name.into(),
            grid,
            regions: BTreeMap::new(),
            buildings: SlotMap::with_key(),
            occupied: HashMap::new(),
            neighbour_count: NeighbourCount::default(),
        }
    }

    /// The name of the layer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The grid of the layer. Paint through [`RegionLayer::paint`].
    pub fn grid(&self) -> &RegionGrid {
        &self.grid
    }

    /// The neighbourhood used when searching paths on this layer.
    pub fn neighbour_count(&self) -> NeighbourCount {
        self.neighbour_count
    }

    /// Sets the neighbourhood used when searching paths on this layer.
    pub fn set_neighbour_count(&mut self, neighbour_count: NeighbourCount) {
        self.neighbour_count = neighbour_count;
    }

    /// Registers a region under the lowest free ID.
    pub fn add_region(&mut self, info: RegionInfo) -> RegionId {
        // Keys are sorted, so the first gap is the lowest free ID.
        let mut id = RegionId(1);
        for key in self.regions.keys() {
            if *key != id {
                break;
            }
            id = RegionId(id.0 + 1);
        }
        self.regions.insert(id, info);
        id
    }

    /// Registers a region under a given ID, returning the info it replaces.
    pub fn insert_region(
        &mut self,
        id: RegionId,
        info: RegionInfo,
    ) -> Result<Option<RegionInfo>, LayerError> {
        if id.is_none() {
            return Err(LayerError::ReservedRegionId);
        }
        Ok(self.regions.insert(id, info))
    }

    /// The info of a region.
    pub fn region(&self, id: RegionId) -> Option<&RegionInfo> {
        self.regions.get(&id)
    }

    /// Mutable access to the info of a region.
    pub fn region_mut(&mut self, id: RegionId) -> Option<&mut RegionInfo> {
        self.regions.get_mut(&id)
    }

    /// All registered regions, sorted by ID.
    pub fn regions(&self) -> impl Iterator<Item = (RegionId, &RegionInfo)> {
        self.regions.iter().map(|(id, info)| (*id, info))
    }

    /// Unregisters a region, clears its cells and removes the buildings standing on it.
    pub fn remove_region(&mut self, id: RegionId) -> Option<RegionInfo> {
        let info = self.regions.remove(&id)?;
        let doomed: Vec<_> = self
            .buildings
            .iter()
            .filter(|(_, building)| self.grid.region_at(building.coordinate) == id)
            .map(|(key, _)| key)
            .collect();
        for key in doomed {
            self.remove_building(key);
        }
        let cleared = self.grid.replace_region(id, RegionId::NONE);
        tracing::debug!(
            "Removed region {} ({}) from layer {}, cleared {cleared} cells",
            id.0,
            info.name,
            self.name
        );
        Some(info)
    }

    /// Paints the `width * height` cells starting at `(x, y)`. Painting [`RegionId::NONE`] erases.
    ///
    /// The rectangle is clamped to the grid. Returns the number of cells written.
    pub fn paint(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        region: RegionId,
    ) -> Result<usize, LayerError> {
        if region.is_some() && !self.regions.contains_key(&region) {
            return Err(LayerError::UnknownRegion { region });
        }
        Ok(self.grid.set_region(x, y, width, height, region))
    }

    /// Runs the repair passes over the grid of this layer.
    pub fn repair(&mut self, repair: &GridRepair) -> RepairReport {
        let report = repair.run(&mut self.grid);
        let unknown: BTreeSet<_> = self
            .grid
            .region_ids()
            .into_iter()
            .filter(|id| !self.regions.contains_key(id))
            .collect();
        if !unknown.is_empty() {
            tracing::warn!(
                "Layer {} contains cells of unregistered regions {unknown:?}",
                self.name
            );
        }
        report
    }

    /// Pairs of different regions that share at least one cell side.
    ///
    /// Every region that touches another appears as a key, with the regions it touches.
    pub fn region_neighbours(&self) -> BTreeMap<RegionId, BTreeSet<RegionId>> {
        let mut neighbours: BTreeMap<RegionId, BTreeSet<RegionId>> = BTreeMap::new();
        let grid = &self.grid;
        for y in 0..grid.vertical_count() as i32 {
            for x in 0..grid.horizontal_count() as i32 {
                let region = grid.region_id(x, y);
                if region.is_none() {
                    continue;
                }
                // Right and top are enough to see every shared side once.
                for other in [grid.region_id(x + 1, y), grid.region_id(x, y + 1)] {
                    if other.is_some() && other != region {
                        neighbours.entry(region).or_default().insert(other);
                        neighbours.entry(other).or_default().insert(region);
                    }
                }
            }
        }
        neighbours
    }

    /// The average of the cell centers of a region. May lie outside of concave regions.
    pub fn region_center(&self, id: RegionId) -> Option<Vec2> {
        let cells = self.grid.coordinates_of(id);
        if cells.is_empty() {
            return None;
        }
        let sum: Vec2 = cells
            .iter()
            .map(|cell| self.grid.coordinate_to_center_position(cell.x, cell.y))
            .sum();
        Some(sum / cells.len() as f32)
    }

    /// The area covered by the cells of a region.
    pub fn region_bounds(&self, id: RegionId) -> Option<Aabb2d> {
        let cells = self.grid.coordinates_of(id);
        let first = *cells.first()?;
        let (min, max) = cells
            .iter()
            .fold((first, first), |(min, max), cell| (min.min(*cell), max.max(*cell)));
        Some(Aabb2d {
            min: self.grid.coordinate_to_position(min.x, min.y),
            max: self.grid.coordinate_to_position(max.x + 1, max.y + 1),
        })
    }

    /// Places a building. The footprint must lie on the grid, inside a single region, and must
    /// not overlap another building.
    pub fn place_building(&mut self, building: Building) -> Result<BuildingKey, LayerError> {
        if building.size.min_element() == 0 {
            return Err(LayerError::EmptyFootprint);
        }
        let region = self.grid.region_at(building.coordinate);
        for cell in building.cells() {
            if !self.grid.contains(cell.x, cell.y) {
                return Err(LayerError::BuildingOutOfBounds { coordinate: cell });
            }
            let cell_region = self.grid.region_at(cell);
            if cell_region.is_none() || cell_region != region {
                return Err(LayerError::BuildingOutsideRegion { coordinate: cell });
            }
            if let Some(other) = self.occupied.get(&cell) {
                return Err(LayerError::BuildingOverlap {
                    coordinate: cell,
                    other: *other,
                });
            }
        }
        let key = self.buildings.insert(building);
        for cell in building.cells() {
            self.occupied.insert(cell, key);
        }
        Ok(key)
    }

    /// Removes a building.
    pub fn remove_building(&mut self, key: BuildingKey) -> Option<Building> {
        let building = self.buildings.remove(key)?;
        for cell in building.cells() {
            self.occupied.remove(&cell);
        }
        Some(building)
    }

    /// A placed building.
    pub fn building(&self, key: BuildingKey) -> Option<&Building> {
        self.buildings.get(key)
    }

    /// The building covering a cell.
    pub fn building_at(&self, coordinate: IVec2) -> Option<BuildingKey> {
        self.occupied.get(&coordinate).copied()
    }

    /// All placed buildings.
    pub fn buildings(&self) -> impl Iterator<Item = (BuildingKey, &Building)> {
        self.buildings.iter()
    }

    /// Traces the outline of every region in the grid, one task per region on the compute task
    /// pool. Results are sorted by region.
    ///
    /// A failing region is logged and returned as an error, the others are unaffected.
    pub fn build_outlines(&self) -> Vec<(RegionId, Result<Outline, OutlineError>)> {
        let grid = &self.grid;
        let regions = grid.region_ids();
        let mut outlines = ComputeTaskPool::get_or_init(TaskPool::default).scope(|scope| {
            for region in regions {
                scope.spawn(async move {
                    let cells = grid.coordinates_of(region);
                    (region, grid.trace_outline(region, &cells))
                });
            }
        });
        outlines.sort_unstable_by_key(|(region, _)| *region);
        for (_, result) in &outlines {
            if let Err(err) = result {
                tracing::warn!("Layer {}: {err}", self.name);
            }
        }
        outlines
    }

    /// Builds the fill and border meshes of every region for one level of detail.
    ///
    /// Regions whose outline or mesh cannot be built are logged and left out.
    pub fn build_meshes(&self, lod: &MeshLodConfig) -> Vec<RegionMeshes> {
        let settings = CurveSettings {
            border_size: lod.border_size,
            corner_segments: lod.corner_segments,
        };
        let mut meshes = Vec::new();
        for (region, outline) in self.build_outlines() {
            let Ok(outline) = outline else {
                continue;
            };
            let vertices = if lod.corner_segments == 0 {
                outline.vertices
            } else {
                curve_outline(&outline.vertices, settings)
            };
            let fill = match RegionMesh::fill(&vertices, lod.height) {
                Ok(fill) => fill,
                Err(err) => {
                    tracing::warn!(
                        "Layer {}: skipping mesh of region {}: {err}",
                        self.name,
                        region.0
                    );
                    continue;
                }
            };
            let border = if lod.border_width > 0.0 {
                match RegionMesh::border(&vertices, lod.border_width, lod.height) {
                    Ok(border) => border,
                    Err(err) => {
                        tracing::warn!(
                            "Layer {}: skipping border of region {}: {err}",
                            self.name,
                            region.0
                        );
                        RegionMesh::default()
                    }
                }
            } else {
                RegionMesh::default()
            };
            meshes.push(RegionMeshes {
                region,
                fill,
                border,
            });
        }
        meshes
    }

    /// Creates a path finder over a snapshot of this layer. Later edits of the layer are not
    /// seen by the path finder.
    pub fn path_finder(&self, settings: PathFinderSettings) -> AStarPathFinder<RegionLayer> {
        AStarPathFinder::with_settings(Arc::new(self.clone()), settings)
    }
}

/// Cells are walkable if they belong to a region and no building stands on them.
impl GridData for RegionLayer {
    fn horizontal_count(&self) -> u32 {
        self.grid.horizontal_count()
    }

    fn vertical_count(&self) -> u32 {
        self.grid.vertical_count()
    }

    fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.grid.region_id(x, y).is_some() && !self.occupied.contains_key(&IVec2::new(x, y))
    }

    fn position_to_coordinate(&self, position: Vec2) -> IVec2 {
        self.grid.position_to_coordinate(position)
    }

    fn coordinate_to_center_position(&self, coordinate: IVec2) -> Vec2 {
        self.grid
            .coordinate_to_center_position(coordinate.x, coordinate.y)
    }

    fn cost(&self, from: IVec2, to: IVec2) -> f32 {
        ((to - from).as_vec2() * self.grid.cell_size()).length()
    }

    fn heuristic(&self, from: IVec2, to: IVec2) -> f32 {
        let delta = (to - from).abs().as_vec2() * self.grid.cell_size();
        match self.neighbour_count {
            NeighbourCount::Four => delta.x + delta.y,
            NeighbourCount::Eight => delta.length(),
        }
    }

    fn neighbour_count(&self) -> NeighbourCount {
        self.neighbour_count
    }
}

/// Errors that can occur when editing a [`RegionLayer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// Painting with a region that was never registered.
    #[error("Region {} is not registered in this layer", region.0)]
    UnknownRegion {
        /// The unregistered region
        region: RegionId,
    },
    /// Registering a region under [`RegionId::NONE`].
    #[error("Region ID 0 is reserved for cells without a region")]
    ReservedRegionId,
    /// A building with a zero-sized footprint.
    #[error("Building footprint is empty")]
    EmptyFootprint,
    /// A building cell lies off the grid.
    #[error("Building cell {coordinate} is outside of the grid")]
    BuildingOutOfBounds {
        /// The offending cell
        coordinate: IVec2,
    },
    /// A building cell is not part of the region under the building's first cell.
    #[error("Building cell {coordinate} is not inside the building's region")]
    BuildingOutsideRegion {
        /// The offending cell
        coordinate: IVec2,
    },
    /// A building cell is already covered by another building.
    #[error("Building cell {coordinate} is already occupied")]
    BuildingOverlap {
        /// The offending cell
        coordinate: IVec2,
        /// The building covering the cell
        other: BuildingKey,
    },
}
