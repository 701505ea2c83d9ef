use slotmap::SlotMap;

use crate::{AStarPathFinder, RegionGrid, RegionLayer, RegionSystemConfig, RepairReport};

slotmap::new_key_type! {
    /// A key into the layers of a [`RegionSystem`].
    pub struct LayerKey;
}

/// A set of [`RegionLayer`]s sharing one configuration.
#[derive(Debug, Clone, Default)]
pub struct RegionSystem {
    config: RegionSystemConfig,
    layers: SlotMap<LayerKey, RegionLayer>,
}

impl RegionSystem {
    /// Creates an empty system.
    pub fn new(config: RegionSystemConfig) -> Self {
        Self {
            config,
            layers: SlotMap::with_key(),
        }
    }

    /// The configuration of the system.
    pub fn config(&self) -> &RegionSystemConfig {
        &self.config
    }

    /// Adds a layer around `grid`, using the configured neighbourhood for path finding.
    pub fn add_layer(&mut self, name: impl Into<String>, grid: RegionGrid) -> LayerKey {
        let mut layer = RegionLayer::new(name, grid);
        layer.set_neighbour_count(self.config.neighbour_count);
        self.insert_layer(layer)
    }

    /// Adds an existing layer as it is.
    pub fn insert_layer(&mut self, layer: RegionLayer) -> LayerKey {
        if self.layer_by_name(layer.name()).is_some() {
            tracing::warn!(
                "Adding a second layer named {}, lookups by name will find the first one",
                layer.name()
            );
        }
        self.layers.insert(layer)
    }

    /// A layer.
    pub fn layer(&self, key: LayerKey) -> Option<&RegionLayer> {
        self.layers.get(key)
    }

    /// A layer, for editing.
    pub fn layer_mut(&mut self, key: LayerKey) -> Option<&mut RegionLayer> {
        self.layers.get_mut(key)
    }

    /// The first layer with the given name.
    pub fn layer_by_name(&self, name: &str) -> Option<(LayerKey, &RegionLayer)> {
        self.layers.iter().find(|(_, layer)| layer.name() == name)
    }

    /// Removes a layer.
    pub fn remove_layer(&mut self, key: LayerKey) -> Option<RegionLayer> {
        self.layers.remove(key)
    }

    /// All layers.
    pub fn layers(&self) -> impl Iterator<Item = (LayerKey, &RegionLayer)> {
        self.layers.iter()
    }

    /// Runs the repair passes on every layer.
    pub fn repair_all(&mut self) -> Vec<(LayerKey, RepairReport)> {
        let repair = self.config.grid_repair();
        self.layers
            .iter_mut()
            .map(|(key, layer)| (key, layer.repair(&repair)))
            .collect()
    }

    /// A path finder over a snapshot of a layer, using the configured settings.
    pub fn path_finder(&self, key: LayerKey) -> Option<AStarPathFinder<RegionLayer>> {
        self.layers
            .get(key)
            .map(|layer| layer.path_finder(self.config.path_finder))
    }
}

#[cfg(test)]
mod tests {
    use glam::U8Vec4;

    use super::*;
    use crate::{NeighbourCount, RegionGridBuilder, RegionId, RegionInfo, RegionSystemConfigBuilder};

    fn grid() -> RegionGrid {
        RegionGridBuilder {
            horizontal_count: 3,
            vertical_count: 3,
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn layers_are_addressed_by_key_and_name() {
        let mut system = RegionSystem::new(
            RegionSystemConfigBuilder {
                neighbour_count: NeighbourCount::Eight,
                ..Default::default()
            }
            .build(),
        );
        let ground = system.add_layer("ground", grid());
        let water = system.add_layer("water", grid());
        assert_eq!(system.layers().count(), 2);
        assert_eq!(system.layer_by_name("water").map(|(key, _)| key), Some(water));
        assert_eq!(
            system.layer(ground).map(RegionLayer::neighbour_count),
            Some(NeighbourCount::Eight)
        );
        assert!(system.remove_layer(ground).is_some());
        assert!(system.layer(ground).is_none());
        assert!(system.layer_by_name("ground").is_none());
    }

    #[test]
    fn repair_all_reports_per_layer() {
        let mut system = RegionSystem::default();
        let key = system.add_layer("ground", grid());
        let layer = system.layer_mut(key).unwrap();
        let region = layer.add_region(RegionInfo::new("a", U8Vec4::ONE, 1));
        layer.paint(0, 0, 1, 1, region).unwrap();

        let reports = system.repair_all();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, key);
        // Every empty cell was given the only region.
        assert_eq!(reports[0].1.changed_cell_count(), 8);
        let layer = system.layer(key).unwrap();
        assert!(layer.grid().cells().iter().all(|cell| *cell == RegionId(1)));
    }
}
