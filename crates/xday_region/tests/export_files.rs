//! Write game data to disk and read it back.
#![cfg(feature = "serialize")]

use std::{env, fs, path::PathBuf};

use glam::{IVec2, U8Vec4, UVec2, Vec2};
use xday_region::{
    Building, RegionGridBuilder, RegionInfo, RegionSystem,
    export::{GameRegionJson, load_binary, save_binary, save_json},
};

fn scratch_file(name: &str) -> PathBuf {
    env::temp_dir().join(format!("xday_region_{}_{name}", std::process::id()))
}

fn two_layer_system() -> RegionSystem {
    let mut system = RegionSystem::default();
    for (name, width) in [("ground", 6), ("sky", 3)] {
        let grid = RegionGridBuilder {
            horizontal_count: width,
            vertical_count: 2,
            origin: Vec2::new(10.0, 20.0),
            cell_size: Vec2::new(1.0, 0.5),
        }
        .build()
        .unwrap();
        let key = system.add_layer(name, grid);
        let layer = system.layer_mut(key).unwrap();
        let mut info = RegionInfo::new(format!("{name} west"), U8Vec4::new(1, 2, 3, 4), 7);
        info.prefab_path = Some(format!("prefabs/{name}.prefab"));
        let west = layer.add_region(info);
        let east = layer.add_region(RegionInfo::new(format!("{name} east"), U8Vec4::ONE, 8));
        layer.paint(0, 0, width / 2, 2, west).unwrap();
        layer.paint((width / 2) as i32, 0, width, 2, east).unwrap();
        layer
            .place_building(Building::new(3, IVec2::ZERO, UVec2::ONE))
            .unwrap();
    }
    system
}

#[test]
fn binary_file_keeps_layers_and_grids() {
    let system = two_layer_system();
    let path = scratch_file("game.bytes");
    save_binary(&path, &system).unwrap();
    let data = load_binary(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(data.layers.len(), 2);
    let ground = data.layers.iter().find(|layer| layer.name == "ground").unwrap();
    assert_eq!(ground.grid, vec![1, 1, 1, 2, 2, 2, 1, 1, 1, 2, 2, 2]);
    assert_eq!(ground.origin, Vec2::new(10.0, 20.0));
    assert_eq!(ground.cell_size, Vec2::new(1.0, 0.5));
    let west = &ground.regions[0];
    assert_eq!(west.name, "ground west");
    assert_eq!(west.config_id, 7);
    assert_eq!(west.color, U8Vec4::new(1, 2, 3, 4));
    assert_eq!(west.prefab_path.as_deref(), Some("prefabs/ground.prefab"));
    assert_eq!(west.center, Vec2::new(11.5, 20.5));
    assert_eq!(west.bounds.max, Vec2::new(13.0, 21.0));
    assert_eq!(ground.region_at(5, 1).map(|region| region.config_id), Some(8));

    let sky = data.layers.iter().find(|layer| layer.name == "sky").unwrap();
    assert_eq!(sky.grid, vec![1, 2, 2, 1, 2, 2]);
}

#[test]
fn json_file_matches_summary() {
    let system = two_layer_system();
    let (_, ground) = system.layer_by_name("ground").unwrap();
    let path = scratch_file("ground.json");
    save_json(&path, ground).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let parsed: GameRegionJson = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, GameRegionJson::from_layer(ground));
    assert_eq!(parsed.neighbours[&7], vec![8]);
    assert_eq!(parsed.buildings[0].x, 10.5);
    assert_eq!(parsed.buildings[0].z, 20.25);
}

#[test]
fn missing_file_reports_path() {
    let path = scratch_file("does_not_exist.bytes");
    let err = load_binary(&path).unwrap_err();
    assert!(format!("{err:#}").contains("does_not_exist"));
}
