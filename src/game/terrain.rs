//! Terrain initialization: tree clustering, decorative patches and the
//! registry of named terrain maps served over the HTTP API.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::config::{PatchParams, TreeParams};
use crate::game::constants::arena;
use crate::game::state::{Patch, Tree};
use crate::util::vec2::Vec2;

/// Cluster placement radius when clustering is 0.
const CLUSTER_RADIUS_LOOSE: f32 = 400.0;
/// Cluster placement radius when clustering is 100.
const CLUSTER_RADIUS_TIGHT: f32 = 50.0;
/// Obstacle cushion for unclustered placement.
const SCATTER_CUSHION: f32 = 60.0;
/// Placement attempts before the cushion rule is waived.
const SCATTER_ATTEMPTS: u32 = 50;
/// Trees keep this far away from the arena edge.
const EDGE_MARGIN: f32 = 40.0;

/// A named terrain configuration selectable via `changeTerrainMap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainMap {
    pub id: String,
    pub name: String,
    pub tree_params: TreeParams,
    pub patch_params: PatchParams,
}

/// Built-in terrain maps. The `default` entry matches the default
/// settings block.
pub fn builtin_maps() -> Vec<TerrainMap> {
    vec![
        TerrainMap {
            id: "default".to_string(),
            name: "Borderlands".to_string(),
            tree_params: TreeParams::default(),
            patch_params: PatchParams::default(),
        },
        TerrainMap {
            id: "forest".to_string(),
            name: "Deep Forest".to_string(),
            tree_params: TreeParams {
                min_trees: 35,
                max_trees: 50,
                tree_size: 56.0,
                tree_size_variance: 20.0,
                cluster_groups: 5,
                clustering: 80.0,
                tree_type: 1,
            },
            patch_params: PatchParams::default(),
        },
        TerrainMap {
            id: "desert".to_string(),
            name: "Dust Bowl".to_string(),
            tree_params: TreeParams {
                min_trees: 4,
                max_trees: 8,
                tree_size: 36.0,
                tree_size_variance: 10.0,
                cluster_groups: 2,
                clustering: 30.0,
                tree_type: 2,
            },
            patch_params: PatchParams::default(),
        },
        TerrainMap {
            id: "sparse".to_string(),
            name: "Open Field".to_string(),
            tree_params: TreeParams {
                min_trees: 8,
                max_trees: 12,
                tree_size: 48.0,
                tree_size_variance: 16.0,
                cluster_groups: 0,
                clustering: 0.0,
                tree_type: 0,
            },
            patch_params: PatchParams::default(),
        },
    ]
}

pub fn find_map(id: &str) -> Option<TerrainMap> {
    builtin_maps().into_iter().find(|m| m.id == id)
}

fn clamp_to_interior(p: Vec2) -> Vec2 {
    Vec2::new(
        p.x.clamp(EDGE_MARGIN, arena::WIDTH - EDGE_MARGIN),
        p.y.clamp(EDGE_MARGIN, arena::HEIGHT - EDGE_MARGIN),
    )
}

/// Generate the tree population for a fresh arena.
pub fn generate_trees(params: &TreeParams, rng: &mut impl Rng) -> Vec<Tree> {
    let count = if params.max_trees > params.min_trees {
        rng.gen_range(params.min_trees..=params.max_trees)
    } else {
        params.min_trees
    };

    let mut trees: Vec<Tree> = Vec::with_capacity(count as usize);

    let clustered = params.clustering > 0.0 && params.cluster_groups > 0;
    let centers: Vec<Vec2> = if clustered {
        (0..params.cluster_groups)
            .map(|_| {
                Vec2::new(
                    rng.gen_range(EDGE_MARGIN * 3.0..arena::WIDTH - EDGE_MARGIN * 3.0),
                    rng.gen_range(EDGE_MARGIN * 3.0..arena::HEIGHT - EDGE_MARGIN * 3.0),
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    // Spread shrinks linearly as clustering goes 0 -> 100
    let spread = CLUSTER_RADIUS_LOOSE
        - (params.clustering.clamp(0.0, 100.0) / 100.0)
            * (CLUSTER_RADIUS_LOOSE - CLUSTER_RADIUS_TIGHT);

    for id in 0..count {
        let size = params.tree_size
            + rng.gen_range(-params.tree_size_variance / 2.0..=params.tree_size_variance / 2.0);

        let position = if clustered {
            let center = centers[rng.gen_range(0..centers.len())];
            let angle = rng.gen_range(0.0..TAU);
            let radius = rng.gen_range(0.0..spread);
            clamp_to_interior(center + Vec2::from_angle(angle) * radius)
        } else {
            scatter_position(&trees, rng)
        };

        let leaf_rotation = rng.gen_range(0.0..TAU);
        trees.push(Tree::new(id, position, size.max(8.0), params.tree_type, leaf_rotation));
    }

    trees
}

/// Random position keeping a cushion from already placed trees; the
/// cushion is waived after enough failed attempts.
fn scatter_position(existing: &[Tree], rng: &mut impl Rng) -> Vec2 {
    for _ in 0..SCATTER_ATTEMPTS {
        let candidate = Vec2::new(
            rng.gen_range(EDGE_MARGIN..arena::WIDTH - EDGE_MARGIN),
            rng.gen_range(EDGE_MARGIN..arena::HEIGHT - EDGE_MARGIN),
        );
        let clear = existing
            .iter()
            .all(|t| t.position.distance_to(candidate) >= SCATTER_CUSHION);
        if clear {
            return candidate;
        }
    }
    Vec2::new(
        rng.gen_range(EDGE_MARGIN..arena::WIDTH - EDGE_MARGIN),
        rng.gen_range(EDGE_MARGIN..arena::HEIGHT - EDGE_MARGIN),
    )
}

/// Generate decorative patches for every enabled patch type.
pub fn generate_patches(params: &PatchParams, rng: &mut impl Rng) -> Vec<Patch> {
    let mut patches = Vec::new();
    let mut id = 0u32;
    for (kind, patch_type) in &params.patch_types {
        if !patch_type.enabled {
            continue;
        }
        for _ in 0..patch_type.quantity {
            let size = patch_type.size
                + rng.gen_range(-patch_type.size_variance / 2.0..=patch_type.size_variance / 2.0);
            patches.push(Patch {
                id,
                position: Vec2::new(
                    rng.gen_range(0.0..arena::WIDTH),
                    rng.gen_range(0.0..arena::HEIGHT),
                ),
                size: size.max(10.0),
                kind: kind.clone(),
                rotation: rng.gen_range(0.0..TAU),
            });
            id += 1;
        }
    }
    patches
}
