//! Spatial partitioning for the broad collision phase.
//!
//! The workhorse is a uniform hash grid keyed by `floor(p / cell_size)`.
//! Entities are inserted into every cell their bounds cover, so a query
//! only has to enumerate the cells its own bounds (plus search radius)
//! touch. Above a population threshold an adaptive layer switches to a
//! quadtree with a per-node object cap; the query contract is identical.

use std::cell::RefCell;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::game::constants::spatial::{
    CELL_SIZE, QUADTREE_MAX_DEPTH, QUADTREE_NODE_CAP, QUADTREE_THRESHOLD,
};
use crate::game::state::{EntityId, PlayerId};
use crate::util::bounds::Aabb;

/// Kind-tagged id of anything that lives in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialId {
    Tank(PlayerId),
    Shell(EntityId),
    Tree(u32),
    Upgrade(u32),
}

/// One indexed entity: its tagged id plus broad-phase bounds.
#[derive(Debug, Clone, Copy)]
pub struct SpatialEntry {
    pub id: SpatialId,
    pub bounds: Aabb,
}

type CellKey = (i32, i32);

thread_local! {
    // Reusable dedup set for grid queries, cleared per use. Entities
    // spanning several cells must come back exactly once.
    static QUERY_SEEN: RefCell<HashSet<SpatialId>> = RefCell::new(HashSet::with_capacity(64));
}

/// Uniform hash grid. Rebuilt from entity bounds at the start of every
/// collision pass.
pub struct SpatialHash {
    cell_size: f32,
    inv_cell_size: f32,
    cells: HashMap<CellKey, SmallVec<[SpatialEntry; 4]>>,
    entry_count: usize,
}

impl SpatialHash {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity(256),
            entry_count: 0,
        }
    }

    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
        self.entry_count = 0;
    }

    /// Range of cell keys covered by `bounds`.
    fn cell_range(&self, bounds: &Aabb) -> (i32, i32, i32, i32) {
        let min_x = (bounds.x * self.inv_cell_size).floor() as i32;
        let min_y = (bounds.y * self.inv_cell_size).floor() as i32;
        let max_x = ((bounds.x + bounds.w) * self.inv_cell_size).floor() as i32;
        let max_y = ((bounds.y + bounds.h) * self.inv_cell_size).floor() as i32;
        (min_x, min_y, max_x, max_y)
    }

    /// Insert an entry into every cell its bounds cover.
    pub fn insert(&mut self, entry: SpatialEntry) {
        let (min_x, min_y, max_x, max_y) = self.cell_range(&entry.bounds);
        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                self.cells.entry((cx, cy)).or_default().push(entry);
            }
        }
        self.entry_count += 1;
    }

    /// All entries whose cells are touched by `bounds` grown by
    /// `radius`, deduplicated, excluding `exclude` itself.
    pub fn query(&self, bounds: &Aabb, radius: f32, exclude: Option<SpatialId>) -> Vec<SpatialEntry> {
        let search = bounds.expanded(radius);
        let (min_x, min_y, max_x, max_y) = self.cell_range(&search);

        QUERY_SEEN.with(|seen_cell| {
            let mut seen = seen_cell.borrow_mut();
            seen.clear();

            let mut out = Vec::new();
            for cx in min_x..=max_x {
                for cy in min_y..=max_y {
                    let Some(cell) = self.cells.get(&(cx, cy)) else {
                        continue;
                    };
                    for entry in cell {
                        if Some(entry.id) == exclude {
                            continue;
                        }
                        if seen.insert(entry.id) {
                            out.push(*entry);
                        }
                    }
                }
            }
            out
        })
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}

impl Default for SpatialHash {
    fn default() -> Self {
        Self::new(CELL_SIZE)
    }
}

/// Quadtree node: either a bucket of entries or four children.
struct QuadNode {
    bounds: Aabb,
    entries: Vec<SpatialEntry>,
    children: Option<Box<[QuadNode; 4]>>,
    depth: u32,
}

impl QuadNode {
    fn new(bounds: Aabb, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            depth,
        }
    }

    fn split(&mut self) {
        let hw = self.bounds.w / 2.0;
        let hh = self.bounds.h / 2.0;
        let (x, y) = (self.bounds.x, self.bounds.y);
        let depth = self.depth + 1;
        self.children = Some(Box::new([
            QuadNode::new(Aabb::new(x, y, hw, hh), depth),
            QuadNode::new(Aabb::new(x + hw, y, hw, hh), depth),
            QuadNode::new(Aabb::new(x, y + hh, hw, hh), depth),
            QuadNode::new(Aabb::new(x + hw, y + hh, hw, hh), depth),
        ]));
        // Re-home entries that fit entirely inside one child
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            self.insert(entry);
        }
    }

    fn child_index(&self, bounds: &Aabb) -> Option<usize> {
        let children = self.children.as_ref()?;
        children
            .iter()
            .position(|c| contains_box(&c.bounds, bounds))
    }

    fn insert(&mut self, entry: SpatialEntry) {
        if self.children.is_some() {
            if let Some(idx) = self.child_index(&entry.bounds) {
                self.children.as_mut().unwrap()[idx].insert(entry);
                return;
            }
            self.entries.push(entry);
            return;
        }

        self.entries.push(entry);
        if self.entries.len() > QUADTREE_NODE_CAP && self.depth < QUADTREE_MAX_DEPTH {
            self.split();
        }
    }

    fn query_into(&self, search: &Aabb, out: &mut Vec<SpatialEntry>) {
        if !self.bounds.intersects(search) {
            return;
        }
        for entry in &self.entries {
            if entry.bounds.intersects(search) {
                out.push(*entry);
            }
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_into(search, out);
            }
        }
    }
}

fn contains_box(outer: &Aabb, inner: &Aabb) -> bool {
    inner.x >= outer.x
        && inner.y >= outer.y
        && inner.x + inner.w <= outer.x + outer.w
        && inner.y + inner.h <= outer.y + outer.h
}

/// Quadtree with the same query contract as the hash grid.
pub struct Quadtree {
    root: QuadNode,
    entry_count: usize,
}

impl Quadtree {
    pub fn new(world: Aabb) -> Self {
        Self {
            root: QuadNode::new(world, 0),
            entry_count: 0,
        }
    }

    pub fn insert(&mut self, entry: SpatialEntry) {
        self.root.insert(entry);
        self.entry_count += 1;
    }

    pub fn query(&self, bounds: &Aabb, radius: f32, exclude: Option<SpatialId>) -> Vec<SpatialEntry> {
        let search = bounds.expanded(radius);
        let mut out = Vec::new();
        self.root.query_into(&search, &mut out);
        if let Some(excluded) = exclude {
            out.retain(|e| e.id != excluded);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }
}

/// Broad-phase index that picks grid or quadtree per rebuild based on
/// entity count.
pub enum SpatialIndex {
    Grid(SpatialHash),
    Tree(Quadtree),
}

impl SpatialIndex {
    /// Build the index for this step from all live entity entries.
    pub fn build(world: Aabb, entries: impl IntoIterator<Item = SpatialEntry>) -> Self {
        let entries: Vec<SpatialEntry> = entries.into_iter().collect();
        if entries.len() > QUADTREE_THRESHOLD {
            let mut tree = Quadtree::new(world);
            for entry in entries {
                tree.insert(entry);
            }
            SpatialIndex::Tree(tree)
        } else {
            let mut grid = SpatialHash::default();
            for entry in entries {
                grid.insert(entry);
            }
            SpatialIndex::Grid(grid)
        }
    }

    pub fn query(&self, bounds: &Aabb, radius: f32, exclude: Option<SpatialId>) -> Vec<SpatialEntry> {
        match self {
            SpatialIndex::Grid(grid) => grid.query(bounds, radius, exclude),
            SpatialIndex::Tree(tree) => tree.query(bounds, radius, exclude),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SpatialIndex::Grid(grid) => grid.len(),
            SpatialIndex::Tree(tree) => tree.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::arena;
    use crate::util::vec2::Vec2;
    use uuid::Uuid;

    fn entry(id: SpatialId, x: f32, y: f32, size: f32) -> SpatialEntry {
        SpatialEntry {
            id,
            bounds: Aabb::from_center(Vec2::new(x, y), size, size),
        }
    }

    fn world() -> Aabb {
        Aabb::new(0.0, 0.0, arena::WIDTH, arena::HEIGHT)
    }

    #[test]
    fn grid_finds_nearby_entity() {
        let mut grid = SpatialHash::default();
        let id = SpatialId::Tank(Uuid::new_v4());
        grid.insert(entry(id, 100.0, 100.0, 40.0));

        let probe = Aabb::from_center(Vec2::new(110.0, 100.0), 6.0, 6.0);
        let found = grid.query(&probe, 25.0, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
    }

    #[test]
    fn grid_misses_distant_entity() {
        let mut grid = SpatialHash::default();
        grid.insert(entry(SpatialId::Tree(1), 1000.0, 800.0, 12.0));

        let probe = Aabb::from_center(Vec2::new(100.0, 100.0), 6.0, 6.0);
        assert!(grid.query(&probe, 25.0, None).is_empty());
    }

    #[test]
    fn grid_excludes_the_querying_entity() {
        let mut grid = SpatialHash::default();
        let me = SpatialId::Shell(3);
        grid.insert(entry(me, 100.0, 100.0, 6.0));
        grid.insert(entry(SpatialId::Tank(Uuid::new_v4()), 105.0, 100.0, 40.0));

        let probe = Aabb::from_center(Vec2::new(100.0, 100.0), 6.0, 6.0);
        let found = grid.query(&probe, 25.0, Some(me));
        assert_eq!(found.len(), 1);
        assert!(!matches!(found[0].id, SpatialId::Shell(3)));
    }

    #[test]
    fn entity_spanning_cells_is_returned_once() {
        let mut grid = SpatialHash::default();
        let id = SpatialId::Tank(Uuid::new_v4());
        // 40px box centered on a 50px cell boundary covers two cells
        grid.insert(entry(id, 50.0, 25.0, 40.0));

        let probe = Aabb::from_center(Vec2::new(50.0, 25.0), 60.0, 60.0);
        let found = grid.query(&probe, 0.0, None);
        assert_eq!(found.len(), 1, "spanning entity must be deduplicated");
    }

    #[test]
    fn grid_search_radius_extends_reach() {
        let mut grid = SpatialHash::default();
        let id = SpatialId::Upgrade(4);
        grid.insert(entry(id, 160.0, 100.0, 32.0));

        let probe = Aabb::from_center(Vec2::new(90.0, 100.0), 6.0, 6.0);
        assert!(grid.query(&probe, 0.0, None).is_empty());
        assert_eq!(grid.query(&probe, 60.0, None).len(), 1);
    }

    #[test]
    fn quadtree_query_matches_grid_semantics() {
        let mut tree = Quadtree::new(world());
        let mut grid = SpatialHash::default();
        let mut rng_positions = Vec::new();
        for i in 0..150u32 {
            let x = 50.0 + (i % 15) as f32 * 90.0;
            let y = 50.0 + (i / 15) as f32 * 80.0;
            rng_positions.push((i, x, y));
            tree.insert(entry(SpatialId::Tree(i), x, y, 12.0));
            grid.insert(entry(SpatialId::Tree(i), x, y, 12.0));
        }

        let probe = Aabb::from_center(Vec2::new(400.0, 300.0), 40.0, 30.0);
        let mut from_tree: Vec<_> = tree
            .query(&probe, 25.0, None)
            .iter()
            .map(|e| e.id)
            .collect();
        let mut from_grid: Vec<_> = grid
            .query(&probe, 25.0, None)
            .iter()
            .map(|e| e.id)
            .collect();
        let key = |id: &SpatialId| match id {
            SpatialId::Tree(i) => *i,
            _ => u32::MAX,
        };
        from_tree.sort_by_key(key);
        from_grid.sort_by_key(key);
        // The quadtree prunes by actual AABB intersection, so it returns a
        // subset of the grid's cell-union candidates; every hit it reports
        // must also be a grid candidate.
        for id in &from_tree {
            assert!(from_grid.contains(id));
        }
        assert!(!from_tree.is_empty());
    }

    #[test]
    fn adaptive_index_switches_representation() {
        let few: Vec<SpatialEntry> = (0..10)
            .map(|i| entry(SpatialId::Tree(i), 100.0 + i as f32 * 60.0, 100.0, 12.0))
            .collect();
        assert!(matches!(
            SpatialIndex::build(world(), few),
            SpatialIndex::Grid(_)
        ));

        let many: Vec<SpatialEntry> = (0..150)
            .map(|i| {
                entry(
                    SpatialId::Tree(i),
                    50.0 + (i % 20) as f32 * 70.0,
                    50.0 + (i / 20) as f32 * 100.0,
                    12.0,
                )
            })
            .collect();
        let index = SpatialIndex::build(world(), many);
        assert!(matches!(index, SpatialIndex::Tree(_)));
        assert_eq!(index.len(), 150);
    }

    #[test]
    fn quadtree_splits_past_node_cap() {
        let mut tree = Quadtree::new(world());
        for i in 0..40u32 {
            tree.insert(entry(
                SpatialId::Shell(i as u64),
                20.0 + i as f32 * 5.0,
                20.0,
                6.0,
            ));
        }
        assert_eq!(tree.len(), 40);
        let probe = Aabb::from_center(Vec2::new(40.0, 20.0), 10.0, 10.0);
        assert!(!tree.query(&probe, 5.0, None).is_empty());
    }
}
