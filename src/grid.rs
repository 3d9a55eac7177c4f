use alife_common::{wrap_position, SimParams, Vec2, NEAR_ZERO};
use rayon::prelude::*;

use crate::entities::Cluster;

/// Address of a cell inside the world's cluster table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub cluster: u32,
    pub cell: u32,
}

/// Occupant of one grid slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridEntry {
    pub cell: CellRef,
    /// World position of the cell when the index was built.
    pub pos: Vec2,
}

/// Per-cluster data the index needs for mass filtering and bearings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSummary {
    pub id: u64,
    pub mass: f32,
    pub pos: Vec2,
}

// Calculates the 1D grid cell index for a given position, wrapping around
// the world edges.
#[inline(always)]
pub fn get_grid_cell_idx(pos: Vec2, params: &SimParams) -> u32 {
    let p = wrap_position(pos, params.world_size());
    let grid_x = (p.x.floor() as u32).min(params.grid_dim_x - 1);
    let grid_y = (p.y.floor() as u32).min(params.grid_dim_y - 1);
    grid_y * params.grid_dim_x + grid_x
}

/// Toroidal grid mapping unit squares of the world to the cell occupying
/// them. Read-only while tokens are processed; rebuilt once per tick.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    params: SimParams,
    slots: Vec<Option<GridEntry>>,
    clusters: Vec<ClusterSummary>,
}

impl SpatialIndex {
    pub fn new(params: &SimParams) -> Self {
        Self {
            params: params.clone(),
            slots: vec![None; params.num_grid_cells as usize],
            clusters: Vec::new(),
        }
    }

    /// Removes every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.clusters.clear();
    }

    /// Registers a cell at `pos`. Returns false (and leaves the slot alone)
    /// when another cell already occupies it.
    pub fn register_cell(&mut self, cell: CellRef, pos: Vec2) -> bool {
        let idx = get_grid_cell_idx(pos, &self.params) as usize;
        match self.slots[idx] {
            Some(existing) if existing.cell != cell => false,
            _ => {
                self.slots[idx] = Some(GridEntry { cell, pos: wrap_position(pos, self.params.world_size()) });
                true
            }
        }
    }

    /// Clears the slot at `pos` if `cell` holds it.
    pub fn unregister_cell(&mut self, cell: CellRef, pos: Vec2) {
        let idx = get_grid_cell_idx(pos, &self.params) as usize;
        if matches!(self.slots[idx], Some(existing) if existing.cell == cell) {
            self.slots[idx] = None;
        }
    }

    pub fn cell_at(&self, pos: Vec2) -> Option<GridEntry> {
        self.slots[get_grid_cell_idx(pos, &self.params) as usize]
    }

    pub fn cluster(&self, cluster: u32) -> Option<&ClusterSummary> {
        self.clusters.get(cluster as usize)
    }

    /// Rebuilds the index from the clusters' current positions.
    /// World positions are computed in parallel; slots are written serially in
    /// cluster/cell order so that collisions resolve deterministically.
    pub fn rebuild(&mut self, clusters: &[Cluster]) {
        self.clear();
        let world_size = self.params.world_size();

        let placements: Vec<Vec<(CellRef, Vec2)>> = clusters
            .par_iter()
            .enumerate()
            .map(|(cluster_idx, cluster)| {
                (0..cluster.cells.len())
                    .map(|cell_idx| {
                        let cell_ref = CellRef { cluster: cluster_idx as u32, cell: cell_idx as u32 };
                        (cell_ref, cluster.cell_world_pos(cell_idx, world_size))
                    })
                    .collect()
            })
            .collect();

        self.clusters = clusters
            .iter()
            .map(|c| ClusterSummary { id: c.id, mass: c.mass(), pos: c.pos })
            .collect();

        let mut collisions = 0usize;
        for (cell_ref, pos) in placements.into_iter().flatten() {
            if !self.register_cell(cell_ref, pos) {
                collisions += 1;
            }
        }
        if collisions > 0 {
            log::debug!("Spatial index rebuild: {} cells share a slot with an earlier cell.", collisions);
        }
    }

    /// Finds a cluster other than `exclude` with a cell within `radius` of
    /// `pos` and mass inside `[mass_min, mass_max]`. Slots are scanned by
    /// increasing distance from the slot holding `pos` (row then column on
    /// equal distance), so the first hit is the nearest candidate.
    pub fn find_nearby_cluster(
        &self,
        pos: Vec2,
        radius: f32,
        mass_min: f32,
        mass_max: f32,
        exclude: Option<u32>,
    ) -> Option<u32> {
        let center_x = pos.x.floor() as i64;
        let center_y = pos.y.floor() as i64;

        scan_offsets(radius).into_iter().find_map(|(dx, dy)| {
            let probe = Vec2::new((center_x + dx) as f32 + 0.5, (center_y + dy) as f32 + 0.5);
            let entry = self.cell_at(probe)?;
            if Some(entry.cell.cluster) == exclude {
                return None;
            }
            let summary = self.cluster(entry.cell.cluster)?;
            (summary.mass >= mass_min - NEAR_ZERO && summary.mass <= mass_max + NEAR_ZERO)
                .then_some(entry.cell.cluster)
        })
    }

    /// Calls `f` for every occupied slot in the 3x3 block around `pos`.
    pub fn for_each_neighbor<F>(&self, pos: Vec2, mut f: F)
    where
        F: FnMut(GridEntry),
    {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if let Some(entry) = self.cell_at(pos + Vec2::new(dx as f32, dy as f32)) {
                    f(entry);
                }
            }
        }
    }
}

/// Slot offsets within `radius`, nearest first. Ties are broken by row,
/// then by column.
fn scan_offsets(radius: f32) -> Vec<(i64, i64)> {
    let max = radius.max(0.0).floor() as i64;
    let radius_sq = radius * radius;
    let mut offsets: Vec<(i64, i64)> = (-max..=max)
        .flat_map(|dy| (-max..=max).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| (dx * dx + dy * dy) as f32 <= radius_sq)
        .collect();
    offsets.sort_by_key(|&(dx, dy)| (dx * dx + dy * dy, dy, dx));
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Cell, CellFunction};

    fn params() -> SimParams {
        SimParams::default().with_world_size(50, 40)
    }

    fn cluster_at(id: u64, pos: Vec2, num_cells: usize) -> Cluster {
        let cells = (0..num_cells)
            .map(|i| Cell {
                id: id * 100 + i as u64,
                rel_pos: Vec2::new(i as f32 - (num_cells as f32 - 1.0) / 2.0, 0.0),
                energy: 100.0,
                max_connections: 2,
                connections: Vec::new(),
                token_branch_number: 0,
                color: 0,
                function: CellFunction::None,
            })
            .collect();
        Cluster { id, pos, vel: Vec2::zero(), angle: 0.0, angular_vel: 0.0, cells, tokens: Vec::new() }
    }

    #[test]
    fn lookups_wrap_around_the_world() {
        let mut index = SpatialIndex::new(&params());
        let cell = CellRef { cluster: 0, cell: 0 };
        assert!(index.register_cell(cell, Vec2::new(49.5, 0.2)));
        assert_eq!(index.cell_at(Vec2::new(-0.5, 40.2)).map(|e| e.cell), Some(cell));

        index.clear();
        assert!(index.cell_at(Vec2::new(49.5, 0.2)).is_none());
    }

    #[test]
    fn first_registration_keeps_the_slot() {
        let mut index = SpatialIndex::new(&params());
        let a = CellRef { cluster: 0, cell: 0 };
        let b = CellRef { cluster: 1, cell: 0 };
        assert!(index.register_cell(a, Vec2::new(3.2, 3.2)));
        assert!(!index.register_cell(b, Vec2::new(3.7, 3.9)));
        assert_eq!(index.cell_at(Vec2::new(3.5, 3.5)).map(|e| e.cell), Some(a));

        // only the holder can free the slot
        index.unregister_cell(b, Vec2::new(3.7, 3.9));
        assert!(index.cell_at(Vec2::new(3.5, 3.5)).is_some());
        index.unregister_cell(a, Vec2::new(3.2, 3.2));
        assert!(index.cell_at(Vec2::new(3.5, 3.5)).is_none());
        assert!(index.register_cell(b, Vec2::new(3.7, 3.9)));
    }

    #[test]
    fn nearby_search_respects_mass_band_and_exclusion() {
        let clusters = vec![
            cluster_at(1, Vec2::new(10.5, 10.5), 1),
            cluster_at(2, Vec2::new(14.5, 10.5), 3),
            cluster_at(3, Vec2::new(10.5, 20.5), 5),
        ];
        let mut index = SpatialIndex::new(&params());
        index.rebuild(&clusters);

        let from = Vec2::new(10.5, 10.5);
        assert_eq!(index.find_nearby_cluster(from, 20.0, 0.0, 100.0, Some(0)), Some(1));
        assert_eq!(index.find_nearby_cluster(from, 20.0, 4.0, 100.0, Some(0)), Some(2));
        assert_eq!(index.find_nearby_cluster(from, 5.0, 4.0, 100.0, Some(0)), None);
        assert_eq!(index.find_nearby_cluster(from, 20.0, 0.0, 100.0, None), Some(0));
    }

    #[test]
    fn nearby_search_prefers_the_euclidean_nearest() {
        // a diagonal neighbor three slots out is farther than a straight one four out
        let clusters = vec![
            cluster_at(1, Vec2::new(10.5, 10.5), 1),
            cluster_at(2, Vec2::new(13.5, 7.5), 1),
            cluster_at(3, Vec2::new(14.5, 10.5), 1),
        ];
        let mut index = SpatialIndex::new(&params());
        index.rebuild(&clusters);
        assert_eq!(index.find_nearby_cluster(Vec2::new(10.5, 10.5), 6.0, 0.0, 10.0, Some(0)), Some(2));
    }

    #[test]
    fn scan_offsets_grow_in_distance() {
        let offsets = scan_offsets(3.0);
        assert_eq!(offsets[0], (0, 0));
        assert_eq!(offsets[1], (0, -1));
        assert!(offsets.windows(2).all(|w| {
            let d = |(x, y): (i64, i64)| x * x + y * y;
            d(w[0]) <= d(w[1])
        }));
        assert!(!offsets.contains(&(3, 3)));
        assert!(offsets.contains(&(3, 0)));
    }

    #[test]
    fn nearby_search_crosses_the_boundary() {
        let clusters = vec![cluster_at(1, Vec2::new(1.5, 1.5), 1), cluster_at(2, Vec2::new(48.5, 1.5), 1)];
        let mut index = SpatialIndex::new(&params());
        index.rebuild(&clusters);
        assert_eq!(index.find_nearby_cluster(Vec2::new(1.5, 1.5), 5.0, 0.0, 10.0, Some(0)), Some(1));
    }
}
