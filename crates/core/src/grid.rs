//! Cell-based spatial index used for collision and view queries.
//!
//! Entities are keyed by an opaque id and indexed by every cell their AABB
//! covers. Queries may return false positives near cell boundaries; callers
//! re-test the precise predicate (distance, containment) themselves.

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_width: f32,
    cell_height: f32,
    cols: usize,
    rows: usize,
    cells: Vec<HashSet<u64>>,
}

impl SpatialGrid {
    pub fn new(field_width: f32, field_height: f32, cell_width: f32, cell_height: f32) -> Self {
        let cols = ((field_width / cell_width).ceil() as usize).max(1);
        let rows = ((field_height / cell_height).ceil() as usize).max(1);
        Self {
            cell_width,
            cell_height,
            cols,
            rows,
            cells: vec![HashSet::new(); cols * rows],
        }
    }

    fn clamp_col(&self, x: f32) -> usize {
        let c = (x / self.cell_width).floor();
        if c < 0.0 {
            0
        } else {
            (c as usize).min(self.cols - 1)
        }
    }

    fn clamp_row(&self, y: f32) -> usize {
        let r = (y / self.cell_height).floor();
        if r < 0.0 {
            0
        } else {
            (r as usize).min(self.rows - 1)
        }
    }

    pub fn cell_of(&self, x: f32, y: f32) -> (usize, usize) {
        (self.clamp_col(x), self.clamp_row(y))
    }

    fn index(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }

    fn cell_range(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> (usize, usize, usize, usize) {
        (
            self.clamp_col(min_x),
            self.clamp_row(min_y),
            self.clamp_col(max_x),
            self.clamp_row(max_y),
        )
    }

    /// Inserts `id` into every cell covered by the AABB `(min_x, min_y, max_x, max_y)`.
    pub fn insert(&mut self, id: u64, aabb: (f32, f32, f32, f32)) {
        let (c0, r0, c1, r1) = self.cell_range(aabb.0, aabb.1, aabb.2, aabb.3);
        for row in r0..=r1 {
            for col in c0..=c1 {
                let idx = self.index(col, row);
                self.cells[idx].insert(id);
            }
        }
    }

    /// Removes `id` from every cell covered by the AABB. The AABB must match
    /// the one passed to `insert` (or a superset), or stale memberships will
    /// be left behind — callers that move an entity must remove with the old
    /// AABB before re-inserting with the new one.
    pub fn remove(&mut self, id: u64, aabb: (f32, f32, f32, f32)) {
        let (c0, r0, c1, r1) = self.cell_range(aabb.0, aabb.1, aabb.2, aabb.3);
        for row in r0..=r1 {
            for col in c0..=c1 {
                let idx = self.index(col, row);
                self.cells[idx].remove(&id);
            }
        }
    }

    /// Returns the union of ids in every cell the given query rectangle
    /// overlaps, inflated by `(rx, ry)` on each axis from the center point.
    pub fn query(&self, cx: f32, cy: f32, rx: f32, ry: f32) -> HashSet<u64> {
        let (c0, r0, c1, r1) = self.cell_range(cx - rx, cy - ry, cx + rx, cy + ry);
        let mut out = HashSet::new();
        for row in r0..=r1 {
            for col in c0..=c1 {
                let idx = self.index(col, row);
                out.extend(self.cells[idx].iter().copied());
            }
        }
        out
    }

    /// Ids present in the single cell containing `(x, y)` — used by the
    /// spawn-location rejection sampler, which only needs to avoid the exact
    /// landing cell.
    pub fn cell_members(&self, x: f32, y: f32) -> &HashSet<u64> {
        let (col, row) = self.cell_of(x, y);
        &self.cells[self.index(col, row)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_query_finds_entity() {
        let mut grid = SpatialGrid::new(2560.0, 1440.0, 600.0, 600.0);
        grid.insert(1, (90.0, 90.0, 110.0, 110.0));
        let found = grid.query(100.0, 100.0, 50.0, 50.0);
        assert!(found.contains(&1));
    }

    #[test]
    fn remove_clears_membership() {
        let mut grid = SpatialGrid::new(2560.0, 1440.0, 600.0, 600.0);
        grid.insert(1, (90.0, 90.0, 110.0, 110.0));
        grid.remove(1, (90.0, 90.0, 110.0, 110.0));
        let found = grid.query(100.0, 100.0, 50.0, 50.0);
        assert!(!found.contains(&1));
    }

    #[test]
    fn out_of_bounds_coordinates_clamp_instead_of_panicking() {
        let grid = SpatialGrid::new(2560.0, 1440.0, 600.0, 600.0);
        let _ = grid.query(-500.0, 99999.0, 10.0, 10.0);
    }

    #[test]
    fn query_is_superset_of_exact_containment() {
        let mut grid = SpatialGrid::new(1200.0, 1200.0, 600.0, 600.0);
        grid.insert(7, (595.0, 595.0, 605.0, 605.0));
        let found = grid.query(600.0, 600.0, 5.0, 5.0);
        assert!(found.contains(&7));
    }
}
