//! Grid-based area-of-interest index
//!
//! The world extent is cut into `cnts_x * cnts_z` cells. Each cell keeps its
//! own occupant set behind its own lock, so actors in unrelated cells never
//! contend. An actor sees the 3x3 block of cells around its own.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::config::AoiConfig;
use crate::error::Result;
use crate::world::actor::ActorId;

pub type CellId = usize;

/// Cells that stopped and started being visible after a cell change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTransition {
    pub from: CellId,
    pub to: CellId,
    /// In the old neighborhood but not the new one
    pub leaving: Vec<CellId>,
    /// In the new neighborhood but not the old one
    pub entering: Vec<CellId>,
}

pub struct AoiGrid {
    bounds: AoiConfig,
    cell_width: f32,
    cell_height: f32,
    cells: Vec<Mutex<HashSet<ActorId>>>,
}

impl AoiGrid {
    pub fn new(bounds: AoiConfig) -> Result<Self> {
        bounds.validate()?;
        let cell_width = (bounds.max_x - bounds.min_x) / bounds.cnts_x as f32;
        let cell_height = (bounds.max_z - bounds.min_z) / bounds.cnts_z as f32;
        let cells = (0..bounds.cnts_x * bounds.cnts_z)
            .map(|_| Mutex::new(HashSet::new()))
            .collect();
        Ok(Self {
            bounds,
            cell_width,
            cell_height,
            cells,
        })
    }

    pub fn columns(&self) -> usize {
        self.bounds.cnts_x
    }

    pub fn rows(&self) -> usize {
        self.bounds.cnts_z
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn bounds(&self) -> &AoiConfig {
        &self.bounds
    }

    /// Cell containing `(x, z)`. Positions outside the extent land in the
    /// nearest edge cell.
    pub fn cell_of(&self, x: f32, z: f32) -> CellId {
        let col = bucket(x, self.bounds.min_x, self.cell_width, self.bounds.cnts_x);
        let row = bucket(z, self.bounds.min_z, self.cell_height, self.bounds.cnts_z);
        row * self.bounds.cnts_x + col
    }

    /// The cell itself plus the adjacent cells that exist, in ascending order.
    /// Empty for an id outside the grid.
    pub fn neighbors_of(&self, cell: CellId) -> Vec<CellId> {
        if cell >= self.cells.len() {
            return Vec::new();
        }
        let columns = self.bounds.cnts_x;
        let (row, col) = (cell / columns, cell % columns);

        let mut neighbors = Vec::with_capacity(9);
        for r in row.saturating_sub(1)..=(row + 1).min(self.bounds.cnts_z - 1) {
            for c in col.saturating_sub(1)..=(col + 1).min(columns - 1) {
                neighbors.push(r * columns + c);
            }
        }
        neighbors
    }

    /// Returns `false` if the actor was already there or the cell does not exist
    pub fn add(&self, actor: ActorId, cell: CellId) -> bool {
        match self.cells.get(cell) {
            Some(occupants) => lock(occupants).insert(actor),
            None => false,
        }
    }

    /// Returns `false` if the actor was not there or the cell does not exist
    pub fn remove(&self, actor: ActorId, cell: CellId) -> bool {
        match self.cells.get(cell) {
            Some(occupants) => lock(occupants).remove(&actor),
            None => false,
        }
    }

    pub fn contains(&self, actor: ActorId, cell: CellId) -> bool {
        self.cells
            .get(cell)
            .map(|occupants| lock(occupants).contains(&actor))
            .unwrap_or(false)
    }

    pub fn occupants(&self, cell: CellId) -> Vec<ActorId> {
        self.cells
            .get(cell)
            .map(|occupants| lock(occupants).iter().copied().collect())
            .unwrap_or_default()
    }

    /// Union of the occupants of `cells`, one cell lock at a time
    pub fn occupants_in(&self, cells: &[CellId]) -> Vec<ActorId> {
        let mut actors = Vec::new();
        for &cell in cells {
            if let Some(occupants) = self.cells.get(cell) {
                actors.extend(lock(occupants).iter().copied());
            }
        }
        actors
    }

    /// Everyone in the 3x3 block around `(x, z)`
    pub fn occupants_near(&self, x: f32, z: f32) -> Vec<ActorId> {
        self.occupants_in(&self.neighbors_of(self.cell_of(x, z)))
    }

    /// Neighborhood difference between two cells; `None` when they are the same
    pub fn transition(&self, from: CellId, to: CellId) -> Option<CellTransition> {
        if from == to {
            return None;
        }
        let old: HashSet<CellId> = self.neighbors_of(from).into_iter().collect();
        let new: HashSet<CellId> = self.neighbors_of(to).into_iter().collect();

        let mut leaving: Vec<CellId> = old.difference(&new).copied().collect();
        let mut entering: Vec<CellId> = new.difference(&old).copied().collect();
        leaving.sort_unstable();
        entering.sort_unstable();

        Some(CellTransition {
            from,
            to,
            leaving,
            entering,
        })
    }

    /// Move an actor between cells and report what changed
    pub fn relocate(&self, actor: ActorId, from: CellId, to: CellId) -> Option<CellTransition> {
        let transition = self.transition(from, to)?;
        self.remove(actor, from);
        self.add(actor, to);
        Some(transition)
    }
}

fn bucket(value: f32, min: f32, width: f32, count: usize) -> usize {
    // NaN and anything below `min` saturate to 0
    let index = ((value - min) / width) as usize;
    index.min(count - 1)
}

fn lock(cell: &Mutex<HashSet<ActorId>>) -> std::sync::MutexGuard<'_, HashSet<ActorId>> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(cols: usize, rows: usize) -> AoiGrid {
        AoiGrid::new(AoiConfig {
            min_x: 0.0,
            max_x: cols as f32 * 10.0,
            cnts_x: cols,
            min_z: 0.0,
            max_z: rows as f32 * 10.0,
            cnts_z: rows,
        })
        .unwrap()
    }

    #[test]
    fn test_cell_of_buckets_rows_and_columns() {
        let grid = grid(4, 3);
        assert_eq!(grid.cell_of(0.0, 0.0), 0);
        assert_eq!(grid.cell_of(9.9, 0.0), 0);
        assert_eq!(grid.cell_of(10.0, 0.0), 1);
        assert_eq!(grid.cell_of(35.0, 25.0), 2 * 4 + 3);
        assert_eq!(grid.cell_of(15.0, 12.0), 4 + 1);
    }

    #[test]
    fn test_cell_of_clamps_outside_positions() {
        let grid = grid(4, 3);
        assert_eq!(grid.cell_of(-100.0, -5.0), 0);
        assert_eq!(grid.cell_of(40.0, 30.0), 11);
        assert_eq!(grid.cell_of(1e9, 1e9), 11);
        assert_eq!(grid.cell_of(f32::NAN, 15.0), 4);
    }

    #[test]
    fn test_neighbors_at_corner_edge_and_center() {
        let grid = grid(3, 3);
        assert_eq!(grid.neighbors_of(0), vec![0, 1, 3, 4]);
        assert_eq!(grid.neighbors_of(1), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(grid.neighbors_of(4), (0..9).collect::<Vec<_>>());
        assert_eq!(grid.neighbors_of(8), vec![4, 5, 7, 8]);
        assert!(grid.neighbors_of(9).is_empty());
    }

    #[test]
    fn test_neighbors_contain_own_cell() {
        let grid = AoiGrid::new(AoiConfig::default()).unwrap();
        for step in 0..50 {
            let x = 85.0 + step as f32 * 6.5;
            let z = 75.0 + step as f32 * 6.5;
            let cell = grid.cell_of(x, z);
            assert!(grid.neighbors_of(cell).contains(&cell));
        }
    }

    #[test]
    fn test_single_row_grid_has_no_wraparound() {
        let grid = grid(5, 1);
        assert_eq!(grid.neighbors_of(0), vec![0, 1]);
        assert_eq!(grid.neighbors_of(4), vec![3, 4]);
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let grid = grid(3, 3);
        assert!(grid.add(7, 4));
        assert!(!grid.add(7, 4));
        assert_eq!(grid.occupants(4), vec![7]);
        assert!(grid.remove(7, 4));
        assert!(!grid.remove(7, 4));
        assert!(grid.occupants(4).is_empty());
        assert!(!grid.add(7, 99));
    }

    #[test]
    fn test_occupants_near() {
        let grid = grid(3, 3);
        grid.add(1, 0);
        grid.add(2, 1);
        grid.add(3, 8);
        let mut near = grid.occupants_near(5.0, 5.0);
        near.sort();
        assert_eq!(near, vec![1, 2]);
    }

    #[test]
    fn test_transition_between_adjacent_cells() {
        let grid = grid(4, 4);
        // (1,1) -> (2,1)
        let t = grid.transition(5, 6).unwrap();
        assert_eq!(t.leaving, vec![0, 4, 8]);
        assert_eq!(t.entering, vec![3, 7, 11]);
        assert!(grid.transition(5, 5).is_none());
    }

    #[test]
    fn test_transition_far_move_swaps_whole_neighborhood() {
        let grid = grid(3, 3);
        let t = grid.transition(0, 8).unwrap();
        assert_eq!(t.leaving, vec![0, 1, 3]);
        assert_eq!(t.entering, vec![5, 7, 8]);
    }

    #[test]
    fn test_relocate_moves_membership() {
        let grid = grid(3, 3);
        grid.add(9, 0);
        assert!(grid.relocate(9, 0, 0).is_none());
        assert!(grid.contains(9, 0));

        grid.relocate(9, 0, 2).unwrap();
        assert!(!grid.contains(9, 0));
        assert!(grid.contains(9, 2));
    }
}
