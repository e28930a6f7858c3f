//! Grid derivation for room initialization.
//!
//! A room spec carries its static geometry as a list of 1-based object
//! indices laid out row-major across the `width`×`height` grid. This module
//! turns that list into the blocked cell set and derives the initial free
//! set, keeping the partition invariant from the start:
//! blocked ∪ free = all cells, disjoint (occupied starts empty).

use crate::types::Cell;
use std::collections::HashSet;

/// Maps a 1-based object index to its cell on a grid of the given width.
///
/// Index 1 is cell (1,1), index `width` is (`width`,1), index `width`+1
/// wraps to (1,2), and so on.
pub fn object_cell(index: u32, width: u32) -> Cell {
    let zero_based = index - 1;
    Cell::new((zero_based % width) + 1, (zero_based / width) + 1)
}

/// Derives the blocked cell set from a room spec's object indices.
///
/// Indices that fall outside the grid (index 0, or beyond width×height) are
/// ignored so a malformed map cannot smuggle out-of-grid cells into the
/// partition. The cell count is computed in u64 because width×height can
/// exceed u32 for unvalidated geometry.
pub fn blocked_cells(width: u32, height: u32, object_indices: &[u32]) -> HashSet<Cell> {
    let cell_count = u64::from(width) * u64::from(height);
    object_indices
        .iter()
        .filter(|&&index| index >= 1 && u64::from(index) <= cell_count)
        .map(|&index| object_cell(index, width))
        .collect()
}

/// All cells of a `width`×`height` grid, row-major, 1-based.
pub fn all_cells(width: u32, height: u32) -> impl Iterator<Item = Cell> {
    (1..=height).flat_map(move |y| (1..=width).map(move |x| Cell::new(x, y)))
}

/// The initial free set: every grid cell not blocked.
pub fn free_cells(width: u32, height: u32, blocked: &HashSet<Cell>) -> HashSet<Cell> {
    all_cells(width, height)
        .filter(|cell| !blocked.contains(cell))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_indices_lay_out_row_major() {
        assert_eq!(object_cell(1, 4), Cell::new(1, 1));
        assert_eq!(object_cell(4, 4), Cell::new(4, 1));
        assert_eq!(object_cell(5, 4), Cell::new(1, 2));
        assert_eq!(object_cell(8, 4), Cell::new(4, 2));
    }

    #[test]
    fn out_of_grid_indices_are_ignored() {
        let blocked = blocked_cells(2, 2, &[0, 1, 4, 5, 99]);
        assert_eq!(
            blocked,
            HashSet::from([Cell::new(1, 1), Cell::new(2, 2)])
        );
    }

    #[test]
    fn extreme_dimensions_do_not_overflow_the_cell_count() {
        let blocked = blocked_cells(65_536, 65_536, &[5]);
        assert_eq!(blocked, HashSet::from([Cell::new(5, 1)]));
    }

    #[test]
    fn blocked_and_free_partition_the_grid() {
        let width = 5;
        let height = 3;
        let blocked = blocked_cells(width, height, &[2, 7, 11, 15]);
        let free = free_cells(width, height, &blocked);

        assert_eq!(blocked.len() + free.len(), (width * height) as usize);
        assert!(blocked.is_disjoint(&free));

        let mut union: HashSet<Cell> = blocked.clone();
        union.extend(free.iter().copied());
        assert_eq!(union, all_cells(width, height).collect());
    }

    #[test]
    fn empty_object_list_frees_the_whole_grid() {
        let free = free_cells(3, 1, &HashSet::new());
        assert_eq!(free.len(), 3);
    }
}
