//! Tile grids over large rasters
//!
//! [`TileIterator`] covers a raster with a nominal grid of `tile_size`
//! tiles, each read with `overlap` extra pixels on every side. The nominal
//! cells (the tile "cores") partition the raster, so a feature seen by
//! several overlapping tiles is owned by exactly one of them.
//!
//! [`SampleGrid`] visits fixed-size blocks at a stride larger than the block
//! and caps how many are scanned.

use geoscout_core::Window;

/// A tile of a raster scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Position in scan order
    pub index: usize,
    /// Region to read, including overlap, clipped to the raster
    pub window: Window,
    /// Region this tile is responsible for, clipped to the raster
    pub core: Window,
}

impl Tile {
    /// Whether the global pixel position `(row, col)` lies in this tile's core.
    pub fn owns(&self, row: f64, col: f64) -> bool {
        let (r0, c0) = (self.core.row_off as f64, self.core.col_off as f64);
        let (r1, c1) = (self.core.row_end() as f64, self.core.col_end() as f64);
        row >= r0 && row < r1 && col >= c0 && col < c1
    }

    /// Convert tile-local coordinates to source raster coordinates
    pub fn to_source_coords(&self, local_row: f64, local_col: f64) -> (f64, f64) {
        (
            self.window.row_off as f64 + local_row,
            self.window.col_off as f64 + local_col,
        )
    }
}

/// Iterator over overlapping tiles covering a raster
#[derive(Debug, Clone)]
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_size: usize,
    overlap: usize,
    next_index: usize,
}

impl TileIterator {
    /// Create a new tile iterator. A `tile_size` of 0 is treated as 1.
    pub fn new(total_rows: usize, total_cols: usize, tile_size: usize, overlap: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            tile_size: tile_size.max(1),
            overlap,
            next_index: 0,
        }
    }

    fn tiles_across(&self) -> usize {
        self.total_cols.div_ceil(self.tile_size)
    }

    /// Number of tiles in the grid
    pub fn tile_count(&self) -> usize {
        self.tiles_across() * self.total_rows.div_ceil(self.tile_size)
    }

    /// Tile at scan position `index`, if within the grid
    pub fn tile(&self, index: usize) -> Option<Tile> {
        if index >= self.tile_count() {
            return None;
        }
        let across = self.tiles_across();
        let ts = self.tile_size as isize;
        let ov = self.overlap as isize;
        let col_off = (index % across) as isize * ts;
        let row_off = (index / across) as isize * ts;

        let core = Window::new(col_off, row_off, self.tile_size, self.tile_size)
            .clip(self.total_cols, self.total_rows)?;
        let window = Window::new(
            col_off - ov,
            row_off - ov,
            self.tile_size + 2 * self.overlap,
            self.tile_size + 2 * self.overlap,
        )
        .clip(self.total_cols, self.total_rows)?;

        Some(Tile { index, window, core })
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        let tile = self.tile(self.next_index)?;
        self.next_index += 1;
        Some(tile)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.tile_count().saturating_sub(self.next_index);
        (left, Some(left))
    }
}

impl ExactSizeIterator for TileIterator {}

/// Sparse grid of fixed-size sample blocks
///
/// Block origins are placed every `stride` pixels along both axes starting
/// at 0; blocks running past the raster edge are clipped. When a cap is set
/// and the grid holds more blocks than the cap, the scanned blocks are
/// spread evenly through the scan order.
#[derive(Debug, Clone)]
pub struct SampleGrid {
    total_rows: usize,
    total_cols: usize,
    block: usize,
    stride: usize,
    max_samples: Option<usize>,
}

impl SampleGrid {
    pub fn new(total_rows: usize, total_cols: usize, block: usize, stride: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            block: block.max(1),
            stride: stride.max(1),
            max_samples: None,
        }
    }

    /// Limit the number of blocks returned by [`SampleGrid::tiles`].
    pub fn capped(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples);
        self
    }

    fn across(&self) -> usize {
        self.total_cols.div_ceil(self.stride)
    }

    /// Number of blocks in the full grid
    pub fn total(&self) -> usize {
        self.across() * self.total_rows.div_ceil(self.stride)
    }

    fn block_at(&self, grid_index: usize) -> Option<Window> {
        let across = self.across();
        let col_off = (grid_index % across * self.stride) as isize;
        let row_off = (grid_index / across * self.stride) as isize;
        Window::new(col_off, row_off, self.block, self.block).clip(self.total_cols, self.total_rows)
    }

    /// Blocks to scan, in scan order.
    pub fn tiles(&self) -> Vec<Tile> {
        let total = self.total();
        let count = self.max_samples.map_or(total, |cap| cap.min(total));
        (0..count)
            .filter_map(|i| {
                let grid_index = if count == total { i } else { i * total / count };
                self.block_at(grid_index).map(|w| Tile {
                    index: i,
                    window: w,
                    core: w,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_iterator_windows() {
        let tiles: Vec<_> = TileIterator::new(100, 100, 32, 4).collect();
        assert_eq!(tiles.len(), 16);

        // First tile starts at the origin; overlap is clipped away
        assert_eq!(tiles[0].window, Window::new(0, 0, 36, 36));
        assert_eq!(tiles[0].core, Window::new(0, 0, 32, 32));

        // Interior tile reads overlap on every side
        assert_eq!(tiles[5].core, Window::new(32, 32, 32, 32));
        assert_eq!(tiles[5].window, Window::new(28, 28, 40, 40));

        // Last tile is clipped
        assert_eq!(tiles[15].core, Window::new(96, 96, 4, 4));
        assert_eq!(tiles[15].window, Window::new(92, 92, 8, 8));
    }

    #[test]
    fn test_cores_partition_raster() {
        let (rows, cols) = (70, 45);
        let mut owners = vec![vec![0usize; cols]; rows];
        for tile in TileIterator::new(rows, cols, 16, 5) {
            for r in 0..rows {
                for c in 0..cols {
                    if tile.owns(r as f64 + 0.5, c as f64 + 0.5) {
                        owners[r][c] += 1;
                    }
                }
            }
        }
        assert!(owners.iter().flatten().all(|&n| n == 1));
    }

    #[test]
    fn test_to_source_coords() {
        let tile = TileIterator::new(100, 100, 32, 4).tile(5).unwrap();
        assert_eq!(tile.to_source_coords(0.0, 0.0), (28.0, 28.0));
        assert_eq!(tile.to_source_coords(10.5, 2.0), (38.5, 30.0));
        assert!(TileIterator::new(100, 100, 32, 4).tile(16).is_none());
    }

    #[test]
    fn test_sample_grid_full() {
        let grid = SampleGrid::new(5000, 5000, 512, 2048);
        assert_eq!(grid.total(), 9);
        let tiles = grid.tiles();
        assert_eq!(tiles.len(), 9);
        assert_eq!(tiles[1].window, Window::new(2048, 0, 512, 512));
        // clipped at the far edge
        assert_eq!(tiles[8].window, Window::new(4096, 4096, 512, 512));
    }

    #[test]
    fn test_sample_grid_cap_spreads_samples() {
        let grid = SampleGrid::new(4096, 4096, 512, 1024).capped(4);
        assert_eq!(grid.total(), 16);
        let tiles = grid.tiles();
        assert_eq!(tiles.len(), 4);
        let origins: Vec<_> = tiles.iter().map(|t| (t.window.row_off, t.window.col_off)).collect();
        assert_eq!(origins, vec![(0, 0), (1024, 0), (2048, 0), (3072, 0)]);
    }

    #[test]
    fn test_small_raster_gets_one_clipped_block() {
        let tiles = SampleGrid::new(300, 400, 512, 1024).capped(4).tiles();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].window, Window::new(0, 0, 400, 300));
    }
}
