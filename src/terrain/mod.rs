//! Playfield tables: tile layers, height and colour grids, items, splines and
//! fences reconstructed from a level's resource file.

mod loader;

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::records::Rect;
use crate::shards::TerrainHeight;

pub use loader::{read_playfield, PlayfieldOptions, PLAYFIELD_FILE_VERSION};

/// Low bits of a tile word holding the image index.
pub const TILENUM_MASK: u16 = 0x0fff;
pub const SUPERTILE_SIZE: usize = 5;
pub const TERRAIN_POLYGON_SIZE: f32 = 160.0;
/// Map units per tile used by item coordinates.
pub const OREOMAP_TILE_SIZE: usize = 32;
pub const MAX_TERRAIN_TILES: usize = 512;

/// Classic four-byte version stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumVersion {
    pub major: u8,
    pub minor_and_bug: u8,
    pub stage: u8,
    pub non_release: u8,
}

impl NumVersion {
    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes([self.major, self.minor_and_bug, self.stage, self.non_release])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayfieldHeader {
    pub version: NumVersion,
    pub num_items: i32,
    pub map_width: i32,
    pub map_height: i32,
    pub num_tile_pages: i32,
    pub num_tiles_in_list: i32,
    pub tile_size: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub num_splines: i32,
    pub num_fences: i32,
}

/// Row-major 2D table, `depth` rows of `width` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    depth: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Returns `None` when `cells` does not hold exactly `width * depth` values.
    pub fn from_cells(width: usize, depth: usize, cells: Vec<T>) -> Option<Self> {
        (width.checked_mul(depth)? == cells.len()).then_some(Self {
            width,
            depth,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.depth && col < self.width {
            self.cells.get(row * self.width + col)
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[T]> {
        let start = row.checked_mul(self.width)?;
        self.cells.get(start..start + self.width)
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer {
    Floor,
    Ceiling,
}

impl Layer {
    fn index(self) -> usize {
        match self {
            Layer::Floor => 0,
            Layer::Ceiling => 1,
        }
    }
}

/// Which diagonal divides a tile into its two triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMode {
    /// Diagonal from the tile's min corner to its max corner.
    Backward,
    /// Diagonal from the (max x, min z) corner to the (min x, max z) corner.
    Forward,
}

impl SplitMode {
    pub fn from_raw(raw: u8) -> Self {
        if raw == 1 {
            SplitMode::Forward
        } else {
            SplitMode::Backward
        }
    }
}

/// Placed object in map units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainItem {
    pub x: u16,
    pub y: u16,
    pub item_type: u16,
    pub parm: [u8; 4],
    pub flags: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplinePoint {
    pub x: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplineItem {
    /// Position along the spline, 0..1.
    pub placement: f32,
    pub item_type: u16,
    pub parm: [u8; 4],
    pub flags: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spline {
    pub num_nubs: i16,
    pub bbox: Rect,
    pub points: Vec<SplinePoint>,
    pub items: Vec<SplineItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FencePoint {
    pub x: i32,
    pub z: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fence {
    pub fence_type: u16,
    pub bbox: Rect,
    pub nubs: Vec<FencePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playfield {
    pub header: PlayfieldHeader,
    /// Tile dimensions rounded down to whole supertiles.
    pub tile_width: usize,
    pub tile_depth: usize,
    pub unit_width: f32,
    pub unit_depth: f32,
    pub supertiles_wide: usize,
    pub supertiles_deep: usize,
    pub tile_images: Vec<u16>,
    pub floor_map: Grid<u16>,
    pub ceiling_map: Option<Grid<u16>>,
    /// Vertex heights per layer, already scaled to world units.
    pub heights: Vec<Grid<f32>>,
    pub vertex_colors: Vec<Grid<u16>>,
    pub split_modes: Vec<Grid<u8>>,
    /// Sorted by ascending x.
    pub items: Vec<TerrainItem>,
    item_columns: Vec<Range<usize>>,
    pub splines: Vec<Spline>,
    pub fences: Vec<Fence>,
}

impl Playfield {
    pub fn num_layers(&self) -> usize {
        self.heights.len()
    }

    /// Items whose x falls inside one supertile column.
    pub fn items_in_supertile_column(&self, column: usize) -> &[TerrainItem] {
        self.item_columns
            .get(column)
            .map_or(&[], |range| &self.items[range.clone()])
    }

    pub(crate) fn index_items(&mut self) {
        self.items.sort_by_key(|item| item.x);
        let column_width = OREOMAP_TILE_SIZE * SUPERTILE_SIZE;
        let column_of = |item: &TerrainItem| item.x as usize / column_width;
        self.item_columns = (0..self.supertiles_wide)
            .map(|column| {
                let start = self.items.partition_point(|item| column_of(item) < column);
                let end = self.items.partition_point(|item| column_of(item) <= column);
                start..end
            })
            .collect();
    }

    /// Height of a layer at world `(x, z)` on the plane of the tile triangle
    /// containing the point, or `None` outside the map or a missing layer.
    pub fn height_at_layer(&self, x: f32, z: f32, layer: Layer) -> Option<f32> {
        let heights = self.heights.get(layer.index())?;
        if !(x >= 0.0 && z >= 0.0 && x < self.unit_width && z < self.unit_depth) {
            return None;
        }

        let fx = x / TERRAIN_POLYGON_SIZE;
        let fz = z / TERRAIN_POLYGON_SIZE;
        let col = (fx as usize).min(self.tile_width - 1);
        let row = (fz as usize).min(self.tile_depth - 1);
        let u = fx - col as f32;
        let v = fz - row as f32;

        let h00 = *heights.get(row, col)?;
        let h10 = *heights.get(row, col + 1)?;
        let h01 = *heights.get(row + 1, col)?;
        let h11 = *heights.get(row + 1, col + 1)?;

        let split = self
            .split_modes
            .get(layer.index())
            .and_then(|grid| grid.get(row, col))
            .map_or(SplitMode::Backward, |&raw| SplitMode::from_raw(raw));

        let height = match split {
            SplitMode::Backward if u >= v => h00 + u * (h10 - h00) + v * (h11 - h10),
            SplitMode::Backward => h00 + v * (h01 - h00) + u * (h11 - h01),
            SplitMode::Forward if u + v <= 1.0 => h00 + u * (h10 - h00) + v * (h01 - h00),
            SplitMode::Forward => h11 + (1.0 - u) * (h01 - h11) + (1.0 - v) * (h10 - h11),
        };
        Some(height)
    }
}

impl TerrainHeight for Playfield {
    fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        self.height_at_layer(x, z, Layer::Floor)
    }
}
