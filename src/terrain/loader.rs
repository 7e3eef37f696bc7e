use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{
    Fence, FencePoint, Grid, NumVersion, Playfield, PlayfieldHeader, Spline, SplineItem,
    SplinePoint, TerrainItem, MAX_TERRAIN_TILES, SUPERTILE_SIZE, TERRAIN_POLYGON_SIZE,
    TILENUM_MASK,
};
use crate::error::{FourCC, LoadError, LoadResult};
use crate::records::{
    checked_count, decode_all_records, decode_record, decode_records, Rect, Record,
    RecordReader, ShortRead,
};
use crate::resource_fork::ResourceFork;

pub const PLAYFIELD_FILE_VERSION: NumVersion = NumVersion {
    major: 1,
    minor_and_bug: 0,
    stage: 0x80,
    non_release: 0,
};

const HEDR: FourCC = FourCC::new(b"Hedr");
const TIMG: FourCC = FourCC::new(b"Timg");
const XLAT: FourCC = FourCC::new(b"Xlat");
const LAYR: FourCC = FourCC::new(b"Layr");
const YCRD: FourCC = FourCC::new(b"YCrd");
const VCOL: FourCC = FourCC::new(b"Vcol");
const SPLT: FourCC = FourCC::new(b"Splt");
const ITMS: FourCC = FourCC::new(b"Itms");
const SPLN: FourCC = FourCC::new(b"Spln");
const SPPT: FourCC = FourCC::new(b"SpPt");
const SPIT: FourCC = FourCC::new(b"SpIt");
const FENC: FourCC = FourCC::new(b"Fenc");
const FNNB: FourCC = FourCC::new(b"FnNb");

const BASE_ID: i16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayfieldOptions {
    /// Also read the ceiling tile layer and the second height, colour and
    /// split layers.
    pub load_ceiling: bool,
    pub expected_version: NumVersion,
}

impl Default for PlayfieldOptions {
    fn default() -> Self {
        Self {
            load_ceiling: false,
            expected_version: PLAYFIELD_FILE_VERSION,
        }
    }
}

impl Record for PlayfieldHeader {
    const SIZE: usize = 44;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        Ok(Self {
            version: NumVersion {
                major: reader.u8()?,
                minor_and_bug: reader.u8()?,
                stage: reader.u8()?,
                non_release: reader.u8()?,
            },
            num_items: reader.i32()?,
            map_width: reader.i32()?,
            map_height: reader.i32()?,
            num_tile_pages: reader.i32()?,
            num_tiles_in_list: reader.i32()?,
            tile_size: reader.f32()?,
            min_y: reader.f32()?,
            max_y: reader.f32()?,
            num_splines: reader.i32()?,
            num_fences: reader.i32()?,
        })
    }
}

impl Record for TerrainItem {
    const SIZE: usize = 12;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        Ok(Self {
            x: reader.u16()?,
            y: reader.u16()?,
            item_type: reader.u16()?,
            parm: reader.bytes::<4>()?,
            flags: reader.u16()?,
        })
    }
}

/// Spline record as stored on disk; the list pointers are meaningless.
#[derive(Debug, Clone, Copy)]
struct FileSpline {
    num_nubs: i16,
    num_points: i32,
    num_items: i16,
    bbox: Rect,
}

impl Record for FileSpline {
    const SIZE: usize = 28;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        let num_nubs = reader.i16()?;
        reader.skip(4)?;
        let num_points = reader.i32()?;
        reader.skip(4)?;
        let num_items = reader.i16()?;
        reader.skip(4)?;
        Ok(Self {
            num_nubs,
            num_points,
            num_items,
            bbox: reader.rect()?,
        })
    }
}

impl Record for SplinePoint {
    const SIZE: usize = 8;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        Ok(Self {
            x: reader.f32()?,
            z: reader.f32()?,
        })
    }
}

impl Record for SplineItem {
    const SIZE: usize = 12;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        Ok(Self {
            placement: reader.f32()?,
            item_type: reader.u16()?,
            parm: reader.bytes::<4>()?,
            flags: reader.u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct FileFence {
    fence_type: u16,
    num_nubs: i16,
    bbox: Rect,
}

impl Record for FileFence {
    const SIZE: usize = 16;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        let fence_type = reader.u16()?;
        let num_nubs = reader.i16()?;
        reader.skip(4)?;
        Ok(Self {
            fence_type,
            num_nubs,
            bbox: reader.rect()?,
        })
    }
}

impl Record for FencePoint {
    const SIZE: usize = 8;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        Ok(Self {
            x: reader.i32()?,
            z: reader.i32()?,
        })
    }
}

fn record_id(index: usize) -> LoadResult<i16> {
    i16::try_from(index)
        .ok()
        .and_then(|offset| BASE_ID.checked_add(offset))
        .ok_or_else(|| LoadError::Malformed(format!("record index {index} is out of range")))
}

fn grid<T>(tag: FourCC, id: i16, width: usize, depth: usize, cells: Vec<T>) -> LoadResult<Grid<T>> {
    Grid::from_cells(width, depth, cells).ok_or_else(|| {
        LoadError::Malformed(format!("'{tag}' #{id} does not fill a {width}x{depth} grid"))
    })
}

/// Replaces the image index bits of every tile through the translation table.
fn translate_tiles(id: i16, raw: &[u16], xlat: &[i16]) -> LoadResult<Vec<u16>> {
    raw.iter()
        .map(|&tile| {
            let index = (tile & TILENUM_MASK) as usize;
            let image = *xlat.get(index).ok_or_else(|| {
                LoadError::Malformed(format!(
                    "tile {tile:#06x} in layer #{id} indexes past the {}-entry translation table",
                    xlat.len()
                ))
            })?;
            if image < 0 || image as u16 > TILENUM_MASK {
                return Err(LoadError::Malformed(format!(
                    "translation table maps tile index {index} to invalid image {image}"
                )));
            }
            Ok((tile & !TILENUM_MASK) | image as u16)
        })
        .collect()
}

fn read_tile_layer(
    fork: &ResourceFork,
    id: i16,
    width: usize,
    depth: usize,
    xlat: &[i16],
) -> LoadResult<Grid<u16>> {
    let raw: Vec<u16> = decode_records(LAYR, id, fork.require(LAYR, id)?, width * depth)?;
    grid(LAYR, id, width, depth, translate_tiles(id, &raw, xlat)?)
}

fn read_splines(fork: &ResourceFork, count: usize) -> LoadResult<Vec<Spline>> {
    let Some(bytes) = fork.get(SPLN, BASE_ID) else {
        debug!("{} has no spline list", fork.label());
        return Ok(Vec::new());
    };
    let file_splines: Vec<FileSpline> = decode_records(SPLN, BASE_ID, bytes, count)?;

    let mut splines = Vec::with_capacity(count);
    for (i, file) in file_splines.iter().enumerate() {
        let id = record_id(i)?;
        let num_points = checked_count("spline point count", file.num_points as i64)?;
        let num_items = checked_count("spline item count", file.num_items as i64)?;

        let points = if num_points == 0 {
            warn!("spline #{i} has 0 points");
            Vec::new()
        } else {
            decode_records(SPPT, id, fork.require(SPPT, id)?, num_points)?
        };
        let items = if num_items == 0 {
            warn!("spline #{i} has 0 items");
            Vec::new()
        } else {
            decode_records(SPIT, id, fork.require(SPIT, id)?, num_items)?
        };

        splines.push(Spline {
            num_nubs: file.num_nubs,
            bbox: file.bbox,
            points,
            items,
        });
    }
    Ok(splines)
}

fn read_fences(fork: &ResourceFork, count: usize) -> LoadResult<Vec<Fence>> {
    let Some(bytes) = fork.get(FENC, BASE_ID) else {
        debug!("{} has no fence list", fork.label());
        return Ok(Vec::new());
    };
    let file_fences: Vec<FileFence> = decode_records(FENC, BASE_ID, bytes, count)?;

    let mut fences = Vec::with_capacity(count);
    for (i, file) in file_fences.iter().enumerate() {
        let id = record_id(i)?;
        let num_nubs = checked_count("fence nub count", file.num_nubs as i64)?;
        let nubs = if num_nubs == 0 {
            warn!("fence #{i} has 0 nubs");
            Vec::new()
        } else {
            decode_records(FNNB, id, fork.require(FNNB, id)?, num_nubs)?
        };
        fences.push(Fence {
            fence_type: file.fence_type,
            bbox: file.bbox,
            nubs,
        });
    }
    Ok(fences)
}

/// Reconstructs a level's playfield tables from its resource file.
///
/// Spline point and item lists and fence nub lists with a count of zero are
/// left empty without looking up their records.
pub fn read_playfield(fork: &ResourceFork, options: &PlayfieldOptions) -> LoadResult<Playfield> {
    let num_layers = if options.load_ceiling { 2 } else { 1 };

    let header: PlayfieldHeader = decode_record(HEDR, BASE_ID, fork.require(HEDR, BASE_ID)?)?;
    if header.version != options.expected_version {
        return Err(LoadError::VersionMismatch {
            kind: "playfield",
            expected: options.expected_version.to_u32(),
            found: header.version.to_u32(),
        });
    }

    let width = checked_count("map width", header.map_width as i64)?;
    let depth = checked_count("map height", header.map_height as i64)?;
    let num_tiles = checked_count("tile count", header.num_tiles_in_list as i64)?;
    let num_items = checked_count("item count", header.num_items as i64)?;
    let num_splines = checked_count("spline count", header.num_splines as i64)?;
    let num_fences = checked_count("fence count", header.num_fences as i64)?;
    if num_tiles > MAX_TERRAIN_TILES {
        return Err(LoadError::CapacityExceeded {
            what: "terrain tiles",
            count: num_tiles,
            max: MAX_TERRAIN_TILES,
        });
    }
    if !(header.tile_size > 0.0) {
        return Err(LoadError::Malformed(format!(
            "playfield tile size {} is not positive",
            header.tile_size
        )));
    }

    let tile_images: Vec<u16> = decode_all_records(TIMG, BASE_ID, fork.require(TIMG, BASE_ID)?)?;
    let xlat: Vec<i16> = decode_all_records(XLAT, BASE_ID, fork.require(XLAT, BASE_ID)?)?;

    let floor_map = read_tile_layer(fork, BASE_ID, width, depth, &xlat)?;
    let ceiling_map = if options.load_ceiling {
        Some(read_tile_layer(fork, BASE_ID + 1, width, depth, &xlat)?)
    } else {
        None
    };

    let y_scale = TERRAIN_POLYGON_SIZE / header.tile_size;
    let vertex_count = (width + 1) * (depth + 1);
    let mut heights = Vec::with_capacity(num_layers);
    let mut vertex_colors = Vec::with_capacity(num_layers);
    let mut split_modes = Vec::with_capacity(num_layers);
    for layer in 0..num_layers {
        let id = record_id(layer)?;

        let raw: Vec<f32> = decode_records(YCRD, id, fork.require(YCRD, id)?, vertex_count)?;
        let scaled: Vec<f32> = raw.into_iter().map(|y| y * y_scale).collect();
        heights.push(grid(YCRD, id, width + 1, depth + 1, scaled)?);

        let colors: Vec<u16> = decode_records(VCOL, id, fork.require(VCOL, id)?, vertex_count)?;
        vertex_colors.push(grid(VCOL, id, width + 1, depth + 1, colors)?);

        let splits: Vec<u8> = decode_records(SPLT, id, fork.require(SPLT, id)?, width * depth)?;
        split_modes.push(grid(SPLT, id, width, depth, splits)?);
    }
    debug!(
        "read {num_layers} layer(s) of {width}x{depth} tiles from {}",
        fork.label()
    );

    let items: Vec<TerrainItem> = decode_records(ITMS, BASE_ID, fork.require(ITMS, BASE_ID)?, num_items)?;
    let splines = read_splines(fork, num_splines)?;
    let fences = read_fences(fork, num_fences)?;

    let tile_width = width / SUPERTILE_SIZE * SUPERTILE_SIZE;
    let tile_depth = depth / SUPERTILE_SIZE * SUPERTILE_SIZE;
    let mut playfield = Playfield {
        header,
        tile_width,
        tile_depth,
        unit_width: tile_width as f32 * TERRAIN_POLYGON_SIZE,
        unit_depth: tile_depth as f32 * TERRAIN_POLYGON_SIZE,
        supertiles_wide: tile_width / SUPERTILE_SIZE,
        supertiles_deep: tile_depth / SUPERTILE_SIZE,
        tile_images,
        floor_map,
        ceiling_map,
        heights,
        vertex_colors,
        split_modes,
        items,
        item_columns: Vec::new(),
        splines,
        fences,
    };
    playfield.index_items();

    info!(
        "loaded playfield {} ({}x{} tiles, {} items, {} splines, {} fences)",
        fork.label(),
        playfield.tile_width,
        playfield.tile_depth,
        playfield.items.len(),
        playfield.splines.len(),
        playfield.fences.len()
    );
    Ok(playfield)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordWriter;
    use crate::resource_fork::ResourceForkWriter;
    use crate::shards::TerrainHeight;
    use crate::terrain::Layer;

    const WIDTH: usize = 6;
    const DEPTH: usize = 5;

    fn header(version: NumVersion, num_splines: i32, num_fences: i32) -> Vec<u8> {
        RecordWriter::new()
            .u8(version.major)
            .u8(version.minor_and_bug)
            .u8(version.stage)
            .u8(version.non_release)
            .i32(3)
            .i32(WIDTH as i32)
            .i32(DEPTH as i32)
            .i32(1)
            .i32(4)
            .f32(80.0)
            .f32(0.0)
            .f32(100.0)
            .i32(num_splines)
            .i32(num_fences)
            .finish()
    }

    /// Heights rise by one unit per vertex column before scaling.
    fn playfield_fork() -> ResourceForkWriter {
        let mut fork = ResourceForkWriter::new();
        fork.add(HEDR, 1000, None, header(PLAYFIELD_FILE_VERSION, 2, 1));

        let mut timg = RecordWriter::new();
        for pixel in 0..16u16 {
            timg.u16(pixel);
        }
        fork.add(TIMG, 1000, None, timg.finish());
        fork.add(
            XLAT,
            1000,
            None,
            RecordWriter::new().i16(3).i16(2).i16(1).i16(0).finish(),
        );

        for (id, flag_bits) in [(1000, 0x8000u16), (1001, 0x4000u16)] {
            let mut layer = RecordWriter::new();
            for i in 0..WIDTH * DEPTH {
                layer.u16(flag_bits | (i % 4) as u16);
            }
            fork.add(LAYR, id, None, layer.finish());
        }

        for id in [1000, 1001] {
            let mut ycrd = RecordWriter::new();
            let mut vcol = RecordWriter::new();
            for _row in 0..=DEPTH {
                for col in 0..=WIDTH {
                    ycrd.f32(col as f32);
                    vcol.u16(0x7fff);
                }
            }
            fork.add(YCRD, id, None, ycrd.finish());
            fork.add(VCOL, id, None, vcol.finish());
            let mut splt = vec![0u8; WIDTH * DEPTH];
            splt[1] = 1;
            fork.add(SPLT, id, None, splt);
        }

        let mut items = RecordWriter::new();
        for (x, kind) in [(200u16, 1u16), (10, 2), (100, 3)] {
            items.u16(x).u16(20).u16(kind).bytes(&[1, 2, 3, 4]).u16(0);
        }
        fork.add(ITMS, 1000, None, items.finish());

        let mut spln = RecordWriter::new();
        for (points, items) in [(2, 1), (0, 0)] {
            spln.i16(4)
                .i32(0)
                .i32(points)
                .i32(0)
                .i16(items)
                .i32(0)
                .rect(Rect {
                    top: 0,
                    left: 0,
                    bottom: 10,
                    right: 10,
                });
        }
        fork.add(SPLN, 1000, None, spln.finish());
        fork.add(
            SPPT,
            1000,
            None,
            RecordWriter::new().f32(1.0).f32(2.0).f32(3.0).f32(4.0).finish(),
        );
        fork.add(
            SPIT,
            1000,
            None,
            RecordWriter::new()
                .f32(0.5)
                .u16(9)
                .bytes(&[0, 0, 0, 1])
                .u16(2)
                .finish(),
        );

        fork.add(
            FENC,
            1000,
            None,
            RecordWriter::new()
                .u16(3)
                .i16(2)
                .i32(0)
                .rect(Rect::default())
                .finish(),
        );
        fork.add(
            FNNB,
            1000,
            None,
            RecordWriter::new().i32(10).i32(20).i32(30).i32(40).finish(),
        );
        fork
    }

    fn load(writer: &ResourceForkWriter, options: &PlayfieldOptions) -> LoadResult<Playfield> {
        let fork = ResourceFork::from_bytes("test.ter", writer.to_bytes())?;
        read_playfield(&fork, options)
    }

    #[test]
    fn reads_floor_layer_and_rounds_to_supertiles() {
        let playfield = load(&playfield_fork(), &PlayfieldOptions::default()).unwrap();
        assert_eq!(playfield.num_layers(), 1);
        assert!(playfield.ceiling_map.is_none());
        assert_eq!(playfield.tile_width, 5);
        assert_eq!(playfield.tile_depth, 5);
        assert_eq!(playfield.supertiles_wide, 1);
        assert_eq!(playfield.unit_width, 800.0);
        assert_eq!(playfield.floor_map.width(), WIDTH);
        assert_eq!(playfield.tile_images.len(), 16);
    }

    #[test]
    fn tiles_are_translated_keeping_flag_bits() {
        let options = PlayfieldOptions {
            load_ceiling: true,
            ..PlayfieldOptions::default()
        };
        let playfield = load(&playfield_fork(), &options).unwrap();
        assert_eq!(playfield.num_layers(), 2);
        assert_eq!(&playfield.floor_map.cells()[..4], &[0x8003, 0x8002, 0x8001, 0x8000]);
        let ceiling = playfield.ceiling_map.as_ref().unwrap();
        assert_eq!(ceiling.get(0, 1), Some(&0x4002));
    }

    #[test]
    fn heights_are_scaled_and_interpolated() {
        let playfield = load(&playfield_fork(), &PlayfieldOptions::default()).unwrap();
        assert_eq!(playfield.heights[0].get(0, 1), Some(&2.0));
        let h = playfield.height_at(80.0, 40.0).unwrap();
        assert!((h - 1.0).abs() < 1e-5);
        // forward split tile
        let h = playfield.height_at(160.0 + 120.0, 100.0).unwrap();
        assert!((h - 3.5).abs() < 1e-5);
        assert!(playfield.height_at(-1.0, 10.0).is_none());
        assert!(playfield.height_at(10.0, 800.0).is_none());
        assert!(playfield.height_at_layer(10.0, 10.0, Layer::Ceiling).is_none());
    }

    #[test]
    fn items_are_sorted_and_indexed_by_column() {
        let playfield = load(&playfield_fork(), &PlayfieldOptions::default()).unwrap();
        let xs: Vec<u16> = playfield.items.iter().map(|item| item.x).collect();
        assert_eq!(xs, vec![10, 100, 200]);
        assert_eq!(playfield.items_in_supertile_column(0).len(), 2);
        assert!(playfield.items_in_supertile_column(1).is_empty());
        assert_eq!(playfield.items[0].parm, [1, 2, 3, 4]);
    }

    #[test]
    fn zero_point_spline_is_empty_not_fatal() {
        let playfield = load(&playfield_fork(), &PlayfieldOptions::default()).unwrap();
        assert_eq!(playfield.splines.len(), 2);
        assert_eq!(playfield.splines[0].points[1], SplinePoint { x: 3.0, z: 4.0 });
        assert_eq!(playfield.splines[0].items[0].item_type, 9);
        assert!(playfield.splines[1].points.is_empty());
        assert!(playfield.splines[1].items.is_empty());
        assert_eq!(playfield.fences[0].nubs[1], FencePoint { x: 30, z: 40 });
    }

    #[test]
    fn missing_spline_and_fence_lists_mean_none() {
        let mut writer = playfield_fork();
        let full = ResourceFork::from_bytes("full", writer.to_bytes()).unwrap();
        writer = ResourceForkWriter::new();
        for tag in full.tags() {
            if tag == SPLN || tag == FENC {
                continue;
            }
            for id in full.ids(tag) {
                writer.add(tag, id, None, full.get(tag, id).unwrap().to_vec());
            }
        }
        let playfield = load(&writer, &PlayfieldOptions::default()).unwrap();
        assert!(playfield.splines.is_empty());
        assert!(playfield.fences.is_empty());
    }

    #[test]
    fn zero_nub_fence_is_empty_not_fatal() {
        let full = ResourceFork::from_bytes("full", playfield_fork().to_bytes()).unwrap();
        let mut writer = ResourceForkWriter::new();
        for tag in full.tags() {
            if tag == FNNB {
                continue;
            }
            for id in full.ids(tag) {
                writer.add(tag, id, None, full.get(tag, id).unwrap().to_vec());
            }
        }
        writer.add(
            FENC,
            1000,
            None,
            RecordWriter::new()
                .u16(3)
                .i16(0)
                .i32(0)
                .rect(Rect::default())
                .finish(),
        );
        let playfield = load(&writer, &PlayfieldOptions::default()).unwrap();
        assert_eq!(playfield.fences.len(), 1);
        assert_eq!(playfield.fences[0].fence_type, 3);
        assert!(playfield.fences[0].nubs.is_empty());
    }

    #[test]
    fn header_counts_beyond_lists_are_truncated() {
        let mut writer = playfield_fork();
        writer.add(HEDR, 1000, None, header(PLAYFIELD_FILE_VERSION, 3, 1));
        assert!(matches!(
            load(&writer, &PlayfieldOptions::default()),
            Err(LoadError::Truncated { tag: SPLN, expected: 84, actual: 56, .. })
        ));

        let mut writer = playfield_fork();
        writer.add(HEDR, 1000, None, header(PLAYFIELD_FILE_VERSION, 2, 2));
        assert!(matches!(
            load(&writer, &PlayfieldOptions::default()),
            Err(LoadError::Truncated { tag: FENC, expected: 32, actual: 16, .. })
        ));
    }

    #[test]
    fn version_and_tile_table_errors_are_fatal() {
        let mut writer = playfield_fork();
        let old = NumVersion {
            major: 0,
            minor_and_bug: 9,
            stage: 0x80,
            non_release: 0,
        };
        writer.add(HEDR, 1000, None, header(old, 2, 1));
        assert!(matches!(
            load(&writer, &PlayfieldOptions::default()),
            Err(LoadError::VersionMismatch { kind: "playfield", .. })
        ));
        let relaxed = PlayfieldOptions {
            expected_version: old,
            ..PlayfieldOptions::default()
        };
        assert!(load(&writer, &relaxed).is_ok());

        let mut writer = playfield_fork();
        writer.add(XLAT, 1000, None, RecordWriter::new().i16(0).finish());
        assert!(matches!(
            load(&writer, &PlayfieldOptions::default()),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn short_layer_is_truncated() {
        let mut writer = playfield_fork();
        writer.add(LAYR, 1000, None, vec![0; 10]);
        assert!(matches!(
            load(&writer, &PlayfieldOptions::default()),
            Err(LoadError::Truncated { .. })
        ));
    }
}
