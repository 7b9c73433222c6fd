//! Per-format file sets for one lane.
//!
//! Discovery never fails on absence: a format with no files on disk is an
//! empty set whose `available()` is false. Missing files only become errors
//! when a caller asks for a specific tile or cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::fs::read_dir;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::{
    parse_cycle_dir, parse_multi_tile_bcl_name, parse_per_tile_name, parse_per_tile_suffix_name,
    parse_qseq_name, per_tile_name, per_tile_suffix_name, qseq_name, tile_index_name, Compression,
    LaneDirError, LaneDirs, BARCODE_SUFFIX, BCL_EXT, CIF_EXT, CLOCS_EXT, CNF_EXT, FILTER_EXT,
    LOCS_EXT, POS_SUFFIX,
};

/// Every on-disk format the lane may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileFormat {
    Bcl,
    MultiTileBcl,
    Cif,
    Cnf,
    Locs,
    Clocs,
    Pos,
    Filter,
    Barcode,
    Qseq,
}

impl Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileFormat::Bcl => "bcl",
            FileFormat::MultiTileBcl => "multi-tile bcl",
            FileFormat::Cif => "cif",
            FileFormat::Cnf => "cnf",
            FileFormat::Locs => "locs",
            FileFormat::Clocs => "clocs",
            FileFormat::Pos => "pos",
            FileFormat::Filter => "filter",
            FileFormat::Barcode => "barcode",
            FileFormat::Qseq => "qseq",
        };
        write!(f, "{s}")
    }
}

/// How per-tile file names are shaped for a format.
#[derive(Debug, Clone, Copy)]
enum NameShape {
    /// `s_<lane>_<tile>.<ext>`
    Ext(&'static str),
    /// `s_<lane>_<tile><suffix>`
    Suffix(&'static str),
}

/// One file per tile: filter, barcode, locs, clocs, pos.
#[derive(Debug, Clone)]
pub struct TileFileSet {
    dir: PathBuf,
    lane: u32,
    shape: NameShape,
    files: BTreeMap<u32, (PathBuf, Compression)>,
}

impl TileFileSet {
    /// Scan `dir` for `s_<lane>_<tile>.<ext>[.gz|.bz2]`.
    pub fn discover(dir: &Path, lane: u32, ext: &'static str) -> Result<Self, LaneDirError> {
        Self::scan(dir, lane, NameShape::Ext(ext))
    }

    /// Scan `dir` for `s_<lane>_<tile><suffix>[.gz|.bz2]`.
    pub fn discover_suffix(
        dir: &Path,
        lane: u32,
        suffix: &'static str,
    ) -> Result<Self, LaneDirError> {
        Self::scan(dir, lane, NameShape::Suffix(suffix))
    }

    fn scan(dir: &Path, lane: u32, shape: NameShape) -> Result<Self, LaneDirError> {
        let mut files = BTreeMap::new();
        if dir.is_dir() {
            for entry in read_dir(dir)? {
                let path = entry?.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let parsed = match shape {
                    NameShape::Ext(ext) => parse_per_tile_name(name, ext),
                    NameShape::Suffix(suffix) => parse_per_tile_suffix_name(name, suffix),
                };
                let Some((file_lane, tile, compression)) = parsed else {
                    continue;
                };
                if file_lane != lane {
                    continue;
                }
                // a plain file wins over a compressed twin
                let keep = matches!(files.get(&tile), Some((_, Compression::None)));
                if !keep {
                    files.insert(tile, (path, compression));
                }
            }
        }
        debug!(
            "found {} per-tile files for lane {lane} in {}",
            files.len(),
            dir.display()
        );
        Ok(TileFileSet {
            dir: dir.to_path_buf(),
            lane,
            shape,
            files,
        })
    }

    pub fn available(&self) -> bool {
        !self.files.is_empty()
    }

    /// Ascending tile numbers covered by this format.
    pub fn tiles(&self) -> Vec<u32> {
        self.files.keys().copied().collect()
    }

    pub fn file(&self, tile: u32) -> Option<&(PathBuf, Compression)> {
        self.files.get(&tile)
    }

    /// Tile → file for exactly the requested tiles; any absent tile is fatal.
    pub fn files(
        &self,
        tiles: &[u32],
    ) -> Result<BTreeMap<u32, (PathBuf, Compression)>, LaneDirError> {
        tiles
            .iter()
            .map(|&tile| {
                self.files
                    .get(&tile)
                    .cloned()
                    .map(|f| (tile, f))
                    .ok_or_else(|| LaneDirError::NotFound(self.expected_path(tile)))
            })
            .collect()
    }

    fn expected_path(&self, tile: u32) -> PathBuf {
        let name = match self.shape {
            NameShape::Ext(ext) => per_tile_name(self.lane, tile, ext),
            NameShape::Suffix(suffix) => per_tile_suffix_name(self.lane, tile, suffix),
        };
        self.dir.join(name)
    }
}

/// One file per (tile, cycle): bcl, cif, cnf.
#[derive(Debug, Clone)]
pub struct CycleFileSet {
    lane_dir: PathBuf,
    lane: u32,
    ext: &'static str,
    // cycle -> tile -> file
    cycles: BTreeMap<u32, BTreeMap<u32, (PathBuf, Compression)>>,
}

impl CycleFileSet {
    /// Scan `lane_dir/C<cycle>.1/` subdirectories for per-tile files.
    pub fn discover(lane_dir: &Path, lane: u32, ext: &'static str) -> Result<Self, LaneDirError> {
        let mut cycles: BTreeMap<u32, BTreeMap<u32, (PathBuf, Compression)>> = BTreeMap::new();
        if lane_dir.is_dir() {
            for entry in read_dir(lane_dir)? {
                let path = entry?.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(cycle) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(parse_cycle_dir)
                else {
                    continue;
                };
                let mut tiles = BTreeMap::new();
                for file in read_dir(&path)? {
                    let file = file?.path();
                    let Some((file_lane, tile, compression)) = file
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(|n| parse_per_tile_name(n, ext))
                    else {
                        continue;
                    };
                    if file_lane == lane {
                        tiles.insert(tile, (file, compression));
                    }
                }
                if !tiles.is_empty() {
                    cycles.insert(cycle, tiles);
                }
            }
        }
        debug!(
            "found {ext} files for {} cycles of lane {lane} in {}",
            cycles.len(),
            lane_dir.display()
        );
        Ok(CycleFileSet {
            lane_dir: lane_dir.to_path_buf(),
            lane,
            ext,
            cycles,
        })
    }

    pub fn available(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Ascending cycle numbers with at least one file.
    pub fn cycles(&self) -> Vec<u32> {
        self.cycles.keys().copied().collect()
    }

    /// Union of tiles across cycles, ascending.
    pub fn tiles(&self) -> Vec<u32> {
        let mut tiles = BTreeSet::new();
        for per_cycle in self.cycles.values() {
            tiles.extend(per_cycle.keys().copied());
        }
        tiles.into_iter().collect()
    }

    /// Cycle directories must run 1..C with no holes.
    pub fn verify_contiguous(&self) -> Result<u32, LaneDirError> {
        let mut expected = 1u32;
        for &cycle in self.cycles.keys() {
            if cycle != expected {
                return Err(LaneDirError::MissingCycleDir(expected));
            }
            expected += 1;
        }
        Ok(expected - 1)
    }

    /// (cycle, file) pairs for one tile over the requested cycles, in
    /// cycle order; any absent combination is fatal.
    pub fn files_for(
        &self,
        tile: u32,
        cycles: &[u16],
    ) -> Result<Vec<(u16, PathBuf, Compression)>, LaneDirError> {
        cycles
            .iter()
            .map(|&cycle| {
                self.cycles
                    .get(&u32::from(cycle))
                    .and_then(|tiles| tiles.get(&tile))
                    .map(|(path, compression)| (cycle, path.clone(), *compression))
                    .ok_or_else(|| {
                        LaneDirError::NotFound(
                            self.lane_dir
                                .join(crate::cycle_dir_name(u32::from(cycle)))
                                .join(per_tile_name(self.lane, tile, self.ext)),
                        )
                    })
            })
            .collect()
    }
}

/// Legacy QSeq text: one file per (read, tile).
#[derive(Debug, Clone)]
pub struct QseqFileSet {
    dir: PathBuf,
    lane: u32,
    // read number -> tile -> file
    reads: BTreeMap<u32, BTreeMap<u32, (PathBuf, Compression)>>,
}

impl QseqFileSet {
    pub fn discover(dir: &Path, lane: u32) -> Result<Self, LaneDirError> {
        let mut reads: BTreeMap<u32, BTreeMap<u32, (PathBuf, Compression)>> = BTreeMap::new();
        if dir.is_dir() {
            for entry in read_dir(dir)? {
                let path = entry?.path();
                let Some((file_lane, read, tile, compression)) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(parse_qseq_name)
                else {
                    continue;
                };
                if file_lane == lane {
                    reads
                        .entry(read)
                        .or_default()
                        .insert(tile, (path, compression));
                }
            }
        }
        Ok(QseqFileSet {
            dir: dir.to_path_buf(),
            lane,
            reads,
        })
    }

    pub fn available(&self) -> bool {
        !self.reads.is_empty()
    }

    /// Ascending read numbers present on disk.
    pub fn read_numbers(&self) -> Vec<u32> {
        self.reads.keys().copied().collect()
    }

    /// Tiles of the first read; `verify_consistent` guarantees the rest agree.
    pub fn tiles(&self) -> Vec<u32> {
        self.reads
            .values()
            .next()
            .map(|tiles| tiles.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Read numbers must run 1..R and every read must cover the same tiles.
    pub fn verify_consistent(&self) -> Result<(), LaneDirError> {
        let mut expected = 1u32;
        for &read in self.reads.keys() {
            if read != expected {
                return Err(LaneDirError::MissingQseqRead(expected));
            }
            expected += 1;
        }
        let mut iter = self.reads.iter();
        if let Some((&first_read, first_tiles)) = iter.next() {
            let reference: Vec<u32> = first_tiles.keys().copied().collect();
            for (&read, tiles) in iter {
                let got: Vec<u32> = tiles.keys().copied().collect();
                if got != reference {
                    return Err(LaneDirError::QseqTileMismatch(first_read, read));
                }
            }
        }
        Ok(())
    }

    /// Tile → file for one read over the requested tiles.
    pub fn files(
        &self,
        read: u32,
        tiles: &[u32],
    ) -> Result<BTreeMap<u32, (PathBuf, Compression)>, LaneDirError> {
        let per_tile = self
            .reads
            .get(&read)
            .ok_or_else(|| LaneDirError::MissingQseqRead(read))?;
        tiles
            .iter()
            .map(|&tile| {
                per_tile
                    .get(&tile)
                    .cloned()
                    .map(|f| (tile, f))
                    .ok_or_else(|| {
                        LaneDirError::NotFound(self.dir.join(qseq_name(self.lane, read, tile)))
                    })
            })
            .collect()
    }
}

/// Block-compressed BCLs packing all tiles into one file per cycle,
/// addressed through `.bci` virtual-offset sidecars and a tile index.
#[derive(Debug, Clone)]
pub struct MultiTileFileSet {
    lane_dir: PathBuf,
    cycle_files: BTreeMap<u32, PathBuf>,
    tile_index: Option<PathBuf>,
}

impl MultiTileFileSet {
    pub fn discover(lane_dir: &Path, lane: u32) -> Result<Self, LaneDirError> {
        let mut cycle_files = BTreeMap::new();
        if lane_dir.is_dir() {
            for entry in read_dir(lane_dir)? {
                let path = entry?.path();
                let Some(cycle) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(parse_multi_tile_bcl_name)
                else {
                    continue;
                };
                cycle_files.insert(cycle, path);
            }
        }
        let tile_index = Some(lane_dir.join(tile_index_name(lane))).filter(|p| p.is_file());
        Ok(MultiTileFileSet {
            lane_dir: lane_dir.to_path_buf(),
            cycle_files,
            tile_index,
        })
    }

    pub fn available(&self) -> bool {
        !self.cycle_files.is_empty() && self.tile_index.is_some()
    }

    pub fn cycles(&self) -> Vec<u32> {
        self.cycle_files.keys().copied().collect()
    }

    pub fn tile_index(&self) -> Option<&Path> {
        self.tile_index.as_deref()
    }

    pub fn verify_contiguous(&self) -> Result<u32, LaneDirError> {
        let mut expected = 1u32;
        for &cycle in self.cycle_files.keys() {
            if cycle != expected {
                return Err(LaneDirError::MissingCycleDir(expected));
            }
            expected += 1;
        }
        Ok(expected - 1)
    }

    /// (cycle, bcl file) pairs for the requested cycles.
    pub fn files_for(&self, cycles: &[u16]) -> Result<Vec<(u16, PathBuf)>, LaneDirError> {
        cycles
            .iter()
            .map(|&cycle| {
                self.cycle_files
                    .get(&u32::from(cycle))
                    .map(|path| (cycle, path.clone()))
                    .ok_or_else(|| {
                        LaneDirError::NotFound(
                            self.lane_dir
                                .join(crate::multi_tile_bcl_name(u32::from(cycle))),
                        )
                    })
            })
            .collect()
    }

    /// `.bci` virtual-offset sidecar of a cycle file.
    pub fn bci_path(cycle_file: &Path) -> PathBuf {
        let mut os = cycle_file.as_os_str().to_owned();
        os.push(".bci");
        PathBuf::from(os)
    }
}

/// Everything one lane has on disk, every format scanned once.
#[derive(Debug, Clone)]
pub struct LaneFiles {
    pub bcl: CycleFileSet,
    pub multi_tile_bcl: MultiTileFileSet,
    pub cif: CycleFileSet,
    pub cnf: CycleFileSet,
    pub locs: TileFileSet,
    pub clocs: TileFileSet,
    pub pos: TileFileSet,
    pub filter: TileFileSet,
    pub barcode: TileFileSet,
    pub qseq: QseqFileSet,
}

impl LaneFiles {
    pub fn discover(dirs: &LaneDirs) -> Result<Self, LaneDirError> {
        let lane = dirs.lane();
        let bc_lane = dirs.basecall_lane_dir();
        let int_lane = dirs.intensities_lane_dir();
        Ok(LaneFiles {
            bcl: CycleFileSet::discover(&bc_lane, lane, BCL_EXT)?,
            multi_tile_bcl: MultiTileFileSet::discover(&bc_lane, lane)?,
            cif: CycleFileSet::discover(&int_lane, lane, CIF_EXT)?,
            cnf: CycleFileSet::discover(&int_lane, lane, CNF_EXT)?,
            locs: TileFileSet::discover(&int_lane, lane, LOCS_EXT)?,
            clocs: TileFileSet::discover(&int_lane, lane, CLOCS_EXT)?,
            pos: TileFileSet::discover_suffix(dirs.intensities_dir(), lane, POS_SUFFIX)?,
            filter: TileFileSet::discover(&bc_lane, lane, FILTER_EXT)?,
            barcode: TileFileSet::discover_suffix(dirs.basecall_dir(), lane, BARCODE_SUFFIX)?,
            qseq: QseqFileSet::discover(dirs.basecall_dir(), lane)?,
        })
    }

    /// Tiles a format claims to cover, for cross-format validation.
    pub fn tiles_of(&self, format: FileFormat) -> Vec<u32> {
        match format {
            FileFormat::Bcl => self.bcl.tiles(),
            // the packed file's tiles come from the tile index, which is
            // binary; the caller reads it and supplies the tiles
            FileFormat::MultiTileBcl => Vec::new(),
            FileFormat::Cif => self.cif.tiles(),
            FileFormat::Cnf => self.cnf.tiles(),
            FileFormat::Locs => self.locs.tiles(),
            FileFormat::Clocs => self.clocs.tiles(),
            FileFormat::Pos => self.pos.tiles(),
            FileFormat::Filter => self.filter.tiles(),
            FileFormat::Barcode => self.barcode.tiles(),
            FileFormat::Qseq => self.qseq.tiles(),
        }
    }

    pub fn available(&self, format: FileFormat) -> bool {
        match format {
            FileFormat::Bcl => self.bcl.available(),
            FileFormat::MultiTileBcl => self.multi_tile_bcl.available(),
            FileFormat::Cif => self.cif.available(),
            FileFormat::Cnf => self.cnf.available(),
            FileFormat::Locs => self.locs.available(),
            FileFormat::Clocs => self.clocs.available(),
            FileFormat::Pos => self.pos.available(),
            FileFormat::Filter => self.filter.available(),
            FileFormat::Barcode => self.barcode.available(),
            FileFormat::Qseq => self.qseq.available(),
        }
    }
}
