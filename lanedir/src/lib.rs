//! Model of one lane of an Illumina run directory.
//!
//! The basecalls directory holds per-tile filter files, per-tile-per-cycle
//! BCLs under `C<cycle>.1/` subdirectories, barcode assignments, and legacy
//! QSeq text; its parent (the intensities directory) holds positions and
//! raw intensity/noise files with the same lane/cycle sharding. Everything
//! here is path and name arithmetic; no file contents are read except
//! RunInfo.xml.

use std::convert::AsRef;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub mod formats;
pub mod run_info;

const LANE_PREFIX: &str = "L";
const CYCLE_PREFIX: &str = "C";
const CYCLE_SUFFIX: &str = ".1";
const TILE_FILE_PREFIX: &str = "s_";
const GZ_EXT: &str = ".gz";
const BZ2_EXT: &str = ".bz2";

pub const BCL_EXT: &str = "bcl";
pub const CIF_EXT: &str = "cif";
pub const CNF_EXT: &str = "cnf";
pub const LOCS_EXT: &str = "locs";
pub const CLOCS_EXT: &str = "clocs";
pub const FILTER_EXT: &str = "filter";
pub const BCI_EXT: &str = "bci";
pub const POS_SUFFIX: &str = "_pos.txt";
pub const BARCODE_SUFFIX: &str = "_barcode.txt";
pub const QSEQ_SUFFIX: &str = "_qseq.txt";
pub const MULTI_TILE_BCL_SUFFIX: &str = ".bcl.bgzf";

#[derive(Debug, Error)]
pub enum LaneDirError {
    #[error("cannot find {0} or it is not readable")]
    NotFound(PathBuf),
    #[error("lane number must be >= 1, got {0}")]
    BadLane(u32),
    #[error("basecall directory {0} has no parent to use as the intensities directory")]
    NoIntensitiesDir(PathBuf),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("cycle directories are not contiguous from 1: missing cycle {0}")]
    MissingCycleDir(u32),
    #[error("QSeq read files disagree on tiles: read {0} differs from read {1}")]
    QseqTileMismatch(u32, u32),
    #[error("QSeq read numbers are not contiguous from 1: missing read {0}")]
    MissingQseqRead(u32),
    #[error("RunInfo.xml is malformed: {0}")]
    BadRunInfo(String),
}

/// Trailing compression wrapper of a file, detected from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

/// The immutable location context every discovery helper works from.
#[derive(Debug, Clone, Serialize)]
pub struct LaneDirs {
    basecall_dir: PathBuf,
    intensities_dir: PathBuf,
    lane: u32,
}

impl LaneDirs {
    /// `basecall_dir` must exist; the intensities directory is its parent.
    pub fn new<P: AsRef<Path>>(basecall_dir: P, lane: u32) -> Result<Self, LaneDirError> {
        if lane < 1 {
            return Err(LaneDirError::BadLane(lane));
        }
        let basecall_dir = basecall_dir.as_ref();
        if !basecall_dir.is_dir() {
            return Err(LaneDirError::NotFound(basecall_dir.to_path_buf()));
        }
        let intensities_dir = basecall_dir
            .parent()
            .ok_or_else(|| LaneDirError::NoIntensitiesDir(basecall_dir.to_path_buf()))?
            .to_path_buf();
        Ok(LaneDirs {
            basecall_dir: basecall_dir.to_path_buf(),
            intensities_dir,
            lane,
        })
    }

    pub fn lane(&self) -> u32 {
        self.lane
    }

    pub fn basecall_dir(&self) -> &Path {
        &self.basecall_dir
    }

    pub fn intensities_dir(&self) -> &Path {
        &self.intensities_dir
    }

    /// `<basecalls>/L<lll>`
    pub fn basecall_lane_dir(&self) -> PathBuf {
        self.basecall_dir.join(lane_subdir(self.lane))
    }

    /// `<intensities>/L<lll>`
    pub fn intensities_lane_dir(&self) -> PathBuf {
        self.intensities_dir.join(lane_subdir(self.lane))
    }
}

/// Lane subdirectory name, zero-padded to width 3: `L001`.
pub fn lane_subdir(lane: u32) -> String {
    format!("{LANE_PREFIX}{lane:03}")
}

/// Cycle subdirectory name: `C<cycle>.1`.
pub fn cycle_dir_name(cycle: u32) -> String {
    format!("{CYCLE_PREFIX}{cycle}{CYCLE_SUFFIX}")
}

/// Parse `C<cycle>.1` back to the cycle number.
pub fn parse_cycle_dir(name: &str) -> Option<u32> {
    name.strip_prefix(CYCLE_PREFIX)?
        .strip_suffix(CYCLE_SUFFIX)?
        .parse()
        .ok()
}

/// Split a trailing `.gz`/`.bz2` off a file name.
pub fn split_compression(name: &str) -> (&str, Compression) {
    if let Some(stem) = name.strip_suffix(GZ_EXT) {
        (stem, Compression::Gzip)
    } else if let Some(stem) = name.strip_suffix(BZ2_EXT) {
        (stem, Compression::Bzip2)
    } else {
        (name, Compression::None)
    }
}

/// `s_<lane>_<tile>.<ext>`
pub fn per_tile_name(lane: u32, tile: u32, ext: &str) -> String {
    format!("{TILE_FILE_PREFIX}{lane}_{tile}.{ext}")
}

/// `s_<lane>_<tile><suffix>`, for the `_pos.txt` / `_barcode.txt` shapes.
pub fn per_tile_suffix_name(lane: u32, tile: u32, suffix: &str) -> String {
    format!("{TILE_FILE_PREFIX}{lane}_{tile}{suffix}")
}

/// `s_<lane>_<read>_<tttt>_qseq.txt` with the tile zero-padded to 4 digits.
pub fn qseq_name(lane: u32, read: u32, tile: u32) -> String {
    format!("{TILE_FILE_PREFIX}{lane}_{read}_{tile:04}{QSEQ_SUFFIX}")
}

/// Multi-tile per-cycle file: `<cccc>.bcl.bgzf`.
pub fn multi_tile_bcl_name(cycle: u32) -> String {
    format!("{cycle:04}{MULTI_TILE_BCL_SUFFIX}")
}

/// Tile index sidecar for a multi-tile lane: `s_<lane>.bci`.
pub fn tile_index_name(lane: u32) -> String {
    format!("{TILE_FILE_PREFIX}{lane}.{BCI_EXT}")
}

/// Parse `s_<lane>_<tile>.<ext>[.gz|.bz2]`.
pub fn parse_per_tile_name(name: &str, ext: &str) -> Option<(u32, u32, Compression)> {
    let (name, compression) = split_compression(name);
    let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
    parse_lane_tile(stem).map(|(lane, tile)| (lane, tile, compression))
}

/// Parse `s_<lane>_<tile><suffix>[.gz|.bz2]`.
pub fn parse_per_tile_suffix_name(name: &str, suffix: &str) -> Option<(u32, u32, Compression)> {
    let (name, compression) = split_compression(name);
    let stem = name.strip_suffix(suffix)?;
    parse_lane_tile(stem).map(|(lane, tile)| (lane, tile, compression))
}

fn parse_lane_tile(stem: &str) -> Option<(u32, u32)> {
    let rest = stem.strip_prefix(TILE_FILE_PREFIX)?;
    let (lane, tile) = rest.split_once('_')?;
    Some((lane.parse().ok()?, tile.parse().ok()?))
}

/// Parse `s_<lane>_<read>_<tttt>_qseq.txt[.gz|.bz2]` to (lane, read, tile).
pub fn parse_qseq_name(name: &str) -> Option<(u32, u32, u32, Compression)> {
    let (name, compression) = split_compression(name);
    let rest = name.strip_suffix(QSEQ_SUFFIX)?.strip_prefix(TILE_FILE_PREFIX)?;
    let mut parts = rest.split('_');
    let lane = parts.next()?.parse().ok()?;
    let read = parts.next()?;
    // one digit, per the instrument's naming
    if read.len() != 1 {
        return None;
    }
    let read = read.parse().ok()?;
    let tile = parts.next()?;
    if tile.len() != 4 {
        return None;
    }
    let tile = tile.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((lane, read, tile, compression))
}

/// Parse `<cccc>.bcl.bgzf` to the cycle number.
pub fn parse_multi_tile_bcl_name(name: &str) -> Option<u32> {
    name.strip_suffix(MULTI_TILE_BCL_SUFFIX)?.parse().ok()
}
