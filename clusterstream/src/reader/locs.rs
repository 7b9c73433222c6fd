//! Position readers: locs, clocs and pos all yield one integer (x, y) per
//! cluster in file order, on the instrument's quantized coordinate grid.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use lanedir::formats::{FileFormat, TileFileSet};
use lanedir::Compression;
use memmap2::Mmap;
use readstructure::cluster::ClusterData;

use crate::parser::locs::{clocs_header, locs_header, locs_record, LOCS_HEADER_SIZE, LOCS_RECORD_SIZE};
use crate::reader::{map_file, open_text};
use crate::tile::{PerTileParser, TileReader};
use crate::StreamError;

const CLOCS_HEADER_SIZE: usize = 5;
const BIN_SIZE: u32 = 25;
const IMAGE_WIDTH: u32 = 2048;
const BINS_PER_ROW: u32 = (IMAGE_WIDTH + BIN_SIZE - 1) / BIN_SIZE;

/// Float coordinate to the quantized integer grid.
pub(crate) fn qseq_coord(value: f32) -> i32 {
    (value * 10.0 + 1000.0).round() as i32
}

fn reject_compressed(
    path: &Path,
    compression: Compression,
    format: FileFormat,
) -> Result<(), StreamError> {
    if compression != Compression::None {
        return Err(StreamError::FormatMismatch {
            path: path.to_path_buf(),
            format,
            reason: "position binaries are never compressed".to_string(),
        });
    }
    Ok(())
}

/// Fixed header then float pairs.
pub struct LocsReader {
    path: PathBuf,
    map: Mmap,
    num_clusters: u32,
    cursor: u32,
}

impl TileReader for LocsReader {
    type Record = (i32, i32);
    const FORMAT: FileFormat = FileFormat::Locs;

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError> {
        reject_compressed(path, compression, Self::FORMAT)?;
        let map = map_file(path)?;
        let (_, num_clusters) = locs_header(&map)
            .map_err(|e| StreamError::parse_failure(path, Self::FORMAT, e.to_string()))?;
        if map.len() < LOCS_HEADER_SIZE + num_clusters as usize * LOCS_RECORD_SIZE {
            return Err(StreamError::FormatMismatch {
                path: path.to_path_buf(),
                format: Self::FORMAT,
                reason: format!(
                    "declares {num_clusters} clusters but holds {} record bytes",
                    map.len() - LOCS_HEADER_SIZE
                ),
            });
        }
        Ok(LocsReader {
            path: path.to_path_buf(),
            map,
            num_clusters,
            cursor: 0,
        })
    }

    fn next_record(&mut self) -> Option<Result<(i32, i32), StreamError>> {
        if self.cursor == self.num_clusters {
            return None;
        }
        let offset = LOCS_HEADER_SIZE + self.cursor as usize * LOCS_RECORD_SIZE;
        let (_, (x, y)) = match locs_record(&self.map[offset..]) {
            Ok(parsed) => parsed,
            Err(_) => return Some(Err(StreamError::EofError(self.path.clone()))),
        };
        self.cursor += 1;
        Some(Ok((qseq_coord(x), qseq_coord(y))))
    }
}

/// Bin-compressed positions: per bin a record count, then (dx, dy) byte
/// pairs relative to the bin's corner on a 25-pixel grid.
pub struct ClocsReader {
    path: PathBuf,
    map: Mmap,
    offset: usize,
    num_bins: u32,
    bins_consumed: u32,
    bin_remaining: u8,
}

impl TileReader for ClocsReader {
    type Record = (i32, i32);
    const FORMAT: FileFormat = FileFormat::Clocs;

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError> {
        reject_compressed(path, compression, Self::FORMAT)?;
        let map = map_file(path)?;
        let (_, (_version, num_bins)) = clocs_header(&map)
            .map_err(|e| StreamError::parse_failure(path, Self::FORMAT, e.to_string()))?;
        Ok(ClocsReader {
            path: path.to_path_buf(),
            map,
            offset: CLOCS_HEADER_SIZE,
            num_bins,
            bins_consumed: 0,
            bin_remaining: 0,
        })
    }

    fn next_record(&mut self) -> Option<Result<(i32, i32), StreamError>> {
        while self.bin_remaining == 0 {
            if self.bins_consumed == self.num_bins {
                return None;
            }
            let Some(&count) = self.map.get(self.offset) else {
                return Some(Err(StreamError::EofError(self.path.clone())));
            };
            self.offset += 1;
            self.bins_consumed += 1;
            self.bin_remaining = count;
        }
        if self.offset + 2 > self.map.len() {
            return Some(Err(StreamError::EofError(self.path.clone())));
        }
        let dx = u32::from(self.map[self.offset]);
        let dy = u32::from(self.map[self.offset + 1]);
        self.offset += 2;
        self.bin_remaining -= 1;

        let bin = self.bins_consumed - 1;
        let bin_x = (bin % BINS_PER_ROW) * BIN_SIZE;
        let bin_y = (bin / BINS_PER_ROW) * BIN_SIZE;
        let x = (bin_x * 10 + dx + 1000) as i32;
        let y = (bin_y * 10 + dy + 1000) as i32;
        Some(Ok((x, y)))
    }
}

/// Whitespace-delimited text, two floats per line.
pub struct PosReader {
    path: PathBuf,
    lines: std::io::Lines<Box<dyn BufRead + Send>>,
    line_number: usize,
}

impl TileReader for PosReader {
    type Record = (i32, i32);
    const FORMAT: FileFormat = FileFormat::Pos;

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError> {
        Ok(PosReader {
            path: path.to_path_buf(),
            lines: open_text(path, compression)?.lines(),
            line_number: 0,
        })
    }

    fn next_record(&mut self) -> Option<Result<(i32, i32), StreamError>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(StreamError::IoError(e))),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let parsed = (|| {
                let x: f32 = fields.next()?.parse().ok()?;
                let y: f32 = fields.next()?.parse().ok()?;
                Some((x, y))
            })();
            return Some(match parsed {
                Some((x, y)) => Ok((qseq_coord(x), qseq_coord(y))),
                None => Err(StreamError::FormatMismatch {
                    path: self.path.clone(),
                    format: Self::FORMAT,
                    reason: format!("line {} is not two floats", self.line_number),
                }),
            });
        }
    }
}

/// Routes positions from whichever position format was selected.
pub struct PositionParser<R: TileReader<Record = (i32, i32)>> {
    inner: PerTileParser<R>,
}

impl<R: TileReader<Record = (i32, i32)>> PositionParser<R> {
    pub(crate) fn new(set: &TileFileSet, tiles: &[u32]) -> Result<Self, StreamError> {
        Ok(PositionParser {
            inner: PerTileParser::new(set.files(tiles)?),
        })
    }

    pub(crate) fn has_next(&mut self) -> Result<bool, StreamError> {
        self.inner.has_next()
    }

    pub(crate) fn tile_of_next_cluster(&mut self) -> Result<Option<u32>, StreamError> {
        self.inner.tile_of_next_cluster()
    }

    pub(crate) fn seek_to_tile(&mut self, tile: u32) -> Result<(), StreamError> {
        self.inner.seek_to_tile(tile)
    }

    pub(crate) fn advance_into(&mut self, cluster: &mut ClusterData) -> Result<(), StreamError> {
        let (x, y) = self.inner.next_record()?;
        cluster.x = x;
        cluster.y = y;
        Ok(())
    }
}
