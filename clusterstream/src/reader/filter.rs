//! Pass-filter flags: a 12-byte header then one byte per cluster, PF in
//! the low bit.

use std::path::Path;

use lanedir::formats::{FileFormat, TileFileSet};
use lanedir::Compression;
use memmap2::Mmap;
use readstructure::cluster::ClusterData;

use crate::parser::filter::{filter_header, FILTER_HEADER_SIZE, PF_MASK};
use crate::reader::map_file;
use crate::tile::{PerTileParser, TileReader};
use crate::StreamError;

pub struct FilterReader {
    map: Mmap,
    num_clusters: u32,
    cursor: u32,
}

impl TileReader for FilterReader {
    type Record = bool;
    const FORMAT: FileFormat = FileFormat::Filter;

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError> {
        if compression != Compression::None {
            return Err(StreamError::FormatMismatch {
                path: path.to_path_buf(),
                format: Self::FORMAT,
                reason: "filter files are never compressed".to_string(),
            });
        }
        let map = map_file(path)?;
        let (_, (_version, num_clusters)) = filter_header(&map)
            .map_err(|e| StreamError::parse_failure(path, Self::FORMAT, e.to_string()))?;
        if map.len() - FILTER_HEADER_SIZE != num_clusters as usize {
            return Err(StreamError::FormatMismatch {
                path: path.to_path_buf(),
                format: Self::FORMAT,
                reason: format!(
                    "declares {num_clusters} clusters but holds {} record bytes",
                    map.len() - FILTER_HEADER_SIZE
                ),
            });
        }
        Ok(FilterReader {
            map,
            num_clusters,
            cursor: 0,
        })
    }

    fn next_record(&mut self) -> Option<Result<bool, StreamError>> {
        if self.cursor == self.num_clusters {
            return None;
        }
        let byte = self.map[FILTER_HEADER_SIZE + self.cursor as usize];
        self.cursor += 1;
        Some(Ok(byte & PF_MASK == PF_MASK))
    }
}

pub struct FilterParser {
    inner: PerTileParser<FilterReader>,
}

impl FilterParser {
    pub(crate) fn new(set: &TileFileSet, tiles: &[u32]) -> Result<Self, StreamError> {
        Ok(FilterParser {
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
        cluster.pf = self.inner.next_record()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn filter_bytes(flags: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&(flags.len() as u32).to_le_bytes());
    bytes.extend_from_slice(flags);
    bytes
}
