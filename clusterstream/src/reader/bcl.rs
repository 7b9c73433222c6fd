//! Per-cycle BCL reading and the base-call parser built on it.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use lanedir::formats::{CycleFileSet, FileFormat};
use lanedir::Compression;
use memmap2::Mmap;
use readstructure::cluster::ClusterData;
use readstructure::mapping::OutputMapping;

use crate::cycle::{CycleReader, PerCycleParser};
use crate::eamss;
use crate::parser::bcl::{bcl_header, BASE_LOOKUP, QUAL_LOOKUP};
use crate::reader::{map_file, open_file};
use crate::StreamError;

pub(crate) const BCL_HEADER_SIZE: usize = 4;

enum BclBytes {
    Mapped(Mmap),
    Inflated(Vec<u8>),
}

impl BclBytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            BclBytes::Mapped(map) => map,
            BclBytes::Inflated(bytes) => bytes,
        }
    }
}

/// One (lane, tile, cycle) BCL file: a cluster count then one byte per
/// cluster packing base and quality.
pub struct BclCycleReader {
    path: PathBuf,
    bytes: BclBytes,
    num_clusters: u32,
    cursor: usize,
}

impl CycleReader for BclCycleReader {
    type Value = (u8, u8);
    const FORMAT: FileFormat = FileFormat::Bcl;

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError> {
        let bytes = match compression {
            Compression::None => BclBytes::Mapped(map_file(path)?),
            Compression::Gzip => {
                let mut buf = Vec::new();
                MultiGzDecoder::new(open_file(path)?)
                    .read_to_end(&mut buf)
                    .map_err(|e| StreamError::DecompressError {
                        path: path.to_path_buf(),
                        msg: e.to_string(),
                    })?;
                BclBytes::Inflated(buf)
            }
            Compression::Bzip2 => {
                return Err(StreamError::FormatMismatch {
                    path: path.to_path_buf(),
                    format: FileFormat::Bcl,
                    reason: "bcl files are never bzip2-compressed".to_string(),
                })
            }
        };
        let data = bytes.as_slice();
        let (_, num_clusters) = bcl_header(data).map_err(|e| {
            StreamError::parse_failure(path, FileFormat::Bcl, e.to_string())
        })?;
        if data.len() < BCL_HEADER_SIZE + num_clusters as usize {
            return Err(StreamError::FormatMismatch {
                path: path.to_path_buf(),
                format: FileFormat::Bcl,
                reason: format!(
                    "declares {num_clusters} clusters but holds {}",
                    data.len() - BCL_HEADER_SIZE
                ),
            });
        }
        Ok(BclCycleReader {
            path: path.to_path_buf(),
            bytes,
            num_clusters,
            cursor: BCL_HEADER_SIZE,
        })
    }

    fn cluster_count(&self) -> u32 {
        self.num_clusters
    }

    fn next_value(&mut self) -> Result<(u8, u8), StreamError> {
        let byte = self
            .bytes
            .as_slice()
            .get(self.cursor)
            .copied()
            .ok_or_else(|| StreamError::EofError(self.path.clone()))?;
        self.cursor += 1;
        Ok((BASE_LOOKUP[byte as usize], QUAL_LOOKUP[byte as usize]))
    }
}

/// Fills bases and qualities of every read from per-tile-per-cycle BCLs,
/// then masks trailing low-quality segments unless disabled.
pub struct BclParser {
    inner: PerCycleParser<BclCycleReader>,
    mapping: Arc<OutputMapping>,
    apply_eamss: bool,
}

impl BclParser {
    pub(crate) fn new(
        set: &CycleFileSet,
        tiles: &[u32],
        mapping: Arc<OutputMapping>,
        apply_eamss: bool,
    ) -> Result<Self, StreamError> {
        let mut files = BTreeMap::new();
        for &tile in tiles {
            files.insert(tile, set.files_for(tile, mapping.output_cycles())?);
        }
        Ok(BclParser {
            inner: PerCycleParser::new(files),
            mapping,
            apply_eamss,
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
        let mapping = &self.mapping;
        self.inner.next_values(|cycle, (base, quality)| {
            if let Some(target) = mapping.cycle_target(cycle) {
                let read = &mut cluster.reads[target.major];
                read.bases[target.minor] = base;
                read.qualities[target.minor] = quality;
            }
        })?;
        if self.apply_eamss {
            for read in &mut cluster.reads {
                eamss::mask_in_place(&read.bases, &mut read.qualities);
            }
        }
        Ok(())
    }
}
