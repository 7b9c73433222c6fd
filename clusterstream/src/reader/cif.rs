//! CIF/CNF intensity reading.
//!
//! The two formats share one binary layout; CIF carries raw channel
//! intensities and CNF carries noise. In the per-tile-per-cycle model each
//! file holds exactly one cycle, so `num_cycles` must be 1.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lanedir::formats::{CycleFileSet, FileFormat};
use lanedir::Compression;
use memmap2::Mmap;
use readstructure::cluster::{ClusterData, FourChannelData};
use readstructure::mapping::OutputMapping;

use crate::cycle::{CycleReader, PerCycleParser};
use crate::parser::cif::{cif_header, CifHeader, CIF_HEADER_SIZE, CIF_VERSION};
use crate::reader::map_file;
use crate::StreamError;

const NUM_CHANNELS: usize = 4;

/// One (lane, tile, cycle) intensity file, memory-mapped for its lifetime.
/// `NOISE` only selects the format name used in diagnostics.
pub struct IntensityCycleReader<const NOISE: bool> {
    path: PathBuf,
    map: Mmap,
    element_size: usize,
    first_cycle: u16,
    num_clusters: u32,
    cursor: u32,
}

impl<const NOISE: bool> IntensityCycleReader<NOISE> {
    fn mismatch(path: &Path, reason: String) -> StreamError {
        StreamError::FormatMismatch {
            path: path.to_path_buf(),
            format: Self::FORMAT,
            reason,
        }
    }

    /// Signed 16-bit value for (cluster, channel, cycle).
    pub(crate) fn value(&self, cluster: u32, channel: usize, cycle: u16) -> i16 {
        let stride = self.num_clusters as usize * self.element_size;
        let offset = CIF_HEADER_SIZE
            + (cycle - self.first_cycle) as usize * NUM_CHANNELS * stride
            + channel * stride
            + cluster as usize * self.element_size;
        match self.element_size {
            1 => self.map[offset] as i8 as i16,
            _ => i16::from_le_bytes([self.map[offset], self.map[offset + 1]]),
        }
    }
}

impl<const NOISE: bool> CycleReader for IntensityCycleReader<NOISE> {
    type Value = [i16; NUM_CHANNELS];
    const FORMAT: FileFormat = if NOISE {
        FileFormat::Cnf
    } else {
        FileFormat::Cif
    };

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError> {
        if compression != Compression::None {
            return Err(Self::mismatch(
                path,
                "intensity files are never compressed".to_string(),
            ));
        }
        let map = map_file(path)?;
        let (_, header) = cif_header(&map)
            .map_err(|e| StreamError::parse_failure(path, Self::FORMAT, e.to_string()))?;
        let CifHeader {
            version,
            element_size,
            first_cycle,
            num_cycles,
            num_clusters,
        } = header;
        if version != CIF_VERSION {
            return Err(Self::mismatch(path, format!("unsupported version {version}")));
        }
        if !matches!(element_size, 1 | 2) {
            return Err(Self::mismatch(
                path,
                format!("element size {element_size} is out of range"),
            ));
        }
        if num_cycles != 1 {
            return Err(Self::mismatch(
                path,
                format!("per-cycle files must hold one cycle, found {num_cycles}"),
            ));
        }
        if num_clusters < 0 {
            return Err(Self::mismatch(
                path,
                format!("negative cluster count {num_clusters}"),
            ));
        }
        let num_clusters = num_clusters as u32;
        let body = NUM_CHANNELS * num_clusters as usize * element_size as usize;
        if map.len() < CIF_HEADER_SIZE + body {
            return Err(Self::mismatch(
                path,
                format!(
                    "declares {num_clusters} clusters but holds {} body bytes",
                    map.len() - CIF_HEADER_SIZE
                ),
            ));
        }
        Ok(IntensityCycleReader {
            path: path.to_path_buf(),
            map,
            element_size: element_size as usize,
            first_cycle,
            num_clusters,
            cursor: 0,
        })
    }

    fn cluster_count(&self) -> u32 {
        self.num_clusters
    }

    fn next_value(&mut self) -> Result<Self::Value, StreamError> {
        if self.cursor >= self.num_clusters {
            return Err(StreamError::EofError(self.path.clone()));
        }
        let cluster = self.cursor;
        self.cursor += 1;
        Ok(std::array::from_fn(|channel| {
            self.value(cluster, channel, self.first_cycle)
        }))
    }

    fn check_agreement(&self, other: &Self) -> Result<(), StreamError> {
        if self.element_size != other.element_size {
            return Err(Self::mismatch(
                &self.path,
                format!(
                    "element size {} disagrees with {} in {}",
                    self.element_size,
                    other.element_size,
                    other.path.display()
                ),
            ));
        }
        Ok(())
    }
}

/// Routes per-cycle four-channel values into each read's intensity
/// (`NOISE = false`) or noise (`NOISE = true`) arrays.
pub struct IntensityParser<const NOISE: bool> {
    inner: PerCycleParser<IntensityCycleReader<NOISE>>,
    mapping: Arc<OutputMapping>,
}

impl<const NOISE: bool> IntensityParser<NOISE> {
    pub(crate) fn new(
        set: &CycleFileSet,
        tiles: &[u32],
        mapping: Arc<OutputMapping>,
    ) -> Result<Self, StreamError> {
        let mut files = BTreeMap::new();
        for &tile in tiles {
            files.insert(tile, set.files_for(tile, mapping.output_cycles())?);
        }
        Ok(IntensityParser {
            inner: PerCycleParser::new(files),
            mapping,
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
        for read in &mut cluster.reads {
            let slot = if NOISE {
                &mut read.noise
            } else {
                &mut read.intensities
            };
            if slot.is_none() {
                *slot = Some(FourChannelData::new(read.bases.len()));
            }
        }
        let mapping = &self.mapping;
        self.inner.next_values(|cycle, values| {
            if let Some(target) = mapping.cycle_target(cycle) {
                let read = &mut cluster.reads[target.major];
                let slot = if NOISE {
                    read.noise.as_mut()
                } else {
                    read.intensities.as_mut()
                };
                if let Some(data) = slot {
                    for (channel, value) in values.into_iter().enumerate() {
                        data.set(channel, target.minor, value);
                    }
                }
            }
        })?;
        Ok(())
    }
}
