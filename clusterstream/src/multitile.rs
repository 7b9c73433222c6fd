//! Multi-tile BCLs: all tiles of a lane packed into one block-compressed
//! file per cycle, addressed by a tile index plus per-cycle `.bci`
//! virtual-offset sidecars.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use lanedir::formats::{FileFormat, MultiTileFileSet};
use readstructure::cluster::ClusterData;
use readstructure::mapping::OutputMapping;

use crate::eamss;
use crate::parser::bcl::{BASE_LOOKUP, QUAL_LOOKUP};
use crate::parser::bci::{
    bci_header, tile_index_record, virtual_offset, BCI_HEADER_SIZE, BCI_RECORD_SIZE,
    TILE_INDEX_RECORD_SIZE,
};
use crate::reader::bgzf::{BgzfReader, VirtualOffset};
use crate::StreamError;

/// `s_<lane>.bci`: ordered (tile, cluster count) pairs for the whole lane.
#[derive(Debug, Clone)]
pub struct TileIndex {
    entries: Vec<(u32, u32)>,
}

impl TileIndex {
    pub fn read(path: &Path) -> Result<Self, StreamError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StreamError::FileNotFound(path.to_path_buf()),
            _ => StreamError::IoError(e),
        })?;
        if bytes.len() % TILE_INDEX_RECORD_SIZE != 0 {
            return Err(StreamError::FormatMismatch {
                path: path.to_path_buf(),
                format: FileFormat::MultiTileBcl,
                reason: format!("tile index length {} is not a record multiple", bytes.len()),
            });
        }
        let mut entries = Vec::with_capacity(bytes.len() / TILE_INDEX_RECORD_SIZE);
        let mut rest = &bytes[..];
        while !rest.is_empty() {
            let (next, entry) = tile_index_record(rest).map_err(|e| {
                StreamError::parse_failure(path, FileFormat::MultiTileBcl, e.to_string())
            })?;
            entries.push(entry);
            rest = next;
        }
        Ok(TileIndex { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tiles(&self) -> Vec<u32> {
        let mut tiles: Vec<u32> = self.entries.iter().map(|(tile, _)| *tile).collect();
        tiles.sort_unstable();
        tiles
    }

    /// Zero-based position and cluster count of a tile.
    pub fn lookup(&self, tile: u32) -> Option<(usize, u32)> {
        self.entries
            .iter()
            .position(|(t, _)| *t == tile)
            .map(|index| (index, self.entries[index].1))
    }
}

/// Per-cycle `.bci`: one 64-bit virtual offset per tile, in tile-index
/// order, behind an 8-byte header.
#[derive(Debug, Clone)]
pub struct BciIndex {
    offsets: Vec<VirtualOffset>,
}

impl BciIndex {
    pub fn read(path: &Path) -> Result<Self, StreamError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StreamError::FileNotFound(path.to_path_buf()),
            _ => StreamError::IoError(e),
        })?;
        let (mut rest, (_version, num_tiles)) = bci_header(&bytes).map_err(|e| {
            StreamError::parse_failure(path, FileFormat::MultiTileBcl, e.to_string())
        })?;
        if bytes.len() != BCI_HEADER_SIZE + num_tiles as usize * BCI_RECORD_SIZE {
            return Err(StreamError::FormatMismatch {
                path: path.to_path_buf(),
                format: FileFormat::MultiTileBcl,
                reason: format!(
                    "declares {num_tiles} tiles but holds {} offset bytes",
                    bytes.len() - BCI_HEADER_SIZE
                ),
            });
        }
        let mut offsets = Vec::with_capacity(num_tiles as usize);
        while !rest.is_empty() {
            let (next, raw) = virtual_offset(rest).map_err(|e| {
                StreamError::parse_failure(path, FileFormat::MultiTileBcl, e.to_string())
            })?;
            offsets.push(VirtualOffset::new(raw));
            rest = next;
        }
        Ok(BciIndex { offsets })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<VirtualOffset> {
        self.offsets.get(index).copied()
    }
}

struct CycleFile {
    cycle: u16,
    reader: BgzfReader,
    index: BciIndex,
}

/// Base-call parser over packed multi-tile BCLs. Each tile advance seeks
/// every cycle reader to the tile's virtual offset and then yields exactly
/// the tile's cluster count, whatever else the blocks still hold.
pub struct MultiTileBclParser {
    tile_index: Arc<TileIndex>,
    files: Vec<CycleFile>,
    tiles: Vec<u32>,
    queue: VecDeque<u32>,
    current_tile: Option<u32>,
    remaining: u32,
    mapping: Arc<OutputMapping>,
    apply_eamss: bool,
}

impl MultiTileBclParser {
    pub(crate) fn new(
        set: &MultiTileFileSet,
        tile_index: Arc<TileIndex>,
        tiles: &[u32],
        mapping: Arc<OutputMapping>,
        apply_eamss: bool,
    ) -> Result<Self, StreamError> {
        let mut files = Vec::new();
        for (cycle, path) in set.files_for(mapping.output_cycles())? {
            let bci_path = MultiTileFileSet::bci_path(&path);
            let index = BciIndex::read(&bci_path)?;
            if index.len() != tile_index.len() {
                return Err(StreamError::FormatMismatch {
                    path: bci_path,
                    format: FileFormat::MultiTileBcl,
                    reason: format!(
                        "bci lists {} tiles but the tile index lists {}",
                        index.len(),
                        tile_index.len()
                    ),
                });
            }
            files.push(CycleFile {
                cycle,
                reader: BgzfReader::open(&path)?,
                index,
            });
        }
        for &tile in tiles {
            if tile_index.lookup(tile).is_none() {
                return Err(StreamError::SeekOutOfRange(tile));
            }
        }
        Ok(MultiTileBclParser {
            tile_index,
            files,
            tiles: tiles.to_vec(),
            queue: tiles.iter().copied().collect(),
            current_tile: None,
            remaining: 0,
            mapping,
            apply_eamss,
        })
    }

    /// Seek every cycle reader to `tile` and arm the record limit.
    fn enter_tile(&mut self, tile: u32) -> Result<(), StreamError> {
        let (index, count) = self
            .tile_index
            .lookup(tile)
            .ok_or(StreamError::SeekOutOfRange(tile))?;
        for file in &mut self.files {
            let offset = file.index.get(index).ok_or_else(|| {
                StreamError::SeekOutOfRange(tile)
            })?;
            file.reader.seek(offset)?;
        }
        self.current_tile = Some(tile);
        self.remaining = count;
        Ok(())
    }

    fn ensure_current(&mut self) -> Result<(), StreamError> {
        while self.remaining == 0 {
            let Some(tile) = self.queue.pop_front() else {
                self.current_tile = None;
                return Ok(());
            };
            self.enter_tile(tile)?;
        }
        Ok(())
    }

    pub(crate) fn has_next(&mut self) -> Result<bool, StreamError> {
        self.ensure_current()?;
        Ok(self.remaining > 0)
    }

    pub(crate) fn tile_of_next_cluster(&mut self) -> Result<Option<u32>, StreamError> {
        self.ensure_current()?;
        Ok(if self.remaining > 0 {
            self.current_tile
        } else {
            None
        })
    }

    pub(crate) fn seek_to_tile(&mut self, tile: u32) -> Result<(), StreamError> {
        let position = self
            .tiles
            .iter()
            .position(|&t| t == tile)
            .ok_or(StreamError::SeekOutOfRange(tile))?;
        self.queue = self.tiles[position..].iter().copied().collect();
        self.current_tile = None;
        self.remaining = 0;
        Ok(())
    }

    pub(crate) fn advance_into(&mut self, cluster: &mut ClusterData) -> Result<(), StreamError> {
        self.ensure_current()?;
        if self.remaining == 0 {
            return Err(StreamError::EarlyEnd {
                tile: self.current_tile.unwrap_or(0),
                parser: FileFormat::MultiTileBcl,
            });
        }
        for file in &mut self.files {
            let byte = file.reader.read_u8()?;
            if let Some(target) = self.mapping.cycle_target(file.cycle) {
                let read = &mut cluster.reads[target.major];
                read.bases[target.minor] = BASE_LOOKUP[byte as usize];
                read.qualities[target.minor] = QUAL_LOOKUP[byte as usize];
            }
        }
        self.remaining -= 1;
        if self.apply_eamss {
            for read in &mut cluster.reads {
                eamss::mask_in_place(&read.bases, &mut read.qualities);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::bgzf::testutil::bgzf_block;

    fn write_tile_index(path: &Path, entries: &[(u32, u32)]) {
        let mut bytes = Vec::new();
        for (tile, count) in entries {
            bytes.extend_from_slice(&tile.to_le_bytes());
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn write_bci(path: &Path, offsets: &[u64]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
        for offset in offsets {
            bytes.extend_from_slice(&offset.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn tile_index_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s_1.bci");
        write_tile_index(&path, &[(1101, 3), (1102, 2)]);
        let index = TileIndex::read(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.tiles(), vec![1101, 1102]);
        assert_eq!(index.lookup(1102), Some((1, 2)));
        assert_eq!(index.lookup(1200), None);
    }

    #[test]
    fn bci_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0001.bcl.bgzf.bci");
        write_bci(&path, &[4 << 16, (4 << 16) | 3]);
        let index = BciIndex::read(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1).unwrap().block_offset(), 3);
        assert!(index.get(2).is_none());
    }

    #[test]
    fn bci_count_must_match_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0001.bcl.bgzf.bci");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            BciIndex::read(&path),
            Err(StreamError::FormatMismatch { .. })
        ));
    }

    /// Lay out one packed cycle: a bcl header block then all records in a
    /// second block, with the per-tile virtual offsets to match.
    fn packed_cycle(dir: &Path, records: &[u8], tile_starts: &[u16]) -> std::path::PathBuf {
        let path = dir.join("0001.bcl.bgzf");
        let header_block = bgzf_block(&(records.len() as u32).to_le_bytes());
        let record_block = bgzf_block(records);
        let record_coffset = header_block.len() as u64;
        let mut bytes = header_block;
        bytes.extend_from_slice(&record_block);
        std::fs::write(&path, bytes).unwrap();

        let offsets: Vec<u64> = tile_starts
            .iter()
            .map(|&start| (record_coffset << 16) | u64::from(start))
            .collect();
        write_bci(&MultiTileFileSet::bci_path(&path), &offsets);
        path
    }

    #[test]
    fn count_limit_stops_inside_a_block() {
        let dir = tempfile::tempdir().unwrap();
        let lane_dir = dir.path();
        // five records: three for tile 1101, two for tile 1102
        packed_cycle(lane_dir, &[0xA1, 0xA1, 0xA1, 0x02, 0x06], &[0, 3]);
        write_tile_index(&lane_dir.join("s_1.bci"), &[(1101, 3), (1102, 2)]);

        let set = MultiTileFileSet::discover(lane_dir, 1).unwrap();
        let tile_index = Arc::new(TileIndex::read(set.tile_index().unwrap()).unwrap());
        let mapping = Arc::new(OutputMapping::new(&"1T".parse().unwrap()));
        let mut parser = MultiTileBclParser::new(
            &set,
            tile_index,
            &[1102],
            mapping.clone(),
            false,
        )
        .unwrap();

        assert_eq!(parser.tile_of_next_cluster().unwrap(), Some(1102));
        let mut cluster = ClusterData::with_layout(&mapping);
        parser.advance_into(&mut cluster).unwrap();
        assert_eq!(cluster.reads[0].bases, b"G");
        parser.advance_into(&mut cluster).unwrap();
        assert_eq!(cluster.reads[0].bases, b"G");
        // exactly two records even though the block holds no terminator
        assert!(!parser.has_next().unwrap());
    }

    #[test]
    fn streams_tiles_in_requested_order() {
        let dir = tempfile::tempdir().unwrap();
        let lane_dir = dir.path();
        packed_cycle(lane_dir, &[0xA1, 0x02, 0x06], &[0, 1]);
        write_tile_index(&lane_dir.join("s_1.bci"), &[(7, 1), (8, 2)]);

        let set = MultiTileFileSet::discover(lane_dir, 1).unwrap();
        let tile_index = Arc::new(TileIndex::read(set.tile_index().unwrap()).unwrap());
        let mapping = Arc::new(OutputMapping::new(&"1T".parse().unwrap()));
        let mut parser =
            MultiTileBclParser::new(&set, tile_index, &[7, 8], mapping.clone(), false).unwrap();

        let mut tiles = Vec::new();
        while parser.has_next().unwrap() {
            let tile = parser.tile_of_next_cluster().unwrap().unwrap();
            let mut cluster = ClusterData::with_layout(&mapping);
            parser.advance_into(&mut cluster).unwrap();
            tiles.push(tile);
        }
        assert_eq!(tiles, vec![7, 8, 8]);

        parser.seek_to_tile(7).unwrap();
        assert_eq!(parser.tile_of_next_cluster().unwrap(), Some(7));
        assert!(matches!(
            parser.seek_to_tile(9),
            Err(StreamError::SeekOutOfRange(9))
        ));
    }
}
