//! Skeleton for formats that store one file per tile.
//!
//! The parser owns the tile → file map, opens one file at a time in
//! ascending tile order, and keeps a one-record lookahead so that the tile
//! of the next record is known before the record is consumed. Empty tiles
//! are skipped transparently.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use lanedir::formats::FileFormat;
use lanedir::Compression;

use crate::StreamError;

/// One open file of a per-tile format.
pub trait TileReader: Sized {
    type Record;
    const FORMAT: FileFormat;

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError>;

    /// None at the end of this tile's file.
    fn next_record(&mut self) -> Option<Result<Self::Record, StreamError>>;
}

pub struct PerTileParser<R: TileReader> {
    files: BTreeMap<u32, (PathBuf, Compression)>,
    queue: VecDeque<u32>,
    current: Option<(u32, R)>,
    pending: Option<R::Record>,
}

impl<R: TileReader> PerTileParser<R> {
    pub fn new(files: BTreeMap<u32, (PathBuf, Compression)>) -> Self {
        let queue = files.keys().copied().collect();
        PerTileParser {
            files,
            queue,
            current: None,
            pending: None,
        }
    }

    /// Pull the next record into the lookahead slot, advancing across
    /// exhausted and empty tiles. A stream with nothing left leaves the
    /// slot empty.
    fn fill_pending(&mut self) -> Result<(), StreamError> {
        while self.pending.is_none() {
            if self.current.is_none() {
                let Some(tile) = self.queue.pop_front() else {
                    return Ok(());
                };
                let (path, compression) = &self.files[&tile];
                self.current = Some((tile, R::open(path, *compression)?));
            }
            let (_, reader) = self.current.as_mut().unwrap();
            match reader.next_record() {
                Some(Ok(record)) => self.pending = Some(record),
                Some(Err(e)) => return Err(e),
                // closing drops the file handle or mapping
                None => self.current = None,
            }
        }
        Ok(())
    }

    pub fn has_next(&mut self) -> Result<bool, StreamError> {
        self.fill_pending()?;
        Ok(self.pending.is_some())
    }

    /// The tile the next record belongs to, or None when exhausted.
    pub fn tile_of_next_cluster(&mut self) -> Result<Option<u32>, StreamError> {
        self.fill_pending()?;
        Ok(match self.pending {
            Some(_) => self.current.as_ref().map(|(tile, _)| *tile),
            None => None,
        })
    }

    pub fn next_record(&mut self) -> Result<R::Record, StreamError> {
        self.fill_pending()?;
        match self.pending.take() {
            Some(record) => Ok(record),
            None => Err(StreamError::EarlyEnd {
                tile: 0,
                parser: R::FORMAT,
            }),
        }
    }

    /// Restart iteration from `tile`; subsequent tiles follow in order.
    pub fn seek_to_tile(&mut self, tile: u32) -> Result<(), StreamError> {
        if !self.files.contains_key(&tile) {
            return Err(StreamError::SeekOutOfRange(tile));
        }
        self.pending = None;
        self.current = None;
        self.queue = self.files.range(tile..).map(|(t, _)| *t).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake reader: the file is a list of `u8` records, one byte each.
    struct ByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl TileReader for ByteReader {
        type Record = u8;
        const FORMAT: FileFormat = FileFormat::Filter;

        fn open(path: &Path, _compression: Compression) -> Result<Self, StreamError> {
            let bytes = std::fs::read(path)?;
            Ok(ByteReader { bytes, pos: 0 })
        }

        fn next_record(&mut self) -> Option<Result<u8, StreamError>> {
            let byte = *self.bytes.get(self.pos)?;
            self.pos += 1;
            Some(Ok(byte))
        }
    }

    fn write_tile(dir: &Path, tile: u32, bytes: &[u8]) -> PathBuf {
        let path = dir.join(format!("t{tile}"));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn parser_with(tiles: &[(u32, &[u8])]) -> (tempfile::TempDir, PerTileParser<ByteReader>) {
        let dir = tempfile::tempdir().unwrap();
        let files = tiles
            .iter()
            .map(|(tile, bytes)| {
                (
                    *tile,
                    (write_tile(dir.path(), *tile, bytes), Compression::None),
                )
            })
            .collect();
        (dir, PerTileParser::new(files))
    }

    #[test]
    fn iterates_tiles_in_order() {
        let (_dir, mut parser) = parser_with(&[(1102, &[3]), (1101, &[1, 2])]);
        assert_eq!(parser.tile_of_next_cluster().unwrap(), Some(1101));
        assert_eq!(parser.next_record().unwrap(), 1);
        assert_eq!(parser.next_record().unwrap(), 2);
        assert_eq!(parser.tile_of_next_cluster().unwrap(), Some(1102));
        assert_eq!(parser.next_record().unwrap(), 3);
        assert!(!parser.has_next().unwrap());
    }

    #[test]
    fn skips_empty_tiles() {
        let (_dir, mut parser) = parser_with(&[(1, &[7]), (2, &[]), (3, &[8])]);
        assert_eq!(parser.next_record().unwrap(), 7);
        assert_eq!(parser.tile_of_next_cluster().unwrap(), Some(3));
        assert_eq!(parser.next_record().unwrap(), 8);
        assert!(!parser.has_next().unwrap());
    }

    #[test]
    fn seek_restarts_at_tile() {
        let (_dir, mut parser) = parser_with(&[(1, &[1]), (2, &[2]), (3, &[3])]);
        assert_eq!(parser.next_record().unwrap(), 1);
        parser.seek_to_tile(3).unwrap();
        assert_eq!(parser.tile_of_next_cluster().unwrap(), Some(3));
        assert_eq!(parser.next_record().unwrap(), 3);
        // seeking backwards reopens from the target
        parser.seek_to_tile(1).unwrap();
        assert_eq!(parser.next_record().unwrap(), 1);
        assert_eq!(parser.next_record().unwrap(), 2);
    }

    #[test]
    fn seek_outside_map_fails() {
        let (_dir, mut parser) = parser_with(&[(1, &[1])]);
        assert!(matches!(
            parser.seek_to_tile(9),
            Err(StreamError::SeekOutOfRange(9))
        ));
    }
}
