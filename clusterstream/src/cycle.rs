//! Skeleton for cycle-sharded formats.
//!
//! For the current tile, one reader per emitted cycle is open at once;
//! each yields exactly one value per cluster and all advance in lockstep.
//! Opening a tile validates that every cycle file declares the same
//! cluster count (and whatever else the format requires to agree).

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use lanedir::formats::FileFormat;
use lanedir::Compression;

use crate::StreamError;

/// One open cycle file of one tile.
pub trait CycleReader: Sized {
    type Value;
    const FORMAT: FileFormat;

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError>;

    /// Clusters this file declares for its tile.
    fn cluster_count(&self) -> u32;

    /// Called at most `cluster_count()` times.
    fn next_value(&mut self) -> Result<Self::Value, StreamError>;

    /// Format-specific agreement beyond the cluster count.
    fn check_agreement(&self, _other: &Self) -> Result<(), StreamError> {
        Ok(())
    }
}

struct TileStack<R> {
    tile: u32,
    readers: Vec<(u16, R)>,
    remaining: u32,
}

pub struct PerCycleParser<R: CycleReader> {
    // tile -> its cycle files, in cycle order
    files: BTreeMap<u32, Vec<(u16, PathBuf, Compression)>>,
    queue: VecDeque<u32>,
    current: Option<TileStack<R>>,
}

impl<R: CycleReader> PerCycleParser<R> {
    pub fn new(files: BTreeMap<u32, Vec<(u16, PathBuf, Compression)>>) -> Self {
        let queue = files.keys().copied().collect();
        PerCycleParser {
            files,
            queue,
            current: None,
        }
    }

    fn open_tile(&self, tile: u32) -> Result<TileStack<R>, StreamError> {
        let mut readers: Vec<(u16, R)> = Vec::with_capacity(self.files[&tile].len());
        let mut expected: Option<u32> = None;
        for (cycle, path, compression) in &self.files[&tile] {
            let reader = R::open(path, *compression)?;
            match expected {
                None => expected = Some(reader.cluster_count()),
                Some(expected) if reader.cluster_count() != expected => {
                    return Err(StreamError::ClusterCountMismatch {
                        tile,
                        path: path.clone(),
                        expected,
                        got: reader.cluster_count(),
                    });
                }
                Some(_) => {}
            }
            if let Some((_, first)) = readers.first() {
                reader.check_agreement(first)?;
            }
            readers.push((*cycle, reader));
        }
        Ok(TileStack {
            tile,
            readers,
            remaining: expected.unwrap_or(0),
        })
    }

    /// Make sure `current` points at a tile with clusters left, skipping
    /// empty tiles. Leaves `current` as None when fully exhausted.
    fn ensure_current(&mut self) -> Result<(), StreamError> {
        loop {
            if matches!(&self.current, Some(stack) if stack.remaining > 0) {
                return Ok(());
            }
            let Some(tile) = self.queue.pop_front() else {
                self.current = None;
                return Ok(());
            };
            // previous tile's readers (and their mappings) drop here
            self.current = Some(self.open_tile(tile)?);
        }
    }

    pub fn has_next(&mut self) -> Result<bool, StreamError> {
        self.ensure_current()?;
        Ok(self.current.is_some())
    }

    pub fn tile_of_next_cluster(&mut self) -> Result<Option<u32>, StreamError> {
        self.ensure_current()?;
        Ok(self.current.as_ref().map(|stack| stack.tile))
    }

    /// Advance every cycle reader once, handing each value to `route`
    /// together with its cycle number.
    pub fn next_values(
        &mut self,
        mut route: impl FnMut(u16, R::Value),
    ) -> Result<u32, StreamError> {
        self.ensure_current()?;
        let stack = self.current.as_mut().ok_or(StreamError::EarlyEnd {
            tile: 0,
            parser: R::FORMAT,
        })?;
        for (cycle, reader) in &mut stack.readers {
            route(*cycle, reader.next_value()?);
        }
        stack.remaining -= 1;
        Ok(stack.tile)
    }

    pub fn seek_to_tile(&mut self, tile: u32) -> Result<(), StreamError> {
        if !self.files.contains_key(&tile) {
            return Err(StreamError::SeekOutOfRange(tile));
        }
        self.current = None;
        self.queue = self.files.range(tile..).map(|(t, _)| *t).collect();
        Ok(())
    }
}
