//! Random access into block-compressed (BGZF) files.
//!
//! A virtual offset packs the compressed offset of a block and a position
//! inside its inflated payload into one u64. The reader memory-maps the
//! file, inflates one block at a time on demand, and reads forward across
//! block boundaries.

use std::path::{Path, PathBuf};

use libdeflater::Decompressor;
use memmap2::Mmap;

use crate::parser::bgzf::{bgzf_block_size, bgzf_isize};
use crate::reader::map_file;
use crate::StreamError;

/// `(block_start_offset << 16) | within_block_offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub fn new(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    pub fn compressed_offset(&self) -> u64 {
        self.0 >> 16
    }

    pub fn block_offset(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

const NO_BLOCK: usize = usize::MAX;

pub struct BgzfReader {
    path: PathBuf,
    map: Mmap,
    decomp: Decompressor,
    block: Vec<u8>,
    block_coffset: usize,
    next_coffset: usize,
    pos: usize,
}

impl BgzfReader {
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let map = map_file(path)?;
        Ok(BgzfReader {
            path: path.to_path_buf(),
            map,
            decomp: Decompressor::new(),
            block: Vec::new(),
            block_coffset: NO_BLOCK,
            next_coffset: 0,
            pos: 0,
        })
    }

    /// Inflate the block starting at `coffset` into the block buffer.
    fn load_block(&mut self, coffset: usize) -> Result<(), StreamError> {
        let (_, block_size) = bgzf_block_size(&self.map[coffset..]).map_err(|e| {
            StreamError::DecompressError {
                path: self.path.clone(),
                msg: format!("bad block header at offset {coffset}: {e}"),
            }
        })?;
        if coffset + block_size > self.map.len() {
            return Err(StreamError::EofError(self.path.clone()));
        }
        let raw = &self.map[coffset..coffset + block_size];
        let inflated_size = bgzf_isize(raw).ok_or_else(|| StreamError::EofError(self.path.clone()))?;
        self.block.resize(inflated_size, 0);
        if inflated_size > 0 {
            match self.decomp.gzip_decompress(raw, &mut self.block) {
                Ok(n) if n == inflated_size => {}
                Ok(_) => {
                    return Err(StreamError::DecompressError {
                        path: self.path.clone(),
                        msg: format!("block at {coffset} did not inflate to its declared size"),
                    })
                }
                Err(e) => {
                    return Err(StreamError::DecompressError {
                        path: self.path.clone(),
                        msg: e.to_string(),
                    })
                }
            }
        }
        self.block_coffset = coffset;
        self.next_coffset = coffset + block_size;
        self.pos = 0;
        Ok(())
    }

    pub fn seek(&mut self, offset: VirtualOffset) -> Result<(), StreamError> {
        let coffset = offset.compressed_offset() as usize;
        if coffset != self.block_coffset {
            self.load_block(coffset)?;
        }
        let pos = offset.block_offset() as usize;
        if pos > self.block.len() {
            return Err(StreamError::DecompressError {
                path: self.path.clone(),
                msg: format!(
                    "virtual offset points {pos} bytes into a {}-byte block",
                    self.block.len()
                ),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Next inflated byte, crossing into the following block as needed.
    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        while self.pos == self.block.len() {
            if self.block_coffset != NO_BLOCK && self.next_coffset >= self.map.len() {
                return Err(StreamError::EofError(self.path.clone()));
            }
            let next = if self.block_coffset == NO_BLOCK {
                0
            } else {
                self.next_coffset
            };
            self.load_block(next)?;
        }
        let byte = self.block[self.pos];
        self.pos += 1;
        Ok(byte)
    }
}
