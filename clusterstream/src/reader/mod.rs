//! File-level readers, one module per format, plus the typed parsers
//! that route each format's records into cluster fields.

pub mod barcode;
pub mod bcl;
pub mod bgzf;
pub mod cif;
pub mod filter;
pub mod locs;
pub mod qseq;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use lanedir::Compression;
use memmap2::Mmap;

use crate::StreamError;

pub(crate) fn open_file(path: &Path) -> Result<File, StreamError> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StreamError::FileNotFound(path.to_path_buf()),
        _ => StreamError::IoError(e),
    })
}

/// Read-only mapping held for the reader's lifetime; dropped on close.
pub(crate) fn map_file(path: &Path) -> Result<Mmap, StreamError> {
    let file = open_file(path)?;
    // Safety: run directories are immutable while a provider streams them.
    unsafe { Mmap::map(&file) }.map_err(StreamError::from)
}

/// Buffered text access with transparent `.gz`/`.bz2` handling.
pub(crate) fn open_text(
    path: &Path,
    compression: Compression,
) -> Result<Box<dyn BufRead + Send>, StreamError> {
    let file = open_file(path)?;
    Ok(match compression {
        Compression::None => Box::new(BufReader::new(file)),
        Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        Compression::Bzip2 => Box::new(BufReader::new(BzDecoder::new(file))),
    })
}
