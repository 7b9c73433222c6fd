//! One ordered stream of cluster records out of a sharded Illumina run.
//!
//! The instrument shards a run by cycle, tile and read end across several
//! binary and text formats. This crate discovers what is on disk for a
//! lane, picks the best-supported format per requested data type, and
//! multiplexes the per-format parsers in lockstep so each step of the
//! stream yields one fully populated [`ClusterData`].

use std::path::PathBuf;

use thiserror::Error;

pub use lanedir::formats::FileFormat;
pub use readstructure::cluster::ClusterData;
pub use readstructure::mapping::OutputMapping;
pub use readstructure::ReadStructure;

pub mod cycle;
pub mod eamss;
pub mod multitile;
pub mod par;
pub mod parser;
pub mod provider;
pub mod reader;
pub mod select;
pub mod tile;

/// What a caller wants routed into each emitted cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    BaseCalls,
    QualityScores,
    Pf,
    Position,
    Barcodes,
    RawIntensities,
    Noise,
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    LaneDirError(#[from] lanedir::LaneDirError),
    #[error(transparent)]
    ReadStructureError(#[from] readstructure::ReadStructureError),
    #[error("missing file {0}")]
    FileNotFound(PathBuf),
    #[error("{path} is not a valid {format} file: {reason}")]
    FormatMismatch {
        path: PathBuf,
        format: FileFormat,
        reason: String,
    },
    #[error("no available format provides {0:?}; tried {1:?}")]
    NoFormatAvailable(DataType, Vec<FileFormat>),
    #[error("formats disagree on tiles: {first_format} has {first:?} but {second_format} has {second:?}")]
    TileSetMismatch {
        first_format: FileFormat,
        first: Vec<u32>,
        second_format: FileFormat,
        second: Vec<u32>,
    },
    #[error("formats disagree on cycles: {first_format} has {first} but {second_format} has {second}")]
    CycleCountMismatch {
        first_format: FileFormat,
        first: u32,
        second_format: FileFormat,
        second: u32,
    },
    #[error("tile {tile}: {path} declares {got} clusters where {expected} were expected")]
    ClusterCountMismatch {
        tile: u32,
        path: PathBuf,
        expected: u32,
        got: u32,
    },
    #[error("stream desync at tile {tile}: the {parser} parser still has records")]
    StreamDesync { tile: u32, parser: FileFormat },
    #[error("stream desync at tile {tile}: the {parser} parser ended early")]
    EarlyEnd { tile: u32, parser: FileFormat },
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("seek to tile {0} is outside the provided tile set")]
    SeekOutOfRange(u32),
    #[error("decompression error in {path}: {msg}")]
    DecompressError { path: PathBuf, msg: String },
    #[error("unexpected EOF in {0}")]
    EofError(PathBuf),
}

impl StreamError {
    /// Wrap a nom failure with the file it came from.
    pub(crate) fn parse_failure(path: &std::path::Path, format: FileFormat, msg: String) -> Self {
        StreamError::FormatMismatch {
            path: path.to_path_buf(),
            format,
            reason: msg,
        }
    }
}
