//! QSeq combined reading.
//!
//! One tab-delimited file per (lane, read, tile); each line is one cluster
//! of one instrument read carrying position, PF, bases and Solexa-1.3
//! qualities at once. Because an instrument read need not line up with the
//! read structure's output reads, a precomputed set of copy ranges
//! re-slices every line onto `(output read, offset)` targets.

use std::collections::{BTreeMap, VecDeque};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use lanedir::formats::{FileFormat, QseqFileSet};
use lanedir::Compression;
use readstructure::cluster::ClusterData;
use readstructure::mapping::OutputMapping;
use serde::Deserialize;

use crate::reader::open_text;
use crate::{DataType, StreamError};

const SOLEXA_ADDEND: i32 = 64;
const MAX_PHRED: f64 = 93.0;
const NO_CALL_DOT: u8 = b'.';
const PF_PASS: u8 = 1;

/// One QSeq line, fields in instrument order.
#[derive(Debug, Clone, Deserialize)]
pub struct QseqRecord {
    pub machine: String,
    pub run: u32,
    pub lane: u32,
    pub tile: u32,
    pub x: i32,
    pub y: i32,
    pub index: u32,
    pub read_number: u32,
    pub bases: String,
    pub qualities: String,
    pub pf: u8,
}

static SOLEXA_TO_PHRED: OnceLock<[u8; 256]> = OnceLock::new();

/// Solexa quality (ASCII minus 64) to binary Phred.
pub(crate) fn solexa_to_phred_table() -> &'static [u8; 256] {
    SOLEXA_TO_PHRED.get_or_init(|| {
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let solexa = i as i32 - SOLEXA_ADDEND;
            let phred = 10.0 * (1.0 + 10f64.powf(f64::from(solexa) / 10.0)).log10();
            *slot = phred.round().clamp(0.0, MAX_PHRED) as u8;
        }
        table
    })
}

/// Which cluster fields this parser owns. When QSeq is selected alongside
/// nothing else it owns all four; a narrower selection leaves the rest to
/// the preferred binary formats.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QseqTargets {
    pub bases: bool,
    pub qualities: bool,
    pub pf: bool,
    pub position: bool,
}

impl QseqTargets {
    pub(crate) fn from_types(types: &[DataType]) -> Self {
        let mut targets = QseqTargets::default();
        for data_type in types {
            match data_type {
                DataType::BaseCalls => targets.bases = true,
                DataType::QualityScores => targets.qualities = true,
                DataType::Pf => targets.pf = true,
                DataType::Position => targets.position = true,
                _ => {}
            }
        }
        targets
    }
}

/// One contiguous copy from a QSeq line onto an output read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeCopy {
    group: usize,
    source_start: usize,
    length: usize,
    major: usize,
    minor_start: usize,
}

/// Derive the copy ranges: output-read spans in input-cycle space, split
/// wherever a span crosses a QSeq file boundary.
fn split_ranges(
    mapping: &OutputMapping,
    group_lengths: &[usize],
) -> Result<Vec<RangeCopy>, StreamError> {
    let total: usize = group_lengths.iter().sum();
    if total != mapping.total_cycles() {
        return Err(StreamError::ConfigError(format!(
            "read structure covers {} cycles but the QSeq reads cover {total}",
            mapping.total_cycles()
        )));
    }
    // first input cycle of each group, 1-based
    let mut starts = Vec::with_capacity(group_lengths.len());
    let mut next = 1usize;
    for length in group_lengths {
        starts.push(next);
        next += length;
    }
    // contiguous (major, first, last) spans of emitted cycles
    let mut spans: Vec<(usize, usize, usize)> = Vec::new();
    for &cycle in mapping.output_cycles() {
        let Some(target) = mapping.cycle_target(cycle) else {
            continue;
        };
        let cycle = cycle as usize;
        let extends = spans
            .last()
            .is_some_and(|(major, _, last)| *major == target.major && last + 1 == cycle);
        if extends {
            if let Some((_, _, last)) = spans.last_mut() {
                *last = cycle;
            }
        } else {
            spans.push((target.major, cycle, cycle));
        }
    }
    let mut ranges = Vec::new();
    for (major, first, last) in spans {
        let mut cycle = first;
        while cycle <= last {
            let group = match starts.binary_search(&cycle) {
                Ok(g) => g,
                Err(g) => g - 1,
            };
            let group_last = starts[group] + group_lengths[group] - 1;
            let end = last.min(group_last);
            ranges.push(RangeCopy {
                group,
                source_start: cycle - starts[group],
                length: end - cycle + 1,
                major,
                minor_start: cycle - first,
            });
            cycle = end + 1;
        }
    }
    Ok(ranges)
}

fn qseq_reader(
    path: &Path,
    compression: Compression,
) -> Result<csv::Reader<Box<dyn BufRead + Send>>, StreamError> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(false)
        .from_reader(open_text(path, compression)?))
}

type RecordIter = csv::DeserializeRecordsIntoIter<Box<dyn BufRead + Send>, QseqRecord>;

struct CurrentTile {
    tile: u32,
    readers: Vec<(PathBuf, RecordIter)>,
}

pub struct QseqParser {
    // per read-file group: tile -> file
    files: Vec<BTreeMap<u32, (PathBuf, Compression)>>,
    queue: VecDeque<u32>,
    current: Option<CurrentTile>,
    pending: Option<(u32, Vec<QseqRecord>)>,
    ranges: Vec<RangeCopy>,
    group_lengths: Vec<usize>,
    targets: QseqTargets,
}

impl QseqParser {
    pub(crate) fn new(
        set: &QseqFileSet,
        tiles: &[u32],
        mapping: Arc<OutputMapping>,
        types: &[DataType],
    ) -> Result<Self, StreamError> {
        let mut files = Vec::new();
        for read in set.read_numbers() {
            files.push(set.files(read, tiles)?);
        }
        if files.is_empty() {
            return Err(StreamError::ConfigError(
                "no QSeq read files on disk".to_string(),
            ));
        }
        let group_lengths = peek_group_lengths(&files)?;
        let ranges = split_ranges(&mapping, &group_lengths)?;
        Ok(QseqParser {
            files,
            queue: tiles.iter().copied().collect(),
            current: None,
            pending: None,
            ranges,
            group_lengths,
            targets: QseqTargets::from_types(types),
        })
    }

    fn open_tile(&self, tile: u32) -> Result<CurrentTile, StreamError> {
        let readers = self
            .files
            .iter()
            .map(|group| {
                let (path, compression) = &group[&tile];
                Ok((
                    path.clone(),
                    qseq_reader(path, *compression)?.into_deserialize(),
                ))
            })
            .collect::<Result<Vec<_>, StreamError>>()?;
        Ok(CurrentTile { tile, readers })
    }

    /// Read one line from every read file of the current tile into the
    /// lookahead slot, advancing across exhausted tiles. All files of a
    /// tile must end on the same line.
    fn fill_pending(&mut self) -> Result<(), StreamError> {
        while self.pending.is_none() {
            if self.current.is_none() {
                let Some(tile) = self.queue.pop_front() else {
                    return Ok(());
                };
                self.current = Some(self.open_tile(tile)?);
            }
            let current = self.current.as_mut().unwrap();
            let mut records = Vec::with_capacity(current.readers.len());
            let mut ended = 0usize;
            for (path, reader) in &mut current.readers {
                match reader.next() {
                    Some(Ok(record)) => records.push(record),
                    Some(Err(e)) => {
                        return Err(StreamError::FormatMismatch {
                            path: path.clone(),
                            format: FileFormat::Qseq,
                            reason: e.to_string(),
                        })
                    }
                    None => ended += 1,
                }
            }
            if ended == current.readers.len() {
                self.current = None;
                continue;
            }
            if ended > 0 {
                return Err(StreamError::EarlyEnd {
                    tile: current.tile,
                    parser: FileFormat::Qseq,
                });
            }
            for (record, (path, _)) in records.iter().zip(&current.readers) {
                if record.tile != current.tile {
                    return Err(StreamError::FormatMismatch {
                        path: path.clone(),
                        format: FileFormat::Qseq,
                        reason: format!(
                            "line claims tile {} inside the tile {} file",
                            record.tile, current.tile
                        ),
                    });
                }
            }
            self.pending = Some((current.tile, records));
        }
        Ok(())
    }

    pub(crate) fn has_next(&mut self) -> Result<bool, StreamError> {
        self.fill_pending()?;
        Ok(self.pending.is_some())
    }

    pub(crate) fn tile_of_next_cluster(&mut self) -> Result<Option<u32>, StreamError> {
        self.fill_pending()?;
        Ok(self.pending.as_ref().map(|(tile, _)| *tile))
    }

    pub(crate) fn seek_to_tile(&mut self, tile: u32) -> Result<(), StreamError> {
        if !self.files[0].contains_key(&tile) {
            return Err(StreamError::SeekOutOfRange(tile));
        }
        self.pending = None;
        self.current = None;
        self.queue = self.files[0].range(tile..).map(|(t, _)| *t).collect();
        Ok(())
    }

    pub(crate) fn advance_into(&mut self, cluster: &mut ClusterData) -> Result<(), StreamError> {
        self.fill_pending()?;
        let Some((tile, records)) = self.pending.take() else {
            return Err(StreamError::EarlyEnd {
                tile: 0,
                parser: FileFormat::Qseq,
            });
        };
        let first = &records[0];
        if self.targets.position {
            cluster.x = first.x;
            cluster.y = first.y;
        }
        if self.targets.pf {
            cluster.pf = first.pf == PF_PASS;
        }
        if !self.targets.bases && !self.targets.qualities {
            return Ok(());
        }
        let table = solexa_to_phred_table();
        for copy in &self.ranges {
            let record = &records[copy.group];
            let bases = record.bases.as_bytes();
            let qualities = record.qualities.as_bytes();
            if bases.len() != self.group_lengths[copy.group] || qualities.len() != bases.len() {
                let (path, _) = &self.files[copy.group][&tile];
                return Err(StreamError::FormatMismatch {
                    path: path.clone(),
                    format: FileFormat::Qseq,
                    reason: format!(
                        "tile {tile}: line holds {} bases and {} qualities where {} were expected",
                        bases.len(),
                        qualities.len(),
                        self.group_lengths[copy.group]
                    ),
                });
            }
            let source = copy.source_start..copy.source_start + copy.length;
            let dest = copy.minor_start..copy.minor_start + copy.length;
            let read = &mut cluster.reads[copy.major];
            if self.targets.bases {
                let out = &mut read.bases[dest.clone()];
                out.copy_from_slice(&bases[source.clone()]);
                for base in out {
                    if *base == NO_CALL_DOT {
                        *base = b'N';
                    }
                }
            }
            if self.targets.qualities {
                let out = &mut read.qualities[dest];
                out.copy_from_slice(&qualities[source]);
                for quality in out {
                    *quality = table[*quality as usize];
                }
            }
        }
        Ok(())
    }
}

/// Base-string length of each read file group, taken from the first line
/// found; every later line is validated against it.
fn peek_group_lengths(
    files: &[BTreeMap<u32, (PathBuf, Compression)>],
) -> Result<Vec<usize>, StreamError> {
    let mut lengths = Vec::with_capacity(files.len());
    for group in files {
        let mut found = None;
        for (path, compression) in group.values() {
            let mut iter = qseq_reader(path, *compression)?.into_deserialize::<QseqRecord>();
            match iter.next() {
                Some(Ok(record)) => {
                    found = Some(record.bases.len());
                    break;
                }
                Some(Err(e)) => {
                    return Err(StreamError::FormatMismatch {
                        path: path.clone(),
                        format: FileFormat::Qseq,
                        reason: e.to_string(),
                    })
                }
                None => continue,
            }
        }
        match found {
            Some(length) => lengths.push(length),
            None => {
                return Err(StreamError::ConfigError(
                    "every QSeq file of a read is empty; read length unknown".to_string(),
                ))
            }
        }
    }
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "M\t1\t1\t1101\t100\t200\t0\t0\tACGT\t!!II\t1";

    fn mapping(s: &str) -> Arc<OutputMapping> {
        Arc::new(OutputMapping::new(&s.parse().unwrap()))
    }

    #[test]
    fn solexa_table_values() {
        let table = solexa_to_phred_table();
        assert_eq!(table[b'!' as usize], 0);
        assert_eq!(table[b'@' as usize], 3);
        assert_eq!(table[b'I' as usize], 10);
        assert_eq!(table[b'h' as usize], 40);
        // far beyond any real quality the table saturates
        assert_eq!(table[255], 93);
    }

    #[test]
    fn record_deserializes() {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_reader(LINE.as_bytes());
        let record: QseqRecord = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(record.lane, 1);
        assert_eq!(record.tile, 1101);
        assert_eq!((record.x, record.y), (100, 200));
        assert_eq!(record.bases, "ACGT");
        assert_eq!(record.qualities, "!!II");
        assert_eq!(record.pf, 1);
    }

    #[test]
    fn ranges_for_single_read() {
        let ranges = split_ranges(&mapping("4T"), &[4]).unwrap();
        assert_eq!(
            ranges,
            vec![RangeCopy {
                group: 0,
                source_start: 0,
                length: 4,
                major: 0,
                minor_start: 0
            }]
        );
    }

    #[test]
    fn ranges_split_on_file_boundaries() {
        // output read 1 spans the tail of file 0 and all of file 1
        let ranges = split_ranges(&mapping("4T4B"), &[5, 3]).unwrap();
        assert_eq!(
            ranges,
            vec![
                RangeCopy {
                    group: 0,
                    source_start: 0,
                    length: 4,
                    major: 0,
                    minor_start: 0
                },
                RangeCopy {
                    group: 0,
                    source_start: 4,
                    length: 1,
                    major: 1,
                    minor_start: 0
                },
                RangeCopy {
                    group: 1,
                    source_start: 0,
                    length: 3,
                    major: 1,
                    minor_start: 1
                },
            ]
        );
    }

    #[test]
    fn ranges_honor_skips() {
        // skip the middle two cycles of one 6-cycle file
        let ranges = split_ranges(&mapping("2T2S2T"), &[6]).unwrap();
        assert_eq!(
            ranges,
            vec![
                RangeCopy {
                    group: 0,
                    source_start: 0,
                    length: 2,
                    major: 0,
                    minor_start: 0
                },
                RangeCopy {
                    group: 0,
                    source_start: 4,
                    length: 2,
                    major: 1,
                    minor_start: 0
                },
            ]
        );
    }

    #[test]
    fn cycle_total_must_match() {
        assert!(matches!(
            split_ranges(&mapping("4T"), &[5]),
            Err(StreamError::ConfigError(_))
        ));
    }

    #[test]
    fn parses_one_cluster_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s_1_1_1101_qseq.txt");
        std::fs::write(&path, format!("{LINE}\n")).unwrap();

        let mut set_files = BTreeMap::new();
        set_files.insert(1101u32, (path, Compression::None));
        let mut parser = QseqParser {
            files: vec![set_files],
            queue: [1101u32].into_iter().collect(),
            current: None,
            pending: None,
            ranges: split_ranges(&mapping("4T"), &[4]).unwrap(),
            group_lengths: vec![4],
            targets: QseqTargets {
                bases: true,
                qualities: true,
                pf: true,
                position: true,
            },
        };

        assert_eq!(parser.tile_of_next_cluster().unwrap(), Some(1101));
        let mut cluster = ClusterData::with_layout(&mapping("4T"));
        parser.advance_into(&mut cluster).unwrap();
        assert_eq!((cluster.x, cluster.y), (100, 200));
        assert!(cluster.pf);
        assert_eq!(cluster.reads[0].bases, b"ACGT");
        assert_eq!(cluster.reads[0].qualities, vec![0, 0, 10, 10]);
        assert!(!parser.has_next().unwrap());
    }

    #[test]
    fn dots_become_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s_1_1_0007_qseq.txt");
        std::fs::write(&path, "M\t1\t1\t7\t1\t2\t0\t0\tA.GT\t!!!!\t0\n").unwrap();
        let mut set_files = BTreeMap::new();
        set_files.insert(7u32, (path, Compression::None));
        let mut parser = QseqParser {
            files: vec![set_files],
            queue: [7u32].into_iter().collect(),
            current: None,
            pending: None,
            ranges: split_ranges(&mapping("4T"), &[4]).unwrap(),
            group_lengths: vec![4],
            targets: QseqTargets {
                bases: true,
                qualities: true,
                pf: true,
                position: false,
            },
        };
        let mut cluster = ClusterData::with_layout(&mapping("4T"));
        parser.advance_into(&mut cluster).unwrap();
        assert_eq!(cluster.reads[0].bases, b"ANGT");
        assert!(!cluster.pf);
    }
}
