//! Assigned-barcode text: one barcode per cluster per line, "." where no
//! barcode matched.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use lanedir::formats::{FileFormat, TileFileSet};
use lanedir::Compression;
use readstructure::cluster::ClusterData;

use crate::reader::open_text;
use crate::tile::{PerTileParser, TileReader};
use crate::StreamError;

const NO_MATCH: &str = ".";

pub struct BarcodeReader {
    path: PathBuf,
    lines: std::io::Lines<Box<dyn BufRead + Send>>,
    line_number: usize,
}

impl TileReader for BarcodeReader {
    type Record = Option<String>;
    const FORMAT: FileFormat = FileFormat::Barcode;

    fn open(path: &Path, compression: Compression) -> Result<Self, StreamError> {
        Ok(BarcodeReader {
            path: path.to_path_buf(),
            lines: open_text(path, compression)?.lines(),
            line_number: 0,
        })
    }

    fn next_record(&mut self) -> Option<Result<Option<String>, StreamError>> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(StreamError::IoError(e))),
        };
        self.line_number += 1;
        match line.split_whitespace().next() {
            Some(NO_MATCH) => Some(Ok(None)),
            Some(barcode) => Some(Ok(Some(barcode.to_string()))),
            None => Some(Err(StreamError::FormatMismatch {
                path: self.path.clone(),
                format: Self::FORMAT,
                reason: format!("line {} holds no barcode", self.line_number),
            })),
        }
    }
}

pub struct BarcodeParser {
    inner: PerTileParser<BarcodeReader>,
}

impl BarcodeParser {
    pub(crate) fn new(set: &TileFileSet, tiles: &[u32]) -> Result<Self, StreamError> {
        Ok(BarcodeParser {
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
        cluster.matched_barcode = self.inner.next_record()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_assignments_and_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s_1_1_barcode.txt");
        std::fs::write(&path, "ACGTACGT\tY\n.\tN\nTTTTAAAA\tY\n").unwrap();
        let mut reader = BarcodeReader::open(&path, Compression::None).unwrap();
        assert_eq!(
            reader.next_record().unwrap().unwrap(),
            Some("ACGTACGT".to_string())
        );
        assert_eq!(reader.next_record().unwrap().unwrap(), None);
        assert_eq!(
            reader.next_record().unwrap().unwrap(),
            Some("TTTTAAAA".to_string())
        );
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn gzipped_barcodes_read_transparently() {
        use flate2::write::GzEncoder;
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s_1_1_barcode.txt.gz");
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"GATTACA\n").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();
        let mut reader = BarcodeReader::open(&path, Compression::Gzip).unwrap();
        assert_eq!(
            reader.next_record().unwrap().unwrap(),
            Some("GATTACA".to_string())
        );
    }
}
