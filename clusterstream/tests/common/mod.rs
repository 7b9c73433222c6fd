//! Synthesized run directories for end-to-end tests.

#![allow(dead_code)]

use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::DeflateEncoder;
use flate2::Crc;
use tempfile::TempDir;

pub struct RunBuilder {
    root: TempDir,
    lane: u32,
}

impl RunBuilder {
    pub fn new(lane: u32) -> Self {
        let root = tempfile::tempdir().unwrap();
        let builder = RunBuilder { root, lane };
        create_dir_all(builder.basecall_lane_dir()).unwrap();
        create_dir_all(builder.intensities_lane_dir()).unwrap();
        builder
    }

    pub fn basecall_dir(&self) -> PathBuf {
        self.root.path().join("Intensities").join("BaseCalls")
    }

    pub fn intensities_dir(&self) -> PathBuf {
        self.root.path().join("Intensities")
    }

    pub fn basecall_lane_dir(&self) -> PathBuf {
        self.basecall_dir().join(format!("L{:03}", self.lane))
    }

    pub fn intensities_lane_dir(&self) -> PathBuf {
        self.intensities_dir().join(format!("L{:03}", self.lane))
    }

    fn write(path: &Path, bytes: &[u8]) {
        create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    /// One per-tile-per-cycle BCL: u32 count then one byte per cluster.
    pub fn bcl(&self, tile: u32, cycle: u32, records: &[u8]) {
        let mut bytes = (records.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(records);
        let path = self
            .basecall_lane_dir()
            .join(format!("C{cycle}.1"))
            .join(format!("s_{}_{tile}.bcl", self.lane));
        Self::write(&path, &bytes);
    }

    /// Filter file: 12-byte header then one PF byte per cluster.
    pub fn filter(&self, tile: u32, flags: &[u8]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&(flags.len() as u32).to_le_bytes());
        bytes.extend_from_slice(flags);
        let path = self
            .basecall_lane_dir()
            .join(format!("s_{}_{tile}.filter", self.lane));
        Self::write(&path, &bytes);
    }

    /// locs file: 12-byte header then float pairs.
    pub fn locs(&self, tile: u32, coords: &[(f32, f32)]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&(coords.len() as u32).to_le_bytes());
        for (x, y) in coords {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
        }
        let path = self
            .intensities_lane_dir()
            .join(format!("s_{}_{tile}.locs", self.lane));
        Self::write(&path, &bytes);
    }

    /// clocs file: per bin a count then (dx, dy) byte pairs.
    pub fn clocs(&self, tile: u32, bins: &[&[(u8, u8)]]) {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&(bins.len() as u32).to_le_bytes());
        for bin in bins {
            bytes.push(bin.len() as u8);
            for (dx, dy) in *bin {
                bytes.push(*dx);
                bytes.push(*dy);
            }
        }
        let path = self
            .intensities_lane_dir()
            .join(format!("s_{}_{tile}.clocs", self.lane));
        Self::write(&path, &bytes);
    }

    /// pos text file at the intensities root, one float pair per line.
    pub fn pos(&self, tile: u32, coords: &[(f32, f32)]) {
        let mut text = String::new();
        for (x, y) in coords {
            text.push_str(&format!("{x} {y}\n"));
        }
        let path = self
            .intensities_dir()
            .join(format!("s_{}_{tile}_pos.txt", self.lane));
        Self::write(&path, text.as_bytes());
    }

    /// RunInfo.xml at the run root; returns its path.
    pub fn run_info(&self, xml: &str) -> PathBuf {
        let path = self.root.path().join("RunInfo.xml");
        Self::write(&path, xml.as_bytes());
        path
    }

    /// QSeq file for one (read, tile), one line per cluster.
    pub fn qseq(&self, read: u32, tile: u32, lines: &[&str]) {
        let mut bytes = Vec::new();
        for line in lines {
            bytes.extend_from_slice(line.as_bytes());
            bytes.push(b'\n');
        }
        let path = self
            .basecall_dir()
            .join(format!("s_{}_{read}_{tile:04}_qseq.txt", self.lane));
        Self::write(&path, &bytes);
    }

    /// Barcode assignments, one per cluster.
    pub fn barcodes(&self, tile: u32, assignments: &[&str]) {
        let mut bytes = Vec::new();
        for assignment in assignments {
            bytes.extend_from_slice(assignment.as_bytes());
            bytes.push(b'\n');
        }
        let path = self
            .basecall_dir()
            .join(format!("s_{}_{tile}_barcode.txt", self.lane));
        Self::write(&path, &bytes);
    }

    /// CIF or CNF file with one cycle; values laid out channel-major.
    pub fn intensities(&self, tile: u32, cycle: u32, ext: &str, values: &[i16]) {
        assert_eq!(values.len() % 4, 0);
        let num_clusters = (values.len() / 4) as i32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"CIF");
        bytes.push(1); // version
        bytes.push(2); // element size
        bytes.extend_from_slice(&(cycle as u16).to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&num_clusters.to_le_bytes());
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let path = self
            .intensities_lane_dir()
            .join(format!("C{cycle}.1"))
            .join(format!("s_{}_{tile}.{ext}", self.lane));
        Self::write(&path, &bytes);
    }

    /// Multi-tile cycle file packing `records` for the whole lane, plus
    /// its `.bci` sidecar with one virtual offset per tile.
    pub fn multi_tile_bcl(&self, cycle: u32, records: &[u8], tile_starts: &[u16]) {
        let header_block = bgzf_block(&(records.len() as u32).to_le_bytes());
        let record_block = bgzf_block(records);
        let record_coffset = header_block.len() as u64;
        let mut bytes = header_block;
        bytes.extend_from_slice(&record_block);

        let path = self
            .basecall_lane_dir()
            .join(format!("{cycle:04}.bcl.bgzf"));
        Self::write(&path, &bytes);

        let mut bci = Vec::new();
        bci.extend_from_slice(&0u32.to_le_bytes());
        bci.extend_from_slice(&(tile_starts.len() as u32).to_le_bytes());
        for &start in tile_starts {
            bci.extend_from_slice(&((record_coffset << 16) | u64::from(start)).to_le_bytes());
        }
        let mut bci_path = path.into_os_string();
        bci_path.push(".bci");
        Self::write(Path::new(&bci_path), &bci);
    }

    /// Lane-wide tile index: (tile, cluster count) pairs.
    pub fn tile_index(&self, entries: &[(u32, u32)]) {
        let mut bytes = Vec::new();
        for (tile, count) in entries {
            bytes.extend_from_slice(&tile.to_le_bytes());
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        let path = self
            .basecall_lane_dir()
            .join(format!("s_{}.bci", self.lane));
        Self::write(&path, &bytes);
    }
}

/// One BGZF block around `payload`.
pub fn bgzf_block(payload: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(payload).unwrap();
    let deflated = encoder.finish().unwrap();

    let mut crc = Crc::new();
    crc.update(payload);

    let xlen = 6u16;
    let bsize = (12 + xlen as usize + deflated.len() + 8 - 1) as u16;
    let mut block = vec![0x1f, 0x8b, 8, 0x04, 0, 0, 0, 0, 0, 0xff];
    block.extend_from_slice(&xlen.to_le_bytes());
    block.extend_from_slice(&[66, 67]);
    block.extend_from_slice(&2u16.to_le_bytes());
    block.extend_from_slice(&bsize.to_le_bytes());
    block.extend_from_slice(&deflated);
    block.extend_from_slice(&crc.sum().to_le_bytes());
    block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    block
}
