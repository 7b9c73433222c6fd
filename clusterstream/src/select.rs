//! Per-data-type format selection.
//!
//! Every data type carries an ordered preference list, native binary
//! formats first. The first available format wins; if anything lands on
//! QSeq, every requested type QSeq can serve is folded onto it so the
//! same lines are not parsed twice. Selected formats must agree on the
//! lane's tiles and (for cycle-sharded formats) on the cycle count.

use std::sync::Arc;

use fxhash::FxHashMap;
use lanedir::formats::{FileFormat, LaneFiles};
use log::debug;
use readstructure::mapping::OutputMapping;

use crate::multitile::TileIndex;
use crate::{DataType, StreamError};

const BASECALL_FORMATS: &[FileFormat] =
    &[FileFormat::Bcl, FileFormat::MultiTileBcl, FileFormat::Qseq];
const PF_FORMATS: &[FileFormat] = &[FileFormat::Filter, FileFormat::Qseq];
const POSITION_FORMATS: &[FileFormat] = &[
    FileFormat::Locs,
    FileFormat::Clocs,
    FileFormat::Pos,
    FileFormat::Qseq,
];
const BARCODE_FORMATS: &[FileFormat] = &[FileFormat::Barcode];
const INTENSITY_FORMATS: &[FileFormat] = &[FileFormat::Cif];
const NOISE_FORMATS: &[FileFormat] = &[FileFormat::Cnf];

pub fn preference(data_type: DataType) -> &'static [FileFormat] {
    match data_type {
        DataType::BaseCalls | DataType::QualityScores => BASECALL_FORMATS,
        DataType::Pf => PF_FORMATS,
        DataType::Position => POSITION_FORMATS,
        DataType::Barcodes => BARCODE_FORMATS,
        DataType::RawIntensities => INTENSITY_FORMATS,
        DataType::Noise => NOISE_FORMATS,
    }
}

/// The outcome of selection: who serves what, over which tiles.
pub struct Selection {
    /// Chosen format per requested (and implied) data type.
    pub by_type: FxHashMap<DataType, FileFormat>,
    /// Distinct chosen formats with their data types, in `FileFormat`
    /// declaration order; the provider builds one parser per entry.
    pub groups: Vec<(FileFormat, Vec<DataType>)>,
    /// Tile set every chosen format agreed on, ascending.
    pub tiles: Vec<u32>,
    /// Loaded tile index when the multi-tile path was chosen.
    pub tile_index: Option<Arc<TileIndex>>,
}

pub fn select_formats(
    files: &LaneFiles,
    requested: &[DataType],
    mapping: &OutputMapping,
) -> Result<Selection, StreamError> {
    if requested.is_empty() {
        return Err(StreamError::ConfigError(
            "no data types requested".to_string(),
        ));
    }
    let mut wanted: Vec<DataType> = requested.to_vec();
    wanted.sort_unstable();
    wanted.dedup();
    // clusters must be locatable
    let needs_position = wanted.iter().any(|t| {
        matches!(
            t,
            DataType::BaseCalls | DataType::QualityScores | DataType::Pf
        )
    });
    if needs_position && !wanted.contains(&DataType::Position) {
        wanted.push(DataType::Position);
        wanted.sort_unstable();
    }

    let mut by_type: FxHashMap<DataType, FileFormat> = FxHashMap::default();
    for &data_type in &wanted {
        let formats = preference(data_type);
        let chosen = formats.iter().copied().find(|&f| files.available(f));
        match chosen {
            Some(format) => {
                by_type.insert(data_type, format);
            }
            None => {
                return Err(StreamError::NoFormatAvailable(data_type, formats.to_vec()));
            }
        }
    }
    // QSeq is a combined format: once any type lands on it, pull in every
    // requested type it can serve
    if by_type.values().any(|&f| f == FileFormat::Qseq) {
        for (&data_type, format) in by_type.iter_mut() {
            if preference(data_type).contains(&FileFormat::Qseq) {
                *format = FileFormat::Qseq;
            }
        }
    }
    for (data_type, format) in &by_type {
        debug!("serving {data_type:?} from {format} files");
    }

    let mut groups: Vec<(FileFormat, Vec<DataType>)> = Vec::new();
    for (&data_type, &format) in &by_type {
        if let Some(position) = groups.iter().position(|(f, _)| *f == format) {
            groups[position].1.push(data_type);
        } else {
            groups.push((format, vec![data_type]));
        }
    }
    groups.sort_by_key(|(format, _)| *format as usize);
    for (_, types) in &mut groups {
        types.sort_unstable();
    }

    let tile_index = match by_type.values().any(|&f| f == FileFormat::MultiTileBcl) {
        true => {
            let path = files.multi_tile_bcl.tile_index().ok_or_else(|| {
                StreamError::ConfigError("multi-tile bcl selected without a tile index".to_string())
            })?;
            Some(Arc::new(TileIndex::read(path)?))
        }
        false => None,
    };

    let tiles = agreed_tiles(files, &groups, tile_index.as_deref())?;
    verify_cycles(files, &groups, mapping)?;
    if groups.iter().any(|(f, _)| *f == FileFormat::Qseq) {
        files.qseq.verify_consistent()?;
    }

    Ok(Selection {
        by_type,
        groups,
        tiles,
        tile_index,
    })
}

/// Every selected format must report the identical tile set.
fn agreed_tiles(
    files: &LaneFiles,
    groups: &[(FileFormat, Vec<DataType>)],
    tile_index: Option<&TileIndex>,
) -> Result<Vec<u32>, StreamError> {
    let mut reference: Option<(FileFormat, Vec<u32>)> = None;
    for (format, _) in groups {
        let tiles = match (format, tile_index) {
            (FileFormat::MultiTileBcl, Some(index)) => index.tiles(),
            _ => files.tiles_of(*format),
        };
        if let Some((first_format, first)) = &reference {
            if *first != tiles {
                return Err(StreamError::TileSetMismatch {
                    first_format: *first_format,
                    first: first.clone(),
                    second_format: *format,
                    second: tiles,
                });
            }
        } else {
            reference = Some((*format, tiles));
        }
    }
    match reference {
        Some((_, tiles)) => Ok(tiles),
        None => Ok(Vec::new()),
    }
}

/// Cycle-sharded formats must cover cycles 1..C contiguously, hold every
/// cycle the read structure emits, and agree with each other on C.
fn verify_cycles(
    files: &LaneFiles,
    groups: &[(FileFormat, Vec<DataType>)],
    mapping: &OutputMapping,
) -> Result<(), StreamError> {
    let mut reference: Option<(FileFormat, u32)> = None;
    for (format, _) in groups {
        let total = match format {
            FileFormat::Bcl => files.bcl.verify_contiguous()?,
            FileFormat::MultiTileBcl => files.multi_tile_bcl.verify_contiguous()?,
            FileFormat::Cif => files.cif.verify_contiguous()?,
            FileFormat::Cnf => files.cnf.verify_contiguous()?,
            _ => continue,
        };
        if (total as usize) < mapping.total_cycles() {
            return Err(StreamError::ConfigError(format!(
                "read structure needs {} cycles but {format} files cover {total}",
                mapping.total_cycles()
            )));
        }
        if let Some((first_format, first)) = &reference {
            if *first != total {
                return Err(StreamError::CycleCountMismatch {
                    first_format: *first_format,
                    first: *first,
                    second_format: *format,
                    second: total,
                });
            }
        } else {
            reference = Some((*format, total));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanedir::LaneDirs;
    use std::fs::{create_dir_all, File};
    use std::path::Path;

    fn touch(path: &Path) {
        File::create(path).unwrap();
    }

    fn write_bcl(path: &Path, records: &[u8]) {
        let mut bytes = (records.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(records);
        std::fs::write(path, bytes).unwrap();
    }

    fn fixture() -> (tempfile::TempDir, LaneDirs) {
        let root = tempfile::tempdir().unwrap();
        let basecalls = root.path().join("Intensities").join("BaseCalls");
        create_dir_all(basecalls.join("L001")).unwrap();
        create_dir_all(root.path().join("Intensities").join("L001")).unwrap();
        let dirs = LaneDirs::new(&basecalls, 1).unwrap();
        (root, dirs)
    }

    fn mapping(s: &str) -> OutputMapping {
        OutputMapping::new(&s.parse().unwrap())
    }

    fn bcl_fixture() -> (tempfile::TempDir, LaneDirs) {
        let (root, dirs) = fixture();
        let lane_dir = dirs.basecall_lane_dir();
        let cycle_dir = lane_dir.join("C1.1");
        create_dir_all(&cycle_dir).unwrap();
        write_bcl(&cycle_dir.join("s_1_1101.bcl"), &[0xA1]);
        touch(&lane_dir.join("s_1_1101.filter"));
        touch(
            &root
                .path()
                .join("Intensities")
                .join("L001")
                .join("s_1_1101.locs"),
        );
        (root, dirs)
    }

    #[test]
    fn prefers_native_formats() {
        let (_root, dirs) = bcl_fixture();
        let files = LaneFiles::discover(&dirs).unwrap();
        let selection = select_formats(
            &files,
            &[DataType::BaseCalls, DataType::Pf],
            &mapping("1T"),
        )
        .unwrap();
        assert_eq!(selection.by_type[&DataType::BaseCalls], FileFormat::Bcl);
        assert_eq!(selection.by_type[&DataType::Pf], FileFormat::Filter);
        // Position implied
        assert_eq!(selection.by_type[&DataType::Position], FileFormat::Locs);
        assert_eq!(selection.tiles, vec![1101]);
        assert_eq!(selection.groups.len(), 3);
    }

    #[test]
    fn folds_everything_onto_qseq() {
        let (_root, dirs) = fixture();
        // qseq only for basecalls; filter exists for PF but qseq wins the fold
        touch(&dirs.basecall_dir().join("s_1_1_1101_qseq.txt"));
        touch(&dirs.basecall_lane_dir().join("s_1_1101.filter"));
        let files = LaneFiles::discover(&dirs).unwrap();
        let selection = select_formats(
            &files,
            &[DataType::BaseCalls, DataType::Pf],
            &mapping("1T"),
        )
        .unwrap();
        assert_eq!(selection.by_type[&DataType::BaseCalls], FileFormat::Qseq);
        assert_eq!(selection.by_type[&DataType::Pf], FileFormat::Qseq);
        assert_eq!(selection.by_type[&DataType::Position], FileFormat::Qseq);
        assert_eq!(selection.groups.len(), 1);
    }

    #[test]
    fn missing_format_is_fatal() {
        let (_root, dirs) = fixture();
        let files = LaneFiles::discover(&dirs).unwrap();
        assert!(matches!(
            select_formats(&files, &[DataType::RawIntensities], &mapping("1T")),
            Err(StreamError::NoFormatAvailable(DataType::RawIntensities, _))
        ));
    }

    #[test]
    fn no_data_types_is_fatal() {
        let (_root, dirs) = fixture();
        let files = LaneFiles::discover(&dirs).unwrap();
        assert!(matches!(
            select_formats(&files, &[], &mapping("1T")),
            Err(StreamError::ConfigError(_))
        ));
    }

    #[test]
    fn tile_disagreement_is_fatal() {
        let (_root, dirs) = bcl_fixture();
        // filter gains a tile the bcl set lacks
        touch(&dirs.basecall_lane_dir().join("s_1_1102.filter"));
        let files = LaneFiles::discover(&dirs).unwrap();
        assert!(matches!(
            select_formats(
                &files,
                &[DataType::BaseCalls, DataType::Pf],
                &mapping("1T")
            ),
            Err(StreamError::TileSetMismatch { .. })
        ));
    }

    #[test]
    fn short_cycle_coverage_is_fatal() {
        let (_root, dirs) = bcl_fixture();
        let files = LaneFiles::discover(&dirs).unwrap();
        assert!(matches!(
            select_formats(&files, &[DataType::BaseCalls], &mapping("2T")),
            Err(StreamError::ConfigError(_))
        ));
    }
}
