//! The cluster assembler: one parser per selected format, advanced in
//! lockstep, each routing its typed output into a shared [`ClusterData`].

use std::path::Path;
use std::sync::Arc;

use lanedir::formats::{FileFormat, LaneFiles};
use lanedir::LaneDirs;
use log::debug;
use readstructure::cluster::ClusterData;
use readstructure::mapping::OutputMapping;
use readstructure::ReadStructure;

use crate::multitile::MultiTileBclParser;
use crate::reader::barcode::BarcodeParser;
use crate::reader::bcl::BclParser;
use crate::reader::cif::IntensityParser;
use crate::reader::filter::FilterParser;
use crate::reader::locs::{ClocsReader, LocsReader, PosReader, PositionParser};
use crate::reader::qseq::QseqParser;
use crate::select::{select_formats, Selection};
use crate::{DataType, StreamError};

const BASECALL_TYPES: &[DataType] = &[DataType::BaseCalls, DataType::QualityScores];
const POSITION_TYPES: &[DataType] = &[DataType::Position];
const PF_TYPES: &[DataType] = &[DataType::Pf];
const BARCODE_TYPES: &[DataType] = &[DataType::Barcodes];
const INTENSITY_TYPES: &[DataType] = &[DataType::RawIntensities];
const NOISE_TYPES: &[DataType] = &[DataType::Noise];

/// Every parser variant the provider can multiplex.
pub enum Parser {
    Bcl(BclParser),
    MultiTileBcl(MultiTileBclParser),
    Cif(IntensityParser<false>),
    Cnf(IntensityParser<true>),
    Locs(PositionParser<LocsReader>),
    Clocs(PositionParser<ClocsReader>),
    Pos(PositionParser<PosReader>),
    Filter(FilterParser),
    Barcode(BarcodeParser),
    Qseq { parser: QseqParser, types: Vec<DataType> },
}

impl Parser {
    pub fn format(&self) -> FileFormat {
        match self {
            Parser::Bcl(_) => FileFormat::Bcl,
            Parser::MultiTileBcl(_) => FileFormat::MultiTileBcl,
            Parser::Cif(_) => FileFormat::Cif,
            Parser::Cnf(_) => FileFormat::Cnf,
            Parser::Locs(_) => FileFormat::Locs,
            Parser::Clocs(_) => FileFormat::Clocs,
            Parser::Pos(_) => FileFormat::Pos,
            Parser::Filter(_) => FileFormat::Filter,
            Parser::Barcode(_) => FileFormat::Barcode,
            Parser::Qseq { .. } => FileFormat::Qseq,
        }
    }

    pub fn supported_types(&self) -> &[DataType] {
        match self {
            Parser::Bcl(_) | Parser::MultiTileBcl(_) => BASECALL_TYPES,
            Parser::Cif(_) => INTENSITY_TYPES,
            Parser::Cnf(_) => NOISE_TYPES,
            Parser::Locs(_) | Parser::Clocs(_) | Parser::Pos(_) => POSITION_TYPES,
            Parser::Filter(_) => PF_TYPES,
            Parser::Barcode(_) => BARCODE_TYPES,
            Parser::Qseq { types, .. } => types,
        }
    }

    pub fn has_next(&mut self) -> Result<bool, StreamError> {
        match self {
            Parser::Bcl(p) => p.has_next(),
            Parser::MultiTileBcl(p) => p.has_next(),
            Parser::Cif(p) => p.has_next(),
            Parser::Cnf(p) => p.has_next(),
            Parser::Locs(p) => p.has_next(),
            Parser::Clocs(p) => p.has_next(),
            Parser::Pos(p) => p.has_next(),
            Parser::Filter(p) => p.has_next(),
            Parser::Barcode(p) => p.has_next(),
            Parser::Qseq { parser, .. } => parser.has_next(),
        }
    }

    pub fn tile_of_next_cluster(&mut self) -> Result<Option<u32>, StreamError> {
        match self {
            Parser::Bcl(p) => p.tile_of_next_cluster(),
            Parser::MultiTileBcl(p) => p.tile_of_next_cluster(),
            Parser::Cif(p) => p.tile_of_next_cluster(),
            Parser::Cnf(p) => p.tile_of_next_cluster(),
            Parser::Locs(p) => p.tile_of_next_cluster(),
            Parser::Clocs(p) => p.tile_of_next_cluster(),
            Parser::Pos(p) => p.tile_of_next_cluster(),
            Parser::Filter(p) => p.tile_of_next_cluster(),
            Parser::Barcode(p) => p.tile_of_next_cluster(),
            Parser::Qseq { parser, .. } => parser.tile_of_next_cluster(),
        }
    }

    pub fn seek_to_tile(&mut self, tile: u32) -> Result<(), StreamError> {
        match self {
            Parser::Bcl(p) => p.seek_to_tile(tile),
            Parser::MultiTileBcl(p) => p.seek_to_tile(tile),
            Parser::Cif(p) => p.seek_to_tile(tile),
            Parser::Cnf(p) => p.seek_to_tile(tile),
            Parser::Locs(p) => p.seek_to_tile(tile),
            Parser::Clocs(p) => p.seek_to_tile(tile),
            Parser::Pos(p) => p.seek_to_tile(tile),
            Parser::Filter(p) => p.seek_to_tile(tile),
            Parser::Barcode(p) => p.seek_to_tile(tile),
            Parser::Qseq { parser, .. } => parser.seek_to_tile(tile),
        }
    }

    pub fn advance_into(&mut self, cluster: &mut ClusterData) -> Result<(), StreamError> {
        match self {
            Parser::Bcl(p) => p.advance_into(cluster),
            Parser::MultiTileBcl(p) => p.advance_into(cluster),
            Parser::Cif(p) => p.advance_into(cluster),
            Parser::Cnf(p) => p.advance_into(cluster),
            Parser::Locs(p) => p.advance_into(cluster),
            Parser::Clocs(p) => p.advance_into(cluster),
            Parser::Pos(p) => p.advance_into(cluster),
            Parser::Filter(p) => p.advance_into(cluster),
            Parser::Barcode(p) => p.advance_into(cluster),
            Parser::Qseq { parser, .. } => parser.advance_into(cluster),
        }
    }
}

/// Immutable once built; `make_provider` may be called any number of
/// times, including for distinct tiles from distinct threads.
pub struct ProviderFactory {
    dirs: LaneDirs,
    files: LaneFiles,
    read_structure: ReadStructure,
    mapping: Arc<OutputMapping>,
    selection: Selection,
    apply_eamss: bool,
}

impl ProviderFactory {
    pub fn new(
        basecall_dir: &Path,
        lane: u32,
        read_structure: ReadStructure,
        data_types: &[DataType],
    ) -> Result<Self, StreamError> {
        let dirs = LaneDirs::new(basecall_dir, lane)?;
        let files = LaneFiles::discover(&dirs)?;
        let mapping = Arc::new(OutputMapping::new(&read_structure));
        let selection = select_formats(&files, data_types, &mapping)?;
        debug!(
            "lane {lane}: {} tiles, {} parser groups",
            selection.tiles.len(),
            selection.groups.len()
        );
        Ok(ProviderFactory {
            dirs,
            files,
            read_structure,
            mapping,
            selection,
            apply_eamss: true,
        })
    }

    /// The BCL path masks trailing low-quality segments; the QSeq path
    /// never does. Turn masking off when cross-format parity matters.
    pub fn apply_eamss(mut self, apply: bool) -> Self {
        self.apply_eamss = apply;
        self
    }

    pub fn lane(&self) -> u32 {
        self.dirs.lane()
    }

    pub fn read_structure(&self) -> &ReadStructure {
        &self.read_structure
    }

    pub fn output_mapping(&self) -> &OutputMapping {
        &self.mapping
    }

    /// Tiles all selected formats agreed on, ascending.
    pub fn tiles(&self) -> &[u32] {
        &self.selection.tiles
    }

    /// Chosen format per data type.
    pub fn format_for(&self, data_type: DataType) -> Option<FileFormat> {
        self.selection.by_type.get(&data_type).copied()
    }

    pub fn make_provider(&self) -> Result<DataProvider, StreamError> {
        let tiles = self.selection.tiles.clone();
        self.make_provider_for_tiles(&tiles)
    }

    /// A provider restricted to `tiles`, which must be a subset of the
    /// lane's agreed tile set.
    pub fn make_provider_for_tiles(&self, tiles: &[u32]) -> Result<DataProvider, StreamError> {
        let mut tiles = tiles.to_vec();
        tiles.sort_unstable();
        tiles.dedup();
        if tiles.is_empty() {
            return Err(StreamError::ConfigError("no tiles requested".to_string()));
        }
        for &tile in &tiles {
            if !self.selection.tiles.contains(&tile) {
                return Err(StreamError::SeekOutOfRange(tile));
            }
        }
        let mut parsers = Vec::with_capacity(self.selection.groups.len());
        for (format, types) in &self.selection.groups {
            parsers.push(self.build_parser(*format, types, &tiles)?);
        }
        Ok(DataProvider {
            lane: self.dirs.lane(),
            mapping: self.mapping.clone(),
            parsers,
            current_tile: None,
            poisoned: false,
        })
    }

    fn build_parser(
        &self,
        format: FileFormat,
        types: &[DataType],
        tiles: &[u32],
    ) -> Result<Parser, StreamError> {
        Ok(match format {
            FileFormat::Bcl => Parser::Bcl(BclParser::new(
                &self.files.bcl,
                tiles,
                self.mapping.clone(),
                self.apply_eamss,
            )?),
            FileFormat::MultiTileBcl => {
                let tile_index = self.selection.tile_index.clone().ok_or_else(|| {
                    StreamError::ConfigError(
                        "multi-tile bcl selected without a tile index".to_string(),
                    )
                })?;
                Parser::MultiTileBcl(MultiTileBclParser::new(
                    &self.files.multi_tile_bcl,
                    tile_index,
                    tiles,
                    self.mapping.clone(),
                    self.apply_eamss,
                )?)
            }
            FileFormat::Cif => {
                Parser::Cif(IntensityParser::new(&self.files.cif, tiles, self.mapping.clone())?)
            }
            FileFormat::Cnf => {
                Parser::Cnf(IntensityParser::new(&self.files.cnf, tiles, self.mapping.clone())?)
            }
            FileFormat::Locs => Parser::Locs(PositionParser::new(&self.files.locs, tiles)?),
            FileFormat::Clocs => Parser::Clocs(PositionParser::new(&self.files.clocs, tiles)?),
            FileFormat::Pos => Parser::Pos(PositionParser::new(&self.files.pos, tiles)?),
            FileFormat::Filter => Parser::Filter(FilterParser::new(&self.files.filter, tiles)?),
            FileFormat::Barcode => {
                Parser::Barcode(BarcodeParser::new(&self.files.barcode, tiles)?)
            }
            FileFormat::Qseq => Parser::Qseq {
                parser: QseqParser::new(&self.files.qseq, tiles, self.mapping.clone(), types)?,
                types: types.to_vec(),
            },
        })
    }
}

/// One ordered pass over the lane's clusters. Ends on the first error;
/// a failed seek leaves the provider unusable.
pub struct DataProvider {
    lane: u32,
    mapping: Arc<OutputMapping>,
    parsers: Vec<Parser>,
    current_tile: Option<u32>,
    poisoned: bool,
}

impl DataProvider {
    /// True while the stream has records. All parsers must agree the
    /// stream ended; a straggler is a desync.
    pub fn has_next(&mut self) -> Result<bool, StreamError> {
        if self.parsers[0].has_next()? {
            return Ok(true);
        }
        for i in 1..self.parsers.len() {
            if self.parsers[i].has_next()? {
                return Err(StreamError::StreamDesync {
                    tile: self.current_tile.unwrap_or(0),
                    parser: self.parsers[i].format(),
                });
            }
        }
        Ok(false)
    }

    pub fn next_cluster(&mut self) -> Result<ClusterData, StreamError> {
        // snapshot the tile before consuming, so tile and record advance
        // atomically
        let tile = match self.parsers[0].tile_of_next_cluster()? {
            Some(tile) => tile,
            None => {
                return Err(StreamError::EarlyEnd {
                    tile: self.current_tile.unwrap_or(0),
                    parser: self.parsers[0].format(),
                })
            }
        };
        for parser in &mut self.parsers[1..] {
            match parser.tile_of_next_cluster()? {
                Some(t) if t == tile => {}
                _ => {
                    return Err(StreamError::StreamDesync {
                        tile,
                        parser: parser.format(),
                    })
                }
            }
        }
        let mut cluster = ClusterData::with_layout(&self.mapping);
        cluster.lane = self.lane as i32;
        cluster.tile = tile as i32;
        for parser in &mut self.parsers {
            parser.advance_into(&mut cluster)?;
        }
        self.current_tile = Some(tile);
        Ok(cluster)
    }

    /// Jump every parser to `tile`; all or nothing.
    pub fn seek_to_tile(&mut self, tile: u32) -> Result<(), StreamError> {
        for parser in &mut self.parsers {
            if let Err(e) = parser.seek_to_tile(tile) {
                self.poisoned = true;
                return Err(e);
            }
        }
        self.current_tile = None;
        Ok(())
    }

    pub fn lane(&self) -> u32 {
        self.lane
    }
}

impl Iterator for DataProvider {
    type Item = Result<ClusterData, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }
        match self.has_next() {
            Ok(true) => match self.next_cluster() {
                Ok(cluster) => Some(Ok(cluster)),
                Err(e) => {
                    self.poisoned = true;
                    Some(Err(e))
                }
            },
            Ok(false) => None,
            Err(e) => {
                self.poisoned = true;
                Some(Err(e))
            }
        }
    }
}
