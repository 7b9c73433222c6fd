//! Declared decomposition of a sequencing run's cycles into reads.
//!
//! A read structure string such as `"151T8B151T"` lists the run's reads in
//! cycle order: 151 template cycles, 8 barcode cycles, 151 more template
//! cycles. Skipped cycles (`S`) are consumed by the instrument but never
//! emitted downstream.

use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

pub mod cluster;
pub mod mapping;
pub mod parser;

#[derive(Error, Debug)]
pub enum ReadStructureError {
    #[error("Error reading ReadStructure: {0}")]
    ParseError(String),
    #[error("ReadStructure must contain at least one read descriptor")]
    Empty,
    #[error("ReadStructure descriptor {0} has length 0")]
    ZeroLengthDescriptor(usize),
    #[error("Unknown read type code {0}")]
    UnknownReadType(char),
}

/// T => template reads
/// B => barcode reads
/// S => cycles to skip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadType {
    Template,
    Barcode,
    Skip,
}

impl ReadType {
    pub fn code(&self) -> char {
        match self {
            ReadType::Template => 'T',
            ReadType::Barcode => 'B',
            ReadType::Skip => 'S',
        }
    }
}

impl TryFrom<char> for ReadType {
    type Error = ReadStructureError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'T' => Ok(ReadType::Template),
            'B' => Ok(ReadType::Barcode),
            'S' => Ok(ReadType::Skip),
            otherwise => Err(ReadStructureError::UnknownReadType(otherwise)),
        }
    }
}

/// One run of consecutive cycles sharing a read type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDescriptor {
    pub length: usize,
    pub read_type: ReadType,
}

impl Display for ReadDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.length, self.read_type.code())
    }
}

/// An ordered, validated list of read descriptors covering every cycle of
/// the run exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStructure {
    descriptors: Vec<ReadDescriptor>,
    template_indices: Vec<usize>,
    barcode_indices: Vec<usize>,
    skip_indices: Vec<usize>,
    total_cycles: usize,
}

impl ReadStructure {
    pub fn new(descriptors: Vec<ReadDescriptor>) -> Result<Self, ReadStructureError> {
        if descriptors.is_empty() {
            return Err(ReadStructureError::Empty);
        }
        let mut template_indices = Vec::new();
        let mut barcode_indices = Vec::new();
        let mut skip_indices = Vec::new();
        let mut total_cycles = 0usize;
        for (i, desc) in descriptors.iter().enumerate() {
            if desc.length == 0 {
                return Err(ReadStructureError::ZeroLengthDescriptor(i));
            }
            total_cycles += desc.length;
            match desc.read_type {
                ReadType::Template => template_indices.push(i),
                ReadType::Barcode => barcode_indices.push(i),
                ReadType::Skip => skip_indices.push(i),
            }
        }
        Ok(ReadStructure {
            descriptors,
            template_indices,
            barcode_indices,
            skip_indices,
            total_cycles,
        })
    }

    pub fn descriptors(&self) -> &[ReadDescriptor] {
        &self.descriptors
    }

    /// Total cycle count of the run, skipped cycles included.
    pub fn total_cycles(&self) -> usize {
        self.total_cycles
    }

    pub fn template_indices(&self) -> &[usize] {
        &self.template_indices
    }

    pub fn barcode_indices(&self) -> &[usize] {
        &self.barcode_indices
    }

    pub fn skip_indices(&self) -> &[usize] {
        &self.skip_indices
    }

    pub fn num_templates(&self) -> usize {
        self.template_indices.len()
    }

    pub fn num_barcodes(&self) -> usize {
        self.barcode_indices.len()
    }

    pub fn num_skips(&self) -> usize {
        self.skip_indices.len()
    }
}

impl FromStr for ReadStructure {
    type Err = ReadStructureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parser::read_structure(s) {
            Ok((_, descriptors)) => ReadStructure::new(descriptors),
            Err(e) => Err(ReadStructureError::ParseError(format!(
                "Failed to parse {s} as ReadStructure: {e}"
            ))),
        }
    }
}

impl Display for ReadStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for desc in &self.descriptors {
            write!(f, "{desc}")?;
        }
        Ok(())
    }
}
