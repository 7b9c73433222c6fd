//! Routing of input cycles onto output read coordinates.
//!
//! The instrument numbers cycles 1..C across the whole run; downstream
//! consumers see one base/quality array per non-skip read. The mapping
//! assigns every input cycle either a skip or a two-dimensional target:
//! which output read (major) and which position within it (minor).

use log::debug;

use crate::{ReadDescriptor, ReadStructure, ReadType};

/// Destination of one emitted cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTarget {
    /// Which output read receives the value.
    pub major: usize,
    /// Offset within that read's arrays.
    pub minor: usize,
}

/// Inclusive 1-based span of consecutively emitted cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleRange {
    pub first: u16,
    pub last: u16,
}

impl CycleRange {
    pub fn len(&self) -> usize {
        (self.last - self.first + 1) as usize
    }
}

#[derive(Debug, Clone)]
pub struct OutputMapping {
    targets: Vec<Option<CycleTarget>>,
    output_cycles: Vec<u16>,
    output_read_lengths: Vec<usize>,
    output_descriptors: Vec<ReadDescriptor>,
    cycle_ranges: Vec<CycleRange>,
}

impl OutputMapping {
    pub fn new(structure: &ReadStructure) -> Self {
        let mut targets = Vec::with_capacity(structure.total_cycles());
        let mut output_cycles = Vec::new();
        let mut output_read_lengths = Vec::new();
        let mut output_descriptors = Vec::new();
        let mut cycle = 1u16;
        let mut major = 0usize;
        for desc in structure.descriptors() {
            match desc.read_type {
                ReadType::Skip => {
                    for _ in 0..desc.length {
                        targets.push(None);
                        cycle += 1;
                    }
                }
                _ => {
                    for minor in 0..desc.length {
                        targets.push(Some(CycleTarget { major, minor }));
                        output_cycles.push(cycle);
                        cycle += 1;
                    }
                    output_read_lengths.push(desc.length);
                    output_descriptors.push(*desc);
                    major += 1;
                }
            }
        }
        let cycle_ranges = contiguous_ranges(&output_cycles);
        debug!(
            "{structure} routes {} of {} cycles onto {} output reads",
            output_cycles.len(),
            structure.total_cycles(),
            output_read_lengths.len()
        );
        OutputMapping {
            targets,
            output_cycles,
            output_read_lengths,
            output_descriptors,
            cycle_ranges,
        }
    }

    /// Target of an input cycle, or None for skipped cycles.
    /// Cycles are 1-based; asking for a cycle outside 1..C is a caller bug.
    pub fn cycle_target(&self, cycle: u16) -> Option<CycleTarget> {
        self.targets[(cycle - 1) as usize]
    }

    /// Sorted 1-based cycle numbers that reach an output read.
    pub fn output_cycles(&self) -> &[u16] {
        &self.output_cycles
    }

    pub fn output_read_lengths(&self) -> &[usize] {
        &self.output_read_lengths
    }

    /// The non-skip descriptors, in emission order.
    pub fn output_descriptors(&self) -> &[ReadDescriptor] {
        &self.output_descriptors
    }

    /// Contiguous spans of emitted cycles in input-cycle space.
    pub fn cycle_index_ranges(&self) -> &[CycleRange] {
        &self.cycle_ranges
    }

    pub fn total_output_cycles(&self) -> usize {
        self.output_cycles.len()
    }

    /// Total cycle count of the run, skips included.
    pub fn total_cycles(&self) -> usize {
        self.targets.len()
    }

    pub fn num_output_reads(&self) -> usize {
        self.output_read_lengths.len()
    }
}

fn contiguous_ranges(cycles: &[u16]) -> Vec<CycleRange> {
    let mut ranges: Vec<CycleRange> = Vec::new();
    for &cycle in cycles {
        let extends = ranges
            .last()
            .is_some_and(|range| range.last + 1 == cycle);
        if extends {
            if let Some(range) = ranges.last_mut() {
                range.last = cycle;
            }
        } else {
            ranges.push(CycleRange {
                first: cycle,
                last: cycle,
            });
        }
    }
    ranges
}
