//! The emitted record: one cluster, reassembled across formats.

use crate::mapping::OutputMapping;
use crate::ReadType;

/// Sentinel for lane/tile/x/y fields not yet routed from any parser.
pub const UNSET: i32 = -1;

/// Per-cycle values for the four channels A,C,G,T of one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FourChannelData {
    channels: [Vec<i16>; 4],
}

impl FourChannelData {
    pub fn new(read_length: usize) -> Self {
        FourChannelData {
            channels: std::array::from_fn(|_| vec![0; read_length]),
        }
    }

    pub fn channel(&self, channel: usize) -> &[i16] {
        &self.channels[channel]
    }

    pub fn set(&mut self, channel: usize, index: usize, value: i16) {
        self.channels[channel][index] = value;
    }

    pub fn read_length(&self) -> usize {
        self.channels[0].len()
    }
}

/// One emitted read of a cluster.
///
/// `bases` holds ASCII characters in {A,C,G,T,N}; `qualities` holds binary
/// Phred values. Both are pre-sized to the read length and always equal in
/// length. Intensities and noise are populated only when requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadData {
    pub read_type: ReadType,
    pub bases: Vec<u8>,
    pub qualities: Vec<u8>,
    pub intensities: Option<FourChannelData>,
    pub noise: Option<FourChannelData>,
}

impl ReadData {
    pub fn read_length(&self) -> usize {
        self.bases.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterData {
    pub lane: i32,
    pub tile: i32,
    pub x: i32,
    pub y: i32,
    pub pf: bool,
    pub matched_barcode: Option<String>,
    pub reads: Vec<ReadData>,
}

impl ClusterData {
    /// A cluster with read buffers pre-sized to the mapping's per-read
    /// lengths and positional fields unset.
    pub fn with_layout(mapping: &OutputMapping) -> Self {
        let reads = mapping
            .output_descriptors()
            .iter()
            .map(|desc| ReadData {
                read_type: desc.read_type,
                bases: vec![0; desc.length],
                qualities: vec![0; desc.length],
                intensities: None,
                noise: None,
            })
            .collect();
        ClusterData {
            lane: UNSET,
            tile: UNSET,
            x: UNSET,
            y: UNSET,
            pf: false,
            matched_barcode: None,
            reads,
        }
    }
}
