use nom::{
    number::complete::{le_u32, le_u64},
    sequence::pair,
    IResult,
};

pub(crate) const BCI_HEADER_SIZE: usize = 8;
pub(crate) const BCI_RECORD_SIZE: usize = 8;
pub(crate) const TILE_INDEX_RECORD_SIZE: usize = 8;

/// `.bci` header: version and tile count.
pub(crate) fn bci_header(input: &[u8]) -> IResult<&[u8], (u32, u32)> {
    pair(le_u32, le_u32)(input)
}

/// One 64-bit virtual offset.
pub(crate) fn virtual_offset(input: &[u8]) -> IResult<&[u8], u64> {
    le_u64(input)
}

/// One tile-index record: tile number and its cluster count.
pub(crate) fn tile_index_record(input: &[u8]) -> IResult<&[u8], (u32, u32)> {
    pair(le_u32, le_u32)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bci_layout() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&0xdeadbeefu64.to_le_bytes());
        let (i, (version, tiles)) = bci_header(&bytes).unwrap();
        assert_eq!((version, tiles), (0, 2));
        let (_, offset) = virtual_offset(i).unwrap();
        assert_eq!(offset, 0xdeadbeef);
    }

    #[test]
    fn tile_index_layout() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1101u32.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        let (_, (tile, count)) = tile_index_record(&bytes).unwrap();
        assert_eq!((tile, count), (1101, 3));
    }
}
