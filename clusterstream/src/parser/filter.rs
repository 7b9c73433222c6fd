use nom::{
    number::complete::le_u32,
    sequence::{pair, preceded},
    IResult,
};

pub(crate) const FILTER_HEADER_SIZE: usize = 12;
pub(crate) const PF_MASK: u8 = 0x01;

/// version and num clusters; the leading word is reserved.
pub(crate) fn filter_header(input: &[u8]) -> IResult<&[u8], (u32, u32)> {
    preceded(le_u32, pair(le_u32, le_u32))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_and_count() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.push(0x01);
        let (rest, (version, num_clusters)) = filter_header(&bytes).unwrap();
        assert_eq!(version, 3);
        assert_eq!(num_clusters, 7);
        assert_eq!(rest, &[0x01]);
    }
}
