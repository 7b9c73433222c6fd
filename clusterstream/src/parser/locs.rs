use nom::{
    number::complete::{le_f32, le_u32, le_u8},
    sequence::tuple,
    IResult,
};

pub(crate) const LOCS_HEADER_SIZE: usize = 12;
pub(crate) const LOCS_RECORD_SIZE: usize = 8;

/// 12-byte locs header: two constant words and the cluster count.
pub(crate) fn locs_header(input: &[u8]) -> IResult<&[u8], u32> {
    let (i, (_, _, num_clusters)) = tuple((le_u32, le_f32, le_u32))(input)?;
    Ok((i, num_clusters))
}

/// One locs record: raw float coordinates.
pub(crate) fn locs_record(input: &[u8]) -> IResult<&[u8], (f32, f32)> {
    let (i, (x, y)) = tuple((le_f32, le_f32))(input)?;
    Ok((i, (x, y)))
}

/// clocs header: version byte and bin count.
pub(crate) fn clocs_header(input: &[u8]) -> IResult<&[u8], (u8, u32)> {
    let (i, (version, num_bins)) = tuple((le_u8, le_u32))(input)?;
    Ok((i, (version, num_bins)))
}
