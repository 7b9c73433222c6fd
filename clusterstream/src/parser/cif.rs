use nom::{
    bytes::complete::tag,
    number::complete::{le_i32, le_u16, le_u8},
    sequence::tuple,
    IResult,
};

pub(crate) const CIF_MAGIC: &[u8; 3] = b"CIF";
pub(crate) const CIF_HEADER_SIZE: usize = 13;
pub(crate) const CIF_VERSION: u8 = 1;

/// The 13-byte header shared by CIF and CNF files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CifHeader {
    pub version: u8,
    pub element_size: u8,
    pub first_cycle: u16,
    pub num_cycles: u16,
    pub num_clusters: i32,
}

pub(crate) fn cif_header(input: &[u8]) -> IResult<&[u8], CifHeader> {
    let (i, (_, version, element_size, first_cycle, num_cycles, num_clusters)) =
        tuple((tag(CIF_MAGIC), le_u8, le_u8, le_u16, le_u16, le_i32))(input)?;
    Ok((
        i,
        CifHeader {
            version,
            element_size,
            first_cycle,
            num_cycles,
            num_clusters,
        },
    ))
}
