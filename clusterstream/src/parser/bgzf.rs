//! BGZF block framing.
//!
//! A BGZF file is a series of gzip members, each carrying a `BC` extra
//! subfield that states the member's total compressed size minus one, so a
//! reader can hop block to block without inflating anything.

use nom::{
    bytes::complete::{tag, take},
    multi::length_data,
    number::complete::{le_u16, le_u32, le_u8},
    sequence::tuple,
    IResult,
};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const DEFLATE_METHOD: u8 = 8;
const FEXTRA: u8 = 0x04;
const BGZF_SI1: u8 = 66;
const BGZF_SI2: u8 = 67;

/// Footer after the deflate payload: CRC32 and uncompressed size.
pub(crate) const BGZF_FOOTER_SIZE: usize = 8;

/// Parse one member's header and return the total block size in bytes.
pub(crate) fn bgzf_block_size(input: &[u8]) -> IResult<&[u8], usize> {
    let (i, (_, _, flags, _, _, _)) = tuple((
        tag(GZIP_MAGIC),
        tag(&[DEFLATE_METHOD][..]),
        le_u8,
        le_u32, // mtime
        le_u8,  // xfl
        le_u8,  // os
    ))(input)?;
    if flags & FEXTRA == 0 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    let (i, mut extra) = length_data(le_u16)(i)?;
    // scan subfields for BC
    while !extra.is_empty() {
        let (rest, (si1, si2)) = tuple((le_u8, le_u8))(extra)?;
        let (rest, slen) = le_u16(rest)?;
        let (rest, data) = take(slen)(rest)?;
        if si1 == BGZF_SI1 && si2 == BGZF_SI2 && slen == 2 {
            let (_, bsize) = le_u16(data)?;
            return Ok((i, bsize as usize + 1));
        }
        extra = rest;
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

/// Uncompressed payload size from the member's trailing ISIZE word.
pub(crate) fn bgzf_isize(block: &[u8]) -> Option<usize> {
    if block.len() < BGZF_FOOTER_SIZE {
        return None;
    }
    let tail = &block[block.len() - 4..];
    Some(u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]) as usize)
}
