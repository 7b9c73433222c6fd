//! nom parser for read-structure strings.

use nom::{
    character::complete::{one_of, u32},
    combinator::{all_consuming, map_res},
    multi::many1,
    sequence::pair,
    IResult,
};

use super::{ReadDescriptor, ReadStructureError, ReadType};

/// Parse a single descriptor like "151T"
pub fn read_descriptor(input: &str) -> IResult<&str, ReadDescriptor> {
    map_res(pair(u32, one_of("TBS")), |(length, code)| {
        Ok::<_, ReadStructureError>(ReadDescriptor {
            length: length as usize,
            read_type: ReadType::try_from(code)?,
        })
    })(input)
}

/// Parse a full read-structure string.
/// Length validation happens in [ReadStructure::new](crate::ReadStructure::new).
pub fn read_structure(input: &str) -> IResult<&str, Vec<ReadDescriptor>> {
    all_consuming(many1(read_descriptor))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_descriptor() {
        let (rest, desc) = read_descriptor("8B").unwrap();
        assert_eq!(rest, "");
        assert_eq!(desc.length, 8);
        assert_eq!(desc.read_type, ReadType::Barcode);
    }

    #[test]
    fn trailing_garbage_rejected() {
        assert!(read_structure("8Bx").is_err());
    }

    #[test]
    fn multiple_descriptors() {
        let (_, descs) = read_structure("151T8B8B151T").unwrap();
        assert_eq!(descs.len(), 4);
        assert_eq!(descs[2].read_type, ReadType::Barcode);
    }
}
